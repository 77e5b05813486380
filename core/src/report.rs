/// Recoverable problems collected during a run and the end-of-run summary
use crate::catalog::CatalogStats;
use crate::merge::MergeReport;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Warning {
    /// A source file could not be scanned and was skipped
    #[error("{file}:{line}: skipped file: {message}")]
    #[serde(rename_all = "camelCase")]
    SourceParse {
        file: String,
        line: usize,
        message: String,
    },
    /// Stored plural forms did not match the target language and were padded or truncated
    #[error("{context}: \"{source_text}\" has {found} plural form(s), language needs {expected}")]
    #[serde(rename_all = "camelCase")]
    PluralFormMismatch {
        context: String,
        source_text: String,
        expected: usize,
        found: usize,
    },
    #[error("no plural rules for locale '{locale}', assuming {assumed_forms} form(s)")]
    #[serde(rename_all = "camelCase")]
    UnknownLocale { locale: String, assumed_forms: usize },
    /// The same message was used both with and without a count argument
    #[error("{file}:{line}: \"{source_text}\" in {context} is used with and without a count")]
    #[serde(rename_all = "camelCase")]
    ConflictingPlural {
        context: String,
        source_text: String,
        file: String,
        line: u32,
    },
    /// A translated plural message is no longer called with a count
    #[error("{context}: \"{source_text}\" lost its count argument; plural translations kept")]
    #[serde(rename_all = "camelCase")]
    PluralShapeKept { context: String, source_text: String },
    #[error("{path}: {message}")]
    #[serde(rename_all = "camelCase")]
    Io { path: String, message: String },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub call_sites: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    /// False when the merged catalog matched the file already on disk
    pub written: bool,
    pub extraction: ExtractionSummary,
    pub merge: MergeReport,
    pub stats: CatalogStats,
    pub warnings: Vec<Warning>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let warning = Warning::PluralFormMismatch {
            context: "Dialog".into(),
            source_text: "%n file(s)".into(),
            expected: 3,
            found: 2,
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "pluralFormMismatch");
        assert_eq!(json["sourceText"], "%n file(s)");
        assert_eq!(json["expected"], 3);
    }

    #[test]
    fn source_parse_warning_names_file_and_line() {
        let warning = Warning::SourceParse {
            file: "src/broken.cpp".into(),
            line: 12,
            message: "unterminated string literal".into(),
        };
        assert_eq!(
            warning.to_string(),
            "src/broken.cpp:12: skipped file: unterminated string literal"
        );
    }
}
