/// Literal Extractor
///
/// Walks a source tree, scans every C++ and Designer file for translatable
/// literals and resolves each call site's context. Resolution waits until the
/// whole tree has been scanned, since an out-of-line member such as
/// `Foo::bar()` can only be qualified once every declared class is known.

use crate::catalog::MessageKey;
use crate::encoding::DecodedText;
use crate::report::{ExtractionSummary, Warning};
use crate::scanner::{FileScanner, ScanConfig, ScanResult, SourceKind};
use crate::scanners::{
    default_markers, ContextSource, CppScanner, FormScanner, MarkerSpec, RawMessage, ScanError,
    ScanOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to scan source tree {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Source root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorOptions {
    /// Functions and macros whose literal arguments are translatable
    #[serde(default = "default_markers")]
    pub markers: Vec<MarkerSpec>,

    /// Context for call sites outside any named scope
    #[serde(default = "default_context")]
    pub default_context: String,
}

fn default_context() -> String {
    "Global".to_string()
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            default_context: default_context(),
        }
    }
}

/// One translatable call site with its context resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundMessage {
    pub context: String,
    pub source_text: String,
    pub disambiguation: Option<String>,
    pub is_plural: bool,
    /// `/`-separated, relative to the catalog's directory
    pub file: String,
    pub line: u32,
    pub extra_comment: Option<String>,
}

impl FoundMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(
            self.context.as_str(),
            self.source_text.as_str(),
            self.disambiguation.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// File traversal order, then source order within each file
    pub messages: Vec<FoundMessage>,
    pub summary: ExtractionSummary,
    pub warnings: Vec<Warning>,
}

/// A scanned file waiting for context resolution
struct ScannedSource {
    label: String,
    output: ScanOutput,
}

pub struct Extractor {
    scan: ScanConfig,
    options: ExtractorOptions,
    cpp: CppScanner,
    forms: FormScanner,
}

impl Extractor {
    pub fn new(scan: ScanConfig, options: ExtractorOptions) -> Self {
        let cpp = CppScanner::new(options.markers.clone());
        Self {
            scan,
            options,
            cpp,
            forms: FormScanner::new(),
        }
    }

    /// Extracts from every source file under `source_root`. File labels are
    /// written relative to `catalog_dir`, the directory the catalog lives in.
    pub fn extract(
        &self,
        source_root: &Path,
        catalog_dir: &Path,
    ) -> Result<ExtractionOutcome, ExtractError> {
        if !source_root.is_dir() {
            return Err(ExtractError::NotADirectory(source_root.to_path_buf()));
        }
        let result = FileScanner::new(self.scan.clone())
            .scan(source_root)
            .map_err(|source| ExtractError::Walk {
                root: source_root.to_path_buf(),
                source,
            })?;
        Ok(self.extract_scanned(&result, catalog_dir))
    }

    /// Extracts from an explicit list of files, in the given order. Listed
    /// files that cannot be read become warnings.
    pub fn extract_files(
        &self,
        source_root: &Path,
        files: &[PathBuf],
        catalog_dir: &Path,
    ) -> Result<ExtractionOutcome, ExtractError> {
        if !source_root.is_dir() {
            return Err(ExtractError::NotADirectory(source_root.to_path_buf()));
        }
        let result = FileScanner::new(self.scan.clone()).scan_files(source_root, files);
        Ok(self.extract_scanned(&result, catalog_dir))
    }

    /// Scans one in-memory source. Contexts are resolved against the classes
    /// declared in this source only.
    pub fn extract_source(
        &self,
        kind: SourceKind,
        label: &str,
        content: &str,
    ) -> Result<Vec<FoundMessage>, ScanError> {
        let output = self.scan_content(kind, content)?;
        let declared = declared_contexts(std::iter::once(&output));
        Ok(output
            .messages
            .iter()
            .map(|raw| self.found(raw, label, &declared))
            .collect())
    }

    fn scan_content(&self, kind: SourceKind, content: &str) -> Result<ScanOutput, ScanError> {
        match kind {
            SourceKind::Cpp => self.cpp.scan(content),
            SourceKind::DesignerForm => self.forms.scan(content),
        }
    }

    fn extract_scanned(&self, result: &ScanResult, catalog_dir: &Path) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();
        outcome.summary.files_skipped = result.skipped + result.unreadable.len();
        let catalog_dir = canonical(catalog_dir);

        for file in &result.unreadable {
            outcome.warnings.push(Warning::Io {
                path: relative_label(&catalog_dir, &canonical(&file.path)),
                message: file.message.clone(),
            });
        }

        let mut scanned: Vec<ScannedSource> = Vec::with_capacity(result.files.len());
        for file in &result.files {
            let label = relative_label(&catalog_dir, &canonical(&file.path));

            let decoded = match DecodedText::read_file(&file.path) {
                Ok(decoded) => decoded,
                Err(err) => {
                    log::warn!("{}: cannot read file: {}", label, err);
                    outcome.warnings.push(Warning::Io {
                        path: label,
                        message: err.to_string(),
                    });
                    outcome.summary.files_skipped += 1;
                    continue;
                }
            };

            match self.scan_content(file.kind, &decoded.text) {
                Ok(output) => {
                    log::debug!("{}: {} call site(s)", label, output.messages.len());
                    outcome.summary.files_scanned += 1;
                    scanned.push(ScannedSource { label, output });
                }
                Err(err) => {
                    log::warn!("{}:{}: skipping file: {}", label, err.line, err.message);
                    outcome.warnings.push(Warning::SourceParse {
                        file: label,
                        line: err.line,
                        message: err.message,
                    });
                    outcome.summary.files_skipped += 1;
                }
            }
        }

        let declared = declared_contexts(scanned.iter().map(|source| &source.output));

        for source in &scanned {
            outcome.messages.extend(
                source
                    .output
                    .messages
                    .iter()
                    .map(|raw| self.found(raw, &source.label, &declared)),
            );
        }
        outcome.summary.call_sites = outcome.messages.len();

        log::info!(
            "extracted {} call site(s) from {} file(s)",
            outcome.summary.call_sites,
            outcome.summary.files_scanned
        );
        outcome
    }

    fn found(
        &self,
        raw: &RawMessage,
        label: &str,
        declared: &HashMap<String, String>,
    ) -> FoundMessage {
        FoundMessage {
            context: self.resolve_context(&raw.context, declared),
            source_text: raw.source_text.clone(),
            disambiguation: raw.disambiguation.clone(),
            is_plural: raw.is_plural,
            file: label.to_string(),
            line: u32::try_from(raw.line).unwrap_or(u32::MAX),
            extra_comment: raw.extra_comment.clone(),
        }
    }

    fn resolve_context(
        &self,
        source: &ContextSource,
        declared: &HashMap<String, String>,
    ) -> String {
        match source {
            ContextSource::Explicit(name) => name.clone(),
            ContextSource::Lexical(scope) => {
                let name = scope.join("::");
                declared.get(&name).cloned().unwrap_or(name)
            }
            ContextSource::Member {
                enclosing,
                qualifier,
                using_namespaces,
                is_definition,
            } => {
                let mut candidates: Vec<String> = (0..=enclosing.len())
                    .rev()
                    .map(|depth| [&enclosing[..depth], qualifier.as_slice()].concat().join("::"))
                    .collect();
                candidates.extend(using_namespaces.iter().map(|namespace| {
                    [namespace.as_slice(), qualifier.as_slice()]
                        .concat()
                        .join("::")
                }));

                if let Some(context) = candidates.iter().find_map(|name| declared.get(name)) {
                    return context.clone();
                }
                if *is_definition {
                    [enclosing.as_slice(), qualifier.as_slice()].concat().join("::")
                } else {
                    qualifier.join("::")
                }
            }
            ContextSource::Default => self.options.default_context.clone(),
        }
    }
}

/// Qualified class name to context name; the first declaration wins
fn declared_contexts<'a>(
    outputs: impl IntoIterator<Item = &'a ScanOutput>,
) -> HashMap<String, String> {
    let mut declared = HashMap::new();
    for class in outputs.into_iter().flat_map(|output| &output.declared_classes) {
        declared
            .entry(class.qualified_name.clone())
            .or_insert_with(|| class.context_name.clone());
    }
    declared
}

/// Missing files are resolved through their parent directory
fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = dunce::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => dunce::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// `/`-separated path of `file` as seen from `base`, climbing with `..` when needed
pub fn relative_label(base: &Path, file: &Path) -> String {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = file.components().collect();

    let common = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    // Different roots (e.g. another drive) cannot be expressed relatively
    if common == 0 && !base.is_empty() {
        return to_slashes(file);
    }

    let mut parts: Vec<String> = vec!["..".to_string(); base.len() - common];
    parts.extend(
        target[common..]
            .iter()
            .map(|component| component.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn to_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn extractor() -> Extractor {
        Extractor::new(ScanConfig::default(), ExtractorOptions::default())
    }

    #[test]
    fn labels_are_relative_to_catalog_directory() {
        assert_eq!(
            relative_label(Path::new("/p/translations"), Path::new("/p/src/tiled/main.cpp")),
            "../src/tiled/main.cpp"
        );
        assert_eq!(
            relative_label(Path::new("/p"), Path::new("/p/src/main.cpp")),
            "src/main.cpp"
        );
    }

    #[test]
    fn resolves_out_of_line_members_across_files() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/mapeditor.h",
            "namespace Tiled {\nclass MapEditor : public QObject\n{\n    Q_OBJECT\n};\n}\n",
        );
        write(
            dir.path(),
            "src/mapeditor.cpp",
            "using namespace Tiled;\n\nvoid MapEditor::save()\n{\n    tr(\"Save\");\n}\n\nvoid Orphan::f() { tr(\"Orphan\"); }\n",
        );
        write(dir.path(), "src/main.cpp", "int main() { QObject::tr(\"Hello\"); tr(\"Free\"); }\n");
        fs::create_dir_all(dir.path().join("translations")).unwrap();

        let outcome = extractor()
            .extract(dir.path(), &dir.path().join("translations"))
            .unwrap();
        let found: Vec<(&str, &str, &str, u32)> = outcome
            .messages
            .iter()
            .map(|m| (m.context.as_str(), m.source_text.as_str(), m.file.as_str(), m.line))
            .collect();
        assert_eq!(
            found,
            vec![
                ("QObject", "Hello", "../src/main.cpp", 1),
                ("Global", "Free", "../src/main.cpp", 1),
                ("Tiled::MapEditor", "Save", "../src/mapeditor.cpp", 5),
                ("Orphan", "Orphan", "../src/mapeditor.cpp", 8),
            ]
        );
        assert_eq!(outcome.summary.files_scanned, 3);
        assert_eq!(outcome.summary.call_sites, 4);
    }

    #[test]
    fn broken_files_become_warnings() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.cpp", "void A::f() { tr(\"fine\"); }\n");
        write(dir.path(), "b.cpp", "void f() {\n  tr(\"broken);\n}\n");
        write(dir.path(), "c.ui", "<ui><class>Form</class><string>Title</string></ui>");

        let outcome = extractor().extract(dir.path(), dir.path()).unwrap();
        let texts: Vec<&str> = outcome.messages.iter().map(|m| m.source_text.as_str()).collect();
        assert_eq!(texts, vec!["fine", "Title"]);
        assert_eq!(outcome.messages[1].context, "Form");
        assert_eq!(outcome.summary.files_skipped, 1);
        assert_eq!(
            outcome.warnings,
            vec![Warning::SourceParse {
                file: "b.cpp".into(),
                line: 2,
                message: "unterminated string literal".into(),
            }]
        );
    }

    #[test]
    fn missing_listed_file_does_not_lose_the_others() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.cpp", "void A::f() { tr(\"kept\"); }\n");
        let files = vec![dir.path().join("a.cpp"), dir.path().join("gone.cpp")];

        let outcome = extractor().extract_files(dir.path(), &files, dir.path()).unwrap();
        let texts: Vec<&str> = outcome.messages.iter().map(|m| m.source_text.as_str()).collect();
        assert_eq!(texts, vec!["kept"]);
        assert_eq!(outcome.summary.files_scanned, 1);
        assert_eq!(outcome.summary.files_skipped, 1);
        assert!(matches!(
            outcome.warnings.as_slice(),
            [Warning::Io { path, .. }] if path == "gone.cpp"
        ));
    }

    #[test]
    fn default_context_is_configurable() {
        let options = ExtractorOptions {
            default_context: "App".into(),
            ..ExtractorOptions::default()
        };
        let extractor = Extractor::new(ScanConfig::default(), options);
        let found = extractor
            .extract_source(SourceKind::Cpp, "main.cpp", "void f() { tr(\"Hi\"); }")
            .unwrap();
        assert_eq!(found[0].context, "App");
        assert_eq!(found[0].file, "main.cpp");
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = extractor()
            .extract(&dir.path().join("nope"), dir.path())
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotADirectory(_)));
    }
}
