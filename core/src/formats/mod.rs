/// Catalog file formats
/// Only Qt Linguist TS is supported; the format is chosen by extension.
pub mod ts;

use crate::catalog::Catalog;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Structural problems found while reading a TS document
#[derive(Debug, Error)]
pub enum CatalogParseError {
    #[error("line {line}: malformed XML: {message}")]
    Xml { line: usize, message: String },

    #[error("document has no <TS> root element")]
    MissingRoot,

    #[error("line {line}: <TS> element has no version attribute")]
    MissingVersion { line: usize },

    #[error("line {line}: unexpected {found} inside <{parent}>")]
    Unexpected {
        line: usize,
        found: String,
        parent: String,
    },

    #[error("line {line}: <{element}> is missing {child}")]
    MissingElement {
        line: usize,
        element: &'static str,
        child: &'static str,
    },

    #[error("line {line}: invalid {attribute}=\"{value}\"")]
    InvalidAttribute {
        line: usize,
        attribute: String,
        value: String,
    },

    #[error("line {line}: duplicate message in context '{context}'")]
    DuplicateMessage { line: usize, context: String },

    #[error("unexpected end of document inside <{element}>")]
    UnexpectedEof { element: String },
}

impl CatalogParseError {
    /// Line the error was detected on, when known
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Xml { line, .. }
            | Self::MissingVersion { line }
            | Self::Unexpected { line, .. }
            | Self::MissingElement { line, .. }
            | Self::InvalidAttribute { line, .. }
            | Self::DuplicateMessage { line, .. } => Some(*line),
            Self::MissingRoot | Self::UnexpectedEof { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: CatalogParseError,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported catalog format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    Ts,
}

impl CatalogFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ts" => Some(Self::Ts),
            _ => None,
        }
    }

    /// Detect format from path. Paths without an extension are treated as TS.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => Some(Self::Ts),
        }
    }
}

pub fn load_catalog(path: &Path) -> Result<Catalog, FormatError> {
    match CatalogFormat::from_path(path) {
        Some(CatalogFormat::Ts) => ts::read(path),
        None => Err(FormatError::UnsupportedFormat(path.to_path_buf())),
    }
}

pub fn render_catalog(catalog: &Catalog, format: CatalogFormat) -> Vec<u8> {
    match format {
        CatalogFormat::Ts => ts::write_bytes(catalog),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn detects_format_from_extension() {
        let detect = |name: &str| CatalogFormat::from_path(Path::new(name));
        assert_eq!(detect("i18n/tiled_hi.ts"), Some(CatalogFormat::Ts));
        assert_eq!(detect("i18n/tiled_hi.TS"), Some(CatalogFormat::Ts));
        assert_eq!(CatalogFormat::from_path(Path::new("i18n/tiled_hi.po")), None);
    }

    #[test]
    fn load_reports_path_and_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.ts");
        fs::write(&path, "<TS version=\"2.1\">\n<context>\n").unwrap();

        let err = load_catalog(&path).unwrap_err();
        match &err {
            FormatError::Parse { path: reported, source } => {
                assert_eq!(reported, &path);
                assert!(matches!(source, CatalogParseError::UnexpectedEof { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("broken.ts"));
    }

    #[test]
    fn load_accepts_utf8_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.ts");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<TS version=\"2.1\" language=\"hi\"></TS>\n");
        fs::write(&path, bytes).unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.language, "hi");
    }
}
