/// Configuration for catalog synchronisation
use crate::catalog::LocationStyle;
use crate::extractor::ExtractorOptions;
use crate::scanner::ScanConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Per-tree ignore file, one gitignore-lite pattern per line
pub const IGNORE_FILE_NAME: &str = ".catalogsyncignore";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse JSON config: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Paths excluded from source discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreOptions {
    /// User patterns (gitignore-lite)
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Read `.catalogsyncignore` from the source root
    #[serde(default = "default_true")]
    pub use_ignore_file: bool,

    /// VCS folders, build output, binaries and media
    #[serde(default = "default_true")]
    pub use_default_patterns: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IgnoreOptions {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            use_ignore_file: true,
            use_default_patterns: true,
        }
    }
}

impl IgnoreOptions {
    pub fn load_ignore_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, std::io::Error> {
        let content = fs::read_to_string(path)?;
        Ok(parse_ignore_patterns(&content))
    }

    /// Default, ignore-file and user patterns, in that order
    pub fn collect_patterns<P: AsRef<Path>>(&self, source_root: P) -> Vec<String> {
        let mut patterns = Vec::new();

        if self.use_default_patterns {
            patterns.extend(default_ignore_patterns());
        }

        if self.use_ignore_file {
            let ignore_path = source_root.as_ref().join(IGNORE_FILE_NAME);
            if let Ok(file_patterns) = Self::load_ignore_file(&ignore_path) {
                log::debug!(
                    "loaded {} pattern(s) from {}",
                    file_patterns.len(),
                    ignore_path.display()
                );
                patterns.extend(file_patterns);
            }
        }

        patterns.extend(self.patterns.clone());

        patterns
    }
}

pub fn parse_ignore_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}

pub fn default_ignore_patterns() -> Vec<String> {
    [
        // VCS and tooling
        ".git/",
        ".svn/",
        ".hg/",
        "node_modules/",
        // build output
        "build/",
        "target/",
        "*.o",
        "*.obj",
        "*.a",
        "*.lib",
        "*.so",
        "*.dll",
        "*.dylib",
        "*.exe",
        // generated by uic/moc
        "ui_*",
        "moc_*",
        "qrc_*",
    ]
    .iter()
    .map(|pattern| pattern.to_string())
    .collect()
}

/// Case-insensitive match of a `/`-separated relative path against one pattern.
/// Directory paths are passed with a trailing `/`.
pub fn matches_ignore_pattern(path: &str, pattern: &str) -> bool {
    let path_lower = path.to_lowercase();
    let pattern_lower = pattern.to_lowercase();

    // Directory pattern
    if let Some(dir_pattern) = pattern_lower.strip_suffix('/') {
        return path_lower.contains(&format!("/{}/", dir_pattern))
            || path_lower.contains(&format!("\\{}\\", dir_pattern))
            || path_lower.starts_with(&format!("{}/", dir_pattern))
            || path_lower.starts_with(&format!("{}\\", dir_pattern));
    }

    // Extension pattern (*.ext)
    if let Some(ext) = pattern_lower.strip_prefix('*') {
        if ext.starts_with('.') {
            return path_lower.ends_with(ext);
        }
    }

    // File name prefix (moc_*)
    if let Some(prefix) = pattern_lower.strip_suffix('*') {
        if path_lower.ends_with('/') {
            return false;
        }
        let filename = path_lower.rsplit(&['/', '\\']).next().unwrap_or(&path_lower);
        return filename.starts_with(prefix);
    }

    path_lower.contains(&pattern_lower)
}

/// Catalog-side behaviour of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOptions {
    /// Forces a location style; the style found in the existing catalog is kept otherwise
    #[serde(default)]
    pub location_style: Option<LocationStyle>,

    #[serde(default)]
    pub prune_empty_contexts: bool,

    /// Keep a timestamped copy of the catalog being replaced
    #[serde(default = "default_true")]
    pub backup: bool,

    /// `sourcelanguage` for newly created catalogs
    #[serde(default)]
    pub source_language: Option<String>,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            location_style: None,
            prune_empty_contexts: false,
            backup: true,
            source_language: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub extractor: ExtractorOptions,
    #[serde(default)]
    pub catalog: CatalogOptions,
}

impl SyncConfig {
    /// Loads JSON, or YAML when the file ends in `.yaml`/`.yml`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "yaml" | "yml"))
            .unwrap_or(false);

        if is_yaml {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.catalog.backup);
        assert!(!config.catalog.prune_empty_contexts);
        assert_eq!(config.catalog.location_style, None);
        assert_eq!(config.extractor.default_context, "Global");
        assert!(config.scan.cpp_extensions.contains(&"cpp".to_string()));
    }

    #[test]
    fn test_json_serialization() {
        let mut config = SyncConfig::default();
        config.catalog.location_style = Some(LocationStyle::Absolute);
        let json = config.to_json().unwrap();
        let deserialized = SyncConfig::from_json(&json).unwrap();

        assert_eq!(deserialized.catalog.location_style, Some(LocationStyle::Absolute));
        assert_eq!(deserialized.extractor.markers.len(), config.extractor.markers.len());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SyncConfig::from_json(
            r#"{ "catalog": { "pruneEmptyContexts": true }, "extractor": { "defaultContext": "App" } }"#,
        )
        .unwrap();
        assert!(config.catalog.prune_empty_contexts);
        assert!(config.catalog.backup);
        assert_eq!(config.extractor.default_context, "App");
        assert!(!config.extractor.markers.is_empty());
    }

    #[test]
    fn test_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog-sync.yaml");
        fs::write(
            &path,
            "catalog:\n  locationStyle: none\n  backup: false\nscan:\n  ignore:\n    patterns: [\"3rdparty/\"]\n",
        )
        .unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.catalog.location_style, Some(LocationStyle::None));
        assert!(!config.catalog.backup);
        assert_eq!(config.scan.ignore.patterns, vec!["3rdparty/".to_string()]);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SyncConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_parse_ignore_patterns() {
        let content = r#"
# Comment line
*.o
3rdparty/

moc_*
"#;
        let patterns = parse_ignore_patterns(content);
        assert_eq!(patterns, vec!["*.o", "3rdparty/", "moc_*"]);
    }

    #[test]
    fn test_matches_ignore_pattern() {
        // Extension patterns
        assert!(matches_ignore_pattern("lib/zlib.dll", "*.dll"));
        assert!(!matches_ignore_pattern("src/main.cpp", "*.dll"));

        // Directory patterns
        assert!(matches_ignore_pattern("build/", "build/"));
        assert!(matches_ignore_pattern("src/build/moc.cpp", "build/"));
        assert!(!matches_ignore_pattern("buildtools/gen.cpp", "build/"));

        // Prefix wildcard patterns
        assert!(matches_ignore_pattern("src/moc_mainwindow.cpp", "moc_*"));
        assert!(!matches_ignore_pattern("src/mainwindow_moc.cpp", "moc_*"));
        assert!(!matches_ignore_pattern("moc_dir/", "moc_*"));

        // Case insensitive
        assert!(matches_ignore_pattern("BIN/TOOL.EXE", "*.exe"));
    }

    #[test]
    fn test_collect_patterns_reads_ignore_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(IGNORE_FILE_NAME), "3rdparty/\n").unwrap();

        let options = IgnoreOptions {
            patterns: vec!["*.generated.cpp".into()],
            use_ignore_file: true,
            use_default_patterns: false,
        };
        assert_eq!(
            options.collect_patterns(dir.path()),
            vec!["3rdparty/".to_string(), "*.generated.cpp".to_string()]
        );
    }
}
