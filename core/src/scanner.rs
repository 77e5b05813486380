/// Source file discovery with kind detection and exclusion rules
use crate::config::{matches_ignore_pattern, IgnoreOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// C, C++ and Objective-C++ sources and headers
    Cpp,
    /// Qt Designer `.ui` forms
    DesignerForm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default = "default_cpp_extensions")]
    pub cpp_extensions: Vec<String>,

    #[serde(default = "default_form_extensions")]
    pub form_extensions: Vec<String>,

    /// Maximum file size in bytes (default: 8MB)
    #[serde(default = "default_max_size")]
    pub max_file_size: usize,

    /// Binary detection threshold (share of control bytes)
    #[serde(default = "default_binary_threshold")]
    pub binary_threshold: f32,

    #[serde(default)]
    pub ignore: IgnoreOptions,
}

fn default_cpp_extensions() -> Vec<String> {
    ["c", "cc", "cpp", "cxx", "c++", "h", "hh", "hpp", "hxx", "h++", "mm"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_form_extensions() -> Vec<String> {
    vec!["ui".to_string()]
}

fn default_max_size() -> usize {
    8 * 1024 * 1024
}

fn default_binary_threshold() -> f32 {
    0.10
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cpp_extensions: default_cpp_extensions(),
            form_extensions: default_form_extensions(),
            max_file_size: default_max_size(),
            binary_threshold: default_binary_threshold(),
            ignore: IgnoreOptions::default(),
        }
    }
}

impl ScanConfig {
    pub fn classify(&self, path: &Path) -> Option<SourceKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if self.cpp_extensions.iter().any(|known| known.eq_ignore_ascii_case(&ext)) {
            Some(SourceKind::Cpp)
        } else if self.form_extensions.iter().any(|known| known.eq_ignore_ascii_case(&ext)) {
            Some(SourceKind::DesignerForm)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedFile {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub size: u64,
    /// `/`-separated path below the scan root
    pub relative_path: String,
}

/// A candidate whose metadata or content could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableFile {
    pub path: PathBuf,
    pub message: String,
}

/// Files found under a root, in traversal order, plus how many candidates were skipped
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub skipped: usize,
    pub unreadable: Vec<UnreadableFile>,
}

impl ScanResult {
    fn record_unreadable(&mut self, path: &Path, err: impl std::fmt::Display) {
        log::warn!("{}: cannot read: {}", path.display(), err);
        self.unreadable.push(UnreadableFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        });
    }
}

#[derive(Debug)]
pub struct FileScanner {
    config: ScanConfig,
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            ignore_patterns: Vec::new(),
        }
    }

    /// Walks `root` depth-first with entries sorted by file name, so the
    /// result is identical across runs and platforms. Only an unreadable root
    /// is an error; entries below it that cannot be read are reported in
    /// `ScanResult::unreadable`.
    pub fn scan(&self, root: &Path) -> Result<ScanResult, io::Error> {
        let scanner = Self {
            config: self.config.clone(),
            ignore_patterns: self.config.ignore.collect_patterns(root),
        };

        let mut result = ScanResult::default();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !scanner.is_path_ignored(&format!("{}/", relative_path(root, entry.path())))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(err.into()),
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    result.record_unreadable(&path, err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || scanner.config.classify(entry.path()).is_none() {
                continue;
            }
            let relative = relative_path(root, entry.path());
            match scanner.process_file(entry.path(), &relative) {
                Ok(Some(scanned)) => result.files.push(scanned),
                Ok(None) => result.skipped += 1,
                Err(err) => result.record_unreadable(entry.path(), err),
            }
        }

        log::debug!(
            "found {} source file(s) under {} ({} skipped)",
            result.files.len(),
            root.display(),
            result.skipped
        );
        Ok(result)
    }

    /// Uses an explicit file list instead of walking a tree. Order is kept as
    /// given; ignore patterns do not apply.
    pub fn scan_files(&self, root: &Path, files: &[PathBuf]) -> ScanResult {
        let mut result = ScanResult::default();
        for path in files {
            let size = match fs::metadata(path) {
                Ok(metadata) => metadata.len(),
                Err(err) => {
                    result.record_unreadable(path, err);
                    continue;
                }
            };
            match self.config.classify(path) {
                Some(kind) => result.files.push(ScannedFile {
                    path: path.clone(),
                    kind,
                    size,
                    relative_path: relative_path(root, path),
                }),
                None => {
                    log::warn!("{}: not a recognised source file, skipping", path.display());
                    result.skipped += 1;
                }
            }
        }
        result
    }

    fn process_file(
        &self,
        path: &Path,
        relative_path: &str,
    ) -> Result<Option<ScannedFile>, io::Error> {
        let kind = match self.config.classify(path) {
            Some(kind) => kind,
            None => return Ok(None),
        };

        if self.is_path_ignored(relative_path) {
            return Ok(None);
        }

        let size = fs::metadata(path)?.len();
        if size > self.config.max_file_size as u64 {
            log::warn!(
                "{}: larger than {} bytes, skipping",
                relative_path,
                self.config.max_file_size
            );
            return Ok(None);
        }

        if self.is_binary(path)? {
            log::warn!("{}: looks binary, skipping", relative_path);
            return Ok(None);
        }

        Ok(Some(ScannedFile {
            path: path.to_path_buf(),
            kind,
            size,
            relative_path: relative_path.to_string(),
        }))
    }

    fn is_path_ignored(&self, relative_path: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| matches_ignore_pattern(relative_path, pattern))
    }

    fn is_binary(&self, path: &Path) -> Result<bool, io::Error> {
        let content = fs::read(path)?;

        // UTF-16 sources are full of NUL bytes but are still text
        if content.starts_with(&[0xFF, 0xFE]) || content.starts_with(&[0xFE, 0xFF]) {
            return Ok(false);
        }

        let sample = &content[..content.len().min(8192)];
        if sample.is_empty() {
            return Ok(false);
        }
        let control = sample
            .iter()
            .filter(|&&b| b < 32 && b != b'\n' && b != b'\r' && b != b'\t' && b != 0x0C)
            .count();

        let ratio = control as f32 / sample.len() as f32;
        Ok(ratio > self.config.binary_threshold)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
