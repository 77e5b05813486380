/// One synchronisation run: extract, merge, normalise and write
///
/// Every step before the final rename works in memory, so a fatal error at
/// any point leaves the output file untouched.

use crate::backup::{backup_and_swap, BackupError};
use crate::catalog::{Catalog, CatalogError, CatalogStats};
use crate::config::SyncConfig;
use crate::extractor::{ExtractError, Extractor};
use crate::formats::{self, CatalogFormat, FormatError};
use crate::merge::{self, MergeOptions, PruneOptions, PruneReport};
use crate::plural;
use crate::report::{RunReport, Warning};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] FormatError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("merge failed: {0}")]
    Merge(#[from] CatalogError),

    #[error("a new catalog needs a target locale")]
    MissingLocale,

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: BackupError,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Inputs of one `extract` run
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub source_root: PathBuf,
    /// Catalog to merge into; `None` starts a new one
    pub existing: Option<PathBuf>,
    pub output: PathBuf,
    /// Target locale; required for new catalogs, overrides a loaded one
    pub locale: Option<String>,
    /// Scan these files instead of walking `source_root`
    pub files: Option<Vec<PathBuf>>,
}

impl SyncRequest {
    pub fn new(
        source_root: impl Into<PathBuf>,
        existing: Option<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            existing,
            output: output.into(),
            locale: None,
            files: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, request: &SyncRequest) -> Result<RunReport, SyncError> {
        let format = output_format(&request.output)?;
        let mut catalog = self.open_catalog(request)?;

        let catalog_dir = parent_dir(&request.output);
        let extractor = Extractor::new(self.config.scan.clone(), self.config.extractor.clone());
        let extraction = match &request.files {
            Some(files) => extractor.extract_files(&request.source_root, files, &catalog_dir)?,
            None => extractor.extract(&request.source_root, &catalog_dir)?,
        };
        let mut warnings = extraction.warnings;

        let options = MergeOptions {
            prune_empty_contexts: self.config.catalog.prune_empty_contexts,
        };
        let mut merge_report = merge::merge(&mut catalog, &extraction.messages, &options)?;
        warnings.append(&mut merge_report.warnings);
        warnings.extend(plural::normalize_plural_forms(&mut catalog));

        info!(
            "{} new, {} updated, {} resurrected, {} obsoleted, {} vanished",
            merge_report.new_messages,
            merge_report.updated,
            merge_report.resurrected,
            merge_report.obsoleted,
            merge_report.vanished
        );

        let rendered = formats::render_catalog(&catalog, format);
        let (written, backup) =
            write_if_changed(&request.output, &rendered, self.config.catalog.backup)?;

        Ok(RunReport {
            output: request.output.clone(),
            backup,
            written,
            extraction: extraction.summary,
            merge: merge_report,
            stats: catalog.stats(),
            warnings,
        })
    }

    fn open_catalog(&self, request: &SyncRequest) -> Result<Catalog, SyncError> {
        let mut catalog = match &request.existing {
            Some(path) => {
                let mut catalog = formats::load_catalog(path)?;
                if let Some(locale) = request.locale.as_deref() {
                    if catalog.language != locale {
                        info!(
                            "retargeting {} from '{}' to '{}'",
                            path.display(),
                            catalog.language,
                            locale
                        );
                        catalog.language = locale.to_string();
                    }
                }
                catalog
            }
            None => {
                let locale = request.locale.as_deref().ok_or(SyncError::MissingLocale)?;
                let mut catalog = Catalog::new(locale);
                catalog.source_language = self.config.catalog.source_language.clone();
                catalog
            }
        };

        if let Some(style) = self.config.catalog.location_style {
            catalog.location_style = style;
        }
        Ok(catalog)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    pub written: bool,
    pub report: PruneReport,
    pub stats: CatalogStats,
}

/// Loads `input`, hard-removes what `options` selects and writes the result
/// to `output` (which may be the same file)
pub fn prune_catalog(
    input: &Path,
    output: &Path,
    options: &PruneOptions,
    keep_backup: bool,
) -> Result<PruneOutcome, SyncError> {
    let format = output_format(output)?;
    let mut catalog = formats::load_catalog(input)?;
    let report = merge::prune(&mut catalog, options);
    if report.removed_messages > 0 {
        warn!(
            "removed {} message(s) and their translations from {}",
            report.removed_messages,
            input.display()
        );
    }

    let rendered = formats::render_catalog(&catalog, format);
    let (written, backup) = write_if_changed(output, &rendered, keep_backup)?;

    Ok(PruneOutcome {
        output: output.to_path_buf(),
        backup,
        written,
        report,
        stats: catalog.stats(),
    })
}

/// Per-status counts of a catalog on disk
pub fn catalog_stats(path: &Path) -> Result<CatalogStats, SyncError> {
    Ok(formats::load_catalog(path)?.stats())
}

/// Plural and locale problems of a catalog; the file is left as it is
pub fn check_catalog(path: &Path) -> Result<Vec<Warning>, SyncError> {
    let mut catalog = formats::load_catalog(path)?;
    Ok(plural::normalize_plural_forms(&mut catalog))
}

/// Returns whether the file was replaced and the backup made, if any
fn write_if_changed(
    output: &Path,
    contents: &[u8],
    keep_backup: bool,
) -> Result<(bool, Option<PathBuf>), SyncError> {
    match fs::read(output) {
        Ok(current) if current == contents => {
            debug!("{} is up to date", output.display());
            return Ok((false, None));
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SyncError::Read {
                path: output.to_path_buf(),
                source,
            })
        }
    }

    let outcome = backup_and_swap(output, contents, keep_backup).map_err(|source| {
        SyncError::Write {
            path: output.to_path_buf(),
            source,
        }
    })?;
    info!("wrote {}", outcome.final_path.display());
    Ok((true, outcome.backup_path))
}

fn output_format(output: &Path) -> Result<CatalogFormat, SyncError> {
    CatalogFormat::from_path(output)
        .ok_or_else(|| SyncError::Catalog(FormatError::UnsupportedFormat(output.to_path_buf())))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
