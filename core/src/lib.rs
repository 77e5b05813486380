pub mod backup;
pub mod catalog;
pub mod config;
pub mod encoding;
pub mod extractor;
pub mod formats;
pub mod merge;
pub mod pipeline;
pub mod plural;
pub mod report;
pub mod scanner;
pub mod scanners;

pub use catalog::{
    Catalog, CatalogError, CatalogStats, Context, LocationStyle, Message, MessageKey, MessageStatus,
    SourceReference, Translation,
};
pub use config::{CatalogOptions, ConfigError, IgnoreOptions, SyncConfig};
pub use extractor::{ExtractError, ExtractionOutcome, Extractor, ExtractorOptions, FoundMessage};
pub use formats::{load_catalog, CatalogFormat, CatalogParseError, FormatError};
pub use merge::{merge, prune, MergeOptions, MergeReport, PruneOptions, PruneReport};
pub use pipeline::{
    catalog_stats, check_catalog, prune_catalog, PruneOutcome, SyncError, SyncPipeline,
    SyncRequest,
};
pub use report::{ExtractionSummary, RunReport, Warning};
pub use scanners::{default_markers, MarkerSpec};
