//! PDF Batch QA Library
//!
//! Quality assessment of PDF digitisation batches: image and document
//! properties are extracted from every PDF, checked against the Schematron
//! schema a profile assigns to the file, and summarized per batch.

pub mod batch;
pub mod config;
pub mod core;
pub mod error;
pub mod profile;
pub mod reporting;
pub mod scanner;

pub use crate::core::validator;
pub use crate::reporting::report_writer;
pub use crate::scanner::file_scanner;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batch::{process_file, run_batch, BatchContext, BatchSummary, FileOutcome, Stage};
    pub use crate::config::{default_config_path, Config};
    pub use crate::core::extractor::{extract, ExtractOptions};
    pub use crate::core::properties::PropertyDocument;
    pub use crate::core::quant_tables::{estimate_jpeg_quality, estimate_quality, QualityEstimate};
    pub use crate::core::schematron::{SchemaEngine, SchematronEngine};
    pub use crate::core::tools::ExternalTools;
    pub use crate::core::validator::{interpret, validate, Status, ValidationOutcome, ValidationVerdict};
    pub use crate::error::{ConfigError, ExtractionError, ValidationEngineError};
    pub use crate::profile::{list_profiles, resolve, Profile, Resolution, SchemaRule, LIST_KEYWORDS};
    pub use crate::reporting::report_writer::{OutputPaths, ReportWriter};
    pub use crate::scanner::file_scanner::collect_pdf_files;
}
