//! Batch driver: runs schema selection, extraction and validation per file

use anyhow::Result;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

use crate::core::extractor::{extract, ExtractOptions};
use crate::core::properties::PropertyDocument;
use crate::core::schematron::SchemaEngine;
use crate::core::svrl::SvrlReport;
use crate::core::validator::{validate, FailedAssertion, Status};
use crate::profile::{Profile, Resolution};
use crate::reporting::report_writer::ReportWriter;

/// Processing stages of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovered,
    SchemaResolved,
    SchemaUnmatched,
    Extracted,
    ExtractionFailed,
    Validated,
    ValidationFailed,
    Reported,
}

/// Everything known about one file after processing.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// Stages passed through, in order.
    pub stages: Vec<Stage>,
    pub status: Status,
    pub properties: Option<PropertyDocument>,
    pub report: Option<SvrlReport>,
    pub failed_assertions: Vec<FailedAssertion>,
    /// Failure descriptions that are not schema assertions.
    pub diagnostics: Vec<String>,
}

impl FileOutcome {
    fn discovered(path: &Path) -> Self {
        FileOutcome {
            path: path.to_path_buf(),
            stages: vec![Stage::Discovered],
            status: Status::Pass,
            properties: None,
            report: None,
            failed_assertions: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Discovered)
    }

    pub fn page_count(&self) -> Option<usize> {
        self.properties.as_ref().map(|p| p.page_count)
    }

    /// All failure descriptions, diagnostics first.
    pub fn descriptions(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .cloned()
            .chain(self.failed_assertions.iter().map(|a| a.to_string()))
            .collect()
    }

    fn advance(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    fn fail(&mut self, stage: Stage, description: String) {
        self.stages.push(stage);
        self.status = Status::Fail;
        self.diagnostics.push(description);
    }
}

/// Run-wide state shared by all files.
pub struct BatchContext {
    pub profile: Profile,
    pub engine: Box<dyn SchemaEngine>,
    pub extract_options: ExtractOptions,
    pub verbose: bool,
}

/// Process one file up to the point where it can be reported.
pub fn process_file(ctx: &BatchContext, path: &Path) -> FileOutcome {
    let mut outcome = FileOutcome::discovered(path);

    let schema_path = match ctx.profile.resolve(path) {
        Resolution::Schema(schema_path) => schema_path,
        Resolution::NoMatch => {
            debug!(file = %path.display(), "no schema rule matches");
            outcome.fail(
                Stage::SchemaUnmatched,
                "Name of file or parent directory does not match any schema".to_string(),
            );
            return outcome;
        }
    };
    outcome.advance(Stage::SchemaResolved);

    let schema_source = match ctx.profile.schema_source(&schema_path) {
        Some(source) => source,
        None => {
            outcome.fail(
                Stage::ValidationFailed,
                format!("Schema {} is not loaded", schema_path.display()),
            );
            return outcome;
        }
    };

    let properties = match extract(path, &ctx.extract_options) {
        Ok(properties) => properties,
        Err(e) => {
            warn!(file = %path.display(), "extraction failed: {}", e);
            outcome.fail(Stage::ExtractionFailed, format!("Error extracting properties: {}", e));
            return outcome;
        }
    };
    outcome.advance(Stage::Extracted);

    for (page_number, page) in properties.pages.iter().enumerate() {
        for image in &page.images {
            if let Some(message) = &image.decode_error {
                outcome.status = Status::Fail;
                outcome.diagnostics.push(format!(
                    "Image {} on page {} could not be decoded: {}",
                    image.pdf.xref,
                    page_number + 1,
                    message
                ));
            }
        }
    }

    let validation = validate(ctx.engine.as_ref(), schema_source, &properties, ctx.verbose);
    outcome.advance(if validation.report.is_some() {
        Stage::Validated
    } else {
        Stage::ValidationFailed
    });
    if validation.verdict.status == Status::Fail {
        outcome.status = Status::Fail;
    }
    outcome.failed_assertions = validation.verdict.failed_assertions;
    outcome.report = validation.report;
    outcome.properties = Some(properties);

    debug!(file = %path.display(), status = %outcome.status, "processed");
    outcome
}

/// Counts for the closing summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub passed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Process `files` and append every outcome to `writer`.
///
/// Files are handled in chunks of `workers`; each chunk runs on the rayon pool
/// and its outcomes are written in input order before the next chunk starts.
/// A set `shutdown` flag stops the run between chunks.
///
/// # Arguments
/// * `ctx` - Profile, engine and options shared by all files
/// * `files` - Files in discovery order
/// * `writer` - Destination of the report, status CSV and failed log
/// * `workers` - Number of files processed at once
/// * `shutdown` - Flag set by the Ctrl-C handler
/// * `progress` - Progress bar advanced once per file
///
/// # Returns
/// Counts of processed, passed and failed files
pub fn run_batch(
    ctx: &BatchContext,
    files: &[PathBuf],
    writer: &mut ReportWriter,
    workers: usize,
    shutdown: &AtomicBool,
    progress: &ProgressBar,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for chunk in files.chunks(workers.max(1)) {
        if shutdown.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }

        let outcomes: Vec<FileOutcome> = chunk
            .par_iter()
            .progress_with(progress.clone())
            .map(|path| process_isolated(ctx, path))
            .collect();

        for mut outcome in outcomes {
            writer.append_outcome(&outcome)?;
            outcome.advance(Stage::Reported);
            debug!(file = %outcome.path.display(), stages = ?outcome.stages, "reported");

            summary.processed += 1;
            match outcome.status {
                Status::Pass => summary.passed += 1,
                Status::Fail => summary.failed += 1,
            }
        }
    }

    Ok(summary)
}

/// [`process_file`] with panics turned into a failed outcome.
fn process_isolated(ctx: &BatchContext, path: &Path) -> FileOutcome {
    panic::catch_unwind(AssertUnwindSafe(|| process_file(ctx, path))).unwrap_or_else(|_| {
        error!(file = %path.display(), "panic while processing file");
        let mut outcome = FileOutcome::discovered(path);
        outcome.fail(Stage::ExtractionFailed, "Processing aborted by an internal error".to_string());
        outcome
    })
}
