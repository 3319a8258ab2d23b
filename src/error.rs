//! Error types for the batch QA library

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. These end the run before any file is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{} does not exist!", .0.display())]
    MissingFile(PathBuf),

    #[error("{} is not a directory!", .0.display())]
    MissingDirectory(PathBuf),

    #[error("profile is undefined")]
    ProfileUndefined,

    #[error("error parsing {}: {reason}", path.display())]
    MalformedProfile { path: PathBuf, reason: String },

    #[error("invalid value '{value}' for attribute '{attribute}' in profile {}", path.display())]
    InvalidRule {
        path: PathBuf,
        attribute: &'static str,
        value: String,
    },

    #[error("error reading configuration file {}: {reason}", path.display())]
    MalformedConfig { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to build a property document for one PDF.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF parser panicked")]
    Panic,

    #[error("document has no catalog")]
    MissingCatalog,
}

/// The Schematron engine could not compile or run a schema.
#[derive(Error, Debug)]
pub enum ValidationEngineError {
    #[error("schema could not be compiled: {0}")]
    Compile(String),

    #[error("data document could not be parsed: {0}")]
    Data(String),

    #[error("XPath evaluation failed: {0}")]
    Evaluation(String),
}

/// An SVRL report could not be read back.
#[derive(Error, Debug)]
#[error("invalid SVRL report: {0}")]
pub struct ReportParseError(pub String);

/// JPEG compression parameters could not be recovered from a stream.
#[derive(Error, Debug, PartialEq)]
pub enum QualityError {
    #[error("not a JPEG stream")]
    NotJpeg,

    #[error("truncated JPEG stream")]
    Truncated,

    #[error("no luminance quantization table")]
    NoLuminanceTable,
}

/// An external command-line tool failed.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("could not run {}: {source}", tool.display())]
    Spawn {
        tool: PathBuf,
        source: std::io::Error,
    },

    #[error("{} exited with status {status}", tool.display())]
    ExitStatus { tool: PathBuf, status: i32 },

    #[error("unexpected output from {}", tool.display())]
    Output { tool: PathBuf },
}
