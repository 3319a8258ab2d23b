//! Output of batch results

pub mod report_writer;
pub mod xml;

pub use report_writer::{OutputPaths, ReportWriter, SummaryRow};
