//! Validation of property documents and interpretation of SVRL reports

use std::fmt;
use tracing::{debug, warn};

use super::properties::PropertyDocument;
use super::schematron::SchemaEngine;
use super::svrl::SvrlReport;
use crate::error::ReportParseError;

/// Test id used when the engine itself failed.
pub const ENGINE_FAILURE_ID: &str = "schematron-engine";
/// Test id used when the engine output could not be read.
pub const REPORT_FAILURE_ID: &str = "svrl-report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One assertion that did not hold: the XPath test and its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAssertion {
    pub test_id: String,
    pub description: String,
}

impl fmt::Display for FailedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test \"{}\" failed ({})", self.test_id, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub status: Status,
    pub failed_assertions: Vec<FailedAssertion>,
}

impl ValidationVerdict {
    fn failed(test_id: &str, description: String) -> Self {
        ValidationVerdict {
            status: Status::Fail,
            failed_assertions: vec![FailedAssertion {
                test_id: test_id.to_string(),
                description,
            }],
        }
    }
}

/// Verdict plus the part of the report kept for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub verdict: ValidationVerdict,
    pub report: SvrlReport,
}

/// Read an SVRL report.
///
/// Status is `Fail` as soon as one assertion failed, regardless of
/// `verbose`. Without `verbose` the kept report holds the failed
/// assertions only.
pub fn interpret(svrl_xml: &str, verbose: bool) -> Result<Interpretation, ReportParseError> {
    let report = SvrlReport::parse(svrl_xml)?;

    let failed_assertions: Vec<FailedAssertion> = report
        .failed_asserts()
        .map(|finding| FailedAssertion {
            test_id: finding.test.clone(),
            description: finding.text.clone(),
        })
        .collect();

    let status = if failed_assertions.is_empty() {
        Status::Pass
    } else {
        Status::Fail
    };

    Ok(Interpretation {
        verdict: ValidationVerdict {
            status,
            failed_assertions,
        },
        report: if verbose { report } else { report.failures_only() },
    })
}

/// Result of validating one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub verdict: ValidationVerdict,
    /// Absent when the engine failed or its output was unreadable.
    pub report: Option<SvrlReport>,
}

/// Validate a property document against a schema.
///
/// Engine and report failures never escape: they turn into a `Fail`
/// verdict carrying one synthetic assertion.
///
/// # Arguments
/// * `engine` - Schema engine that produces the SVRL report
/// * `schema_source` - Schematron schema text
/// * `doc` - Property document to check
/// * `verbose` - Keep the full SVRL trace instead of failed assertions only
///
/// # Returns
/// The verdict plus the retained report, when one could be read
pub fn validate(
    engine: &dyn SchemaEngine,
    schema_source: &str,
    doc: &PropertyDocument,
    verbose: bool,
) -> ValidationOutcome {
    let data_xml = match doc.to_xml() {
        Ok(xml) => xml,
        Err(e) => {
            warn!("Could not serialize properties of {}: {}", doc.file_path, e);
            return ValidationOutcome {
                verdict: ValidationVerdict::failed(
                    ENGINE_FAILURE_ID,
                    format!("Schematron validation resulted in an error: {}", e),
                ),
                report: None,
            };
        }
    };

    let svrl = match engine.validate(schema_source, &data_xml) {
        Ok(svrl) => svrl,
        Err(e) => {
            warn!("Schematron engine failed on {}: {}", doc.file_path, e);
            return ValidationOutcome {
                verdict: ValidationVerdict::failed(
                    ENGINE_FAILURE_ID,
                    format!("Schematron validation resulted in an error: {}", e),
                ),
                report: None,
            };
        }
    };

    match interpret(&svrl, verbose) {
        Ok(interpretation) => {
            debug!(
                "{}: {} failed assertions",
                doc.file_path,
                interpretation.verdict.failed_assertions.len()
            );
            ValidationOutcome {
                verdict: interpretation.verdict,
                report: Some(interpretation.report),
            }
        }
        Err(e) => {
            warn!("Unreadable SVRL for {}: {}", doc.file_path, e);
            ValidationOutcome {
                verdict: ValidationVerdict::failed(
                    REPORT_FAILURE_ID,
                    format!("Error processing Schematron output: {}", e),
                ),
                report: None,
            }
        }
    }
}
