//! Report writing functionality
//!
//! Three outputs are written while the batch runs: the combined XML report,
//! the status CSV and a plain-text log of failed files. Every file is flushed
//! to disk as soon as it has been appended.

use anyhow::{Context, Result};
use quick_xml::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::xml::{self, text_element};
use crate::batch::FileOutcome;
use crate::core::validator::Status;

const XML_HEAD: &str = "<?xml version='1.0' encoding='UTF-8'?>\n<pdfbatchqa>\n";
const XML_FOOT: &str = "</pdfbatchqa>\n";
const STATUS_HEADER: [&str; 3] = ["file", "status", "pages"];

/// Output file names derived from the output prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub report: PathBuf,
    pub status: PathBuf,
    pub failed: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &str) -> Self {
        OutputPaths {
            report: PathBuf::from(format!("{}.xml", prefix)),
            status: PathBuf::from(format!("{}_status.csv", prefix)),
            failed: PathBuf::from(format!("{}_failed.txt", prefix)),
        }
    }
}

/// One line of the status CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub file: String,
    pub status: &'static str,
    pub pages: Option<usize>,
}

impl From<&FileOutcome> for SummaryRow {
    fn from(outcome: &FileOutcome) -> Self {
        SummaryRow {
            file: outcome.path.display().to_string(),
            status: outcome.status.as_str(),
            pages: outcome.page_count(),
        }
    }
}

/// Owner of all output streams of a run.
pub struct ReportWriter {
    xml: Writer<BufWriter<File>>,
    status: csv::Writer<File>,
    failed: BufWriter<File>,
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Cannot write {}", path.display()))
}

impl ReportWriter {
    /// Create (or truncate) the output files and write their headers.
    pub fn create(paths: &OutputPaths) -> Result<Self> {
        let mut xml = Writer::new(BufWriter::new(create_file(&paths.report)?));
        xml.get_mut().write_all(XML_HEAD.as_bytes())?;
        xml.get_mut().flush()?;

        let mut status = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(create_file(&paths.status)?);
        status.write_record(STATUS_HEADER)?;
        status.flush()?;

        let failed = BufWriter::new(create_file(&paths.failed)?);

        Ok(ReportWriter { xml, status, failed })
    }

    /// Append one processed file to all outputs.
    pub fn append_outcome(&mut self, outcome: &FileOutcome) -> Result<()> {
        self.write_file_element(outcome)?;
        self.xml.get_mut().write_all(b"\n")?;
        self.xml.get_mut().flush()?;

        self.status.serialize(SummaryRow::from(outcome))?;
        self.status.flush()?;

        if outcome.status == Status::Fail {
            writeln!(self.failed, "{}", outcome.path.display())?;
            writeln!(self.failed, "*** Schema validation errors:")?;
            for description in outcome.descriptions() {
                writeln!(self.failed, "{}", description)?;
            }
            writeln!(self.failed, "####")?;
            self.failed.flush()?;
        }

        Ok(())
    }

    fn write_file_element(&mut self, outcome: &FileOutcome) -> Result<()> {
        let writer = &mut self.xml;
        xml::start(writer, "file")?;
        text_element(writer, "filePath", &outcome.path.display().to_string())?;

        if let Some(properties) = &outcome.properties {
            properties.write_xml(writer)?;
        }

        text_element(writer, "status", outcome.status.as_str())?;

        if let Some(report) = &outcome.report {
            xml::start(writer, "schematronReport")?;
            report.write_xml(writer)?;
            xml::end(writer, "schematronReport")?;
        }

        if !outcome.diagnostics.is_empty() {
            xml::start(writer, "diagnostics")?;
            for description in &outcome.diagnostics {
                text_element(writer, "description", description)?;
            }
            xml::end(writer, "diagnostics")?;
        }

        xml::end(writer, "file")?;
        Ok(())
    }

    /// Close the XML root element and flush everything.
    pub fn finish(mut self) -> Result<()> {
        self.xml.get_mut().write_all(XML_FOOT.as_bytes())?;
        self.xml.get_mut().flush()?;
        self.status.flush()?;
        self.failed.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Stage;
    use crate::core::validator::FailedAssertion;
    use std::fs;
    use tempfile::TempDir;

    fn outcome(path: &str, status: Status) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from(path),
            stages: vec![Stage::Discovered, Stage::SchemaUnmatched],
            status,
            properties: None,
            report: None,
            failed_assertions: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn paths(dir: &TempDir) -> OutputPaths {
        OutputPaths::from_prefix(&dir.path().join("batch").display().to_string())
    }

    #[test]
    fn test_output_names() {
        let paths = OutputPaths::from_prefix("out/run1");
        assert_eq!(paths.report, PathBuf::from("out/run1.xml"));
        assert_eq!(paths.status, PathBuf::from("out/run1_status.csv"));
        assert_eq!(paths.failed, PathBuf::from("out/run1_failed.txt"));
    }

    #[test]
    fn test_write_outputs() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);

        let mut failing = outcome("/batch/b.pdf", Status::Fail);
        failing.diagnostics.push("Image 7 on page 1 could not be decoded: bad marker".to_string());
        failing.failed_assertions.push(FailedAssertion {
            test_id: "JPEGQuality = 85".to_string(),
            description: "wrong quality".to_string(),
        });

        let mut writer = ReportWriter::create(&paths).unwrap();
        writer.append_outcome(&outcome("/batch/a.pdf", Status::Pass)).unwrap();
        writer.append_outcome(&failing).unwrap();
        writer.finish().unwrap();

        let xml = fs::read_to_string(&paths.report).unwrap();
        assert!(xml.starts_with("<?xml version='1.0' encoding='UTF-8'?>\n<pdfbatchqa>\n"));
        assert!(xml.ends_with("</pdfbatchqa>\n"));
        assert!(sxd_document::parser::parse(&xml).is_ok());
        assert_eq!(xml.matches("<file>").count(), 2);
        assert!(xml.contains("<status>fail</status>"));

        let csv = fs::read_to_string(&paths.status).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines, vec!["file,status,pages", "/batch/a.pdf,pass,", "/batch/b.pdf,fail,"]);

        let failed = fs::read_to_string(&paths.failed).unwrap();
        assert_eq!(
            failed,
            "/batch/b.pdf\n*** Schema validation errors:\n\
             Image 7 on page 1 could not be decoded: bad marker\n\
             Test \"JPEGQuality = 85\" failed (wrong quality)\n####\n"
        );
    }

    #[test]
    fn test_empty_run_is_well_formed() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        ReportWriter::create(&paths).unwrap().finish().unwrap();

        let xml = fs::read_to_string(&paths.report).unwrap();
        assert!(sxd_document::parser::parse(&xml).is_ok());
        assert_eq!(fs::read_to_string(&paths.status).unwrap(), "file,status,pages\n");
        assert_eq!(fs::read_to_string(&paths.failed).unwrap(), "");
    }
}
