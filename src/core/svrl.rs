//! SVRL (Schematron Validation Report Language) reports

use anyhow::Result;
use quick_xml::Writer;
use std::io::Write;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

use crate::error::ReportParseError;
use crate::reporting::xml::{self, empty_with_attributes, start_with_attributes};

pub const SVRL_NS: &str = "http://purl.oclc.org/dsdl/svrl";

/// A failed assertion or a fired report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub test: String,
    pub location: String,
    pub id: Option<String>,
    pub role: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SvrlEntry {
    ActivePattern { id: Option<String>, name: Option<String> },
    FiredRule { context: String },
    FailedAssert(Finding),
    SuccessfulReport(Finding),
}

/// Report entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SvrlReport {
    pub title: Option<String>,
    pub entries: Vec<SvrlEntry>,
}

impl SvrlReport {
    pub fn failed_asserts(&self) -> impl Iterator<Item = &Finding> {
        self.entries.iter().filter_map(|entry| match entry {
            SvrlEntry::FailedAssert(finding) => Some(finding),
            _ => None,
        })
    }

    /// Copy of the report without pattern and rule trace entries and reports.
    pub fn failures_only(&self) -> SvrlReport {
        SvrlReport {
            title: self.title.clone(),
            entries: self
                .entries
                .iter()
                .filter(|entry| matches!(entry, SvrlEntry::FailedAssert(_)))
                .cloned()
                .collect(),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_xml(&mut writer)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Write the `<svrl:schematron-output>` element.
    pub fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut root_attributes = vec![("xmlns:svrl", SVRL_NS)];
        if let Some(title) = &self.title {
            root_attributes.push(("title", title.as_str()));
        }
        start_with_attributes(writer, "svrl:schematron-output", &root_attributes)?;

        for entry in &self.entries {
            match entry {
                SvrlEntry::ActivePattern { id, name } => {
                    let mut attributes = Vec::new();
                    if let Some(id) = id {
                        attributes.push(("id", id.as_str()));
                    }
                    if let Some(name) = name {
                        attributes.push(("name", name.as_str()));
                    }
                    empty_with_attributes(writer, "svrl:active-pattern", &attributes)?;
                }
                SvrlEntry::FiredRule { context } => {
                    empty_with_attributes(writer, "svrl:fired-rule", &[("context", context.as_str())])?;
                }
                SvrlEntry::FailedAssert(finding) => write_finding(writer, "svrl:failed-assert", finding)?,
                SvrlEntry::SuccessfulReport(finding) => write_finding(writer, "svrl:successful-report", finding)?,
            }
        }

        xml::end(writer, "svrl:schematron-output")?;
        Ok(())
    }

    /// Read an SVRL document.
    pub fn parse(text: &str) -> Result<SvrlReport, ReportParseError> {
        let package = parser::parse(text).map_err(|e| ReportParseError(format!("{:?}", e)))?;
        let document = package.as_document();

        let root = document
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(element) => Some(element),
                _ => None,
            })
            .ok_or_else(|| ReportParseError("empty document".to_string()))?;

        if root.name().local_part() != "schematron-output" || root.name().namespace_uri() != Some(SVRL_NS) {
            return Err(ReportParseError(format!(
                "unexpected root element '{}'",
                root.name().local_part()
            )));
        }

        let mut report = SvrlReport {
            title: root.attribute_value("title").map(str::to_string),
            entries: Vec::new(),
        };

        for element in child_elements(root) {
            if element.name().namespace_uri() != Some(SVRL_NS) {
                continue;
            }
            let entry = match element.name().local_part() {
                "active-pattern" => SvrlEntry::ActivePattern {
                    id: element.attribute_value("id").map(str::to_string),
                    name: element.attribute_value("name").map(str::to_string),
                },
                "fired-rule" => SvrlEntry::FiredRule {
                    context: element.attribute_value("context").unwrap_or_default().to_string(),
                },
                "failed-assert" => SvrlEntry::FailedAssert(read_finding(element)?),
                "successful-report" => SvrlEntry::SuccessfulReport(read_finding(element)?),
                _ => continue,
            };
            report.entries.push(entry);
        }

        Ok(report)
    }
}

fn write_finding<W: Write>(writer: &mut Writer<W>, name: &str, finding: &Finding) -> Result<()> {
    let mut attributes = vec![("test", finding.test.as_str())];
    if let Some(id) = &finding.id {
        attributes.push(("id", id.as_str()));
    }
    if let Some(role) = &finding.role {
        attributes.push(("role", role.as_str()));
    }
    attributes.push(("location", finding.location.as_str()));
    start_with_attributes(writer, name, &attributes)?;
    xml::text_element(writer, "svrl:text", &finding.text)?;
    xml::end(writer, name)?;
    Ok(())
}

fn child_elements(element: Element) -> Vec<Element> {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// Concatenated text content, whitespace normalized.
pub fn normalized_text(element: Element) -> String {
    fn collect(element: Element, out: &mut String) {
        for child in element.children() {
            match child {
                ChildOfElement::Text(text) => out.push_str(text.text()),
                ChildOfElement::Element(e) => collect(e, out),
                _ => {}
            }
        }
    }
    let mut raw = String::new();
    collect(element, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read_finding(element: Element) -> Result<Finding, ReportParseError> {
    let test = element
        .attribute_value("test")
        .ok_or_else(|| ReportParseError(format!("{} without test attribute", element.name().local_part())))?;

    let text = child_elements(element)
        .into_iter()
        .filter(|e| e.name().local_part() == "text")
        .map(normalized_text)
        .collect::<Vec<_>>()
        .join(" ");

    Ok(Finding {
        test: test.to_string(),
        location: element.attribute_value("location").unwrap_or_default().to_string(),
        id: element.attribute_value("id").map(str::to_string),
        role: element.attribute_value("role").map(str::to_string),
        text,
    })
}
