//! Wrappers for the poppler command-line tools
//!
//! Both tools are optional. Their text output is parsed into key/value lists
//! that end up under `<pdfinfo>` and `<pdfimages>` in the property document.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ToolError;

/// Locations of the external executables, if configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalTools {
    pub pdfinfo: Option<PathBuf>,
    pub pdfimages: Option<PathBuf>,
}

impl ExternalTools {
    /// Configured executables that cannot be found.
    pub fn missing(&self) -> Vec<PathBuf> {
        [&self.pdfinfo, &self.pdfimages]
            .into_iter()
            .flatten()
            .filter(|tool| !is_executable_available(tool))
            .cloned()
            .collect()
    }
}

fn is_executable_available(tool: &Path) -> bool {
    if tool.components().count() > 1 {
        return tool.is_file();
    }
    // Bare command names are looked up on PATH
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file()))
        .unwrap_or(false)
}

fn run(tool: &Path, args: &[&str], pdf: &Path) -> Result<String, ToolError> {
    let output = Command::new(tool)
        .args(args)
        .arg(pdf)
        .output()
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::ExitStatus {
            tool: tool.to_path_buf(),
            status: output.status.code().unwrap_or(-1),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run `pdfinfo <pdf>`.
pub fn pdfinfo(tool: &Path, pdf: &Path) -> Result<Vec<(String, String)>, ToolError> {
    Ok(parse_pdfinfo(&run(tool, &[], pdf)?))
}

/// Run `pdfimages -list <pdf>`.
pub fn pdfimages_list(tool: &Path, pdf: &Path) -> Result<Vec<Vec<(String, String)>>, ToolError> {
    let stdout = run(tool, &["-list"], pdf)?;
    parse_pdfimages_list(&stdout).ok_or_else(|| ToolError::Output {
        tool: tool.to_path_buf(),
    })
}

/// Parse `Key:   value` lines. Keys get spaces replaced by underscores.
pub fn parse_pdfinfo(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().replace(' ', "_"), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Parse the table printed by `pdfimages -list`.
///
/// The first line holds the column names, the second only dashes.
pub fn parse_pdfimages_list(stdout: &str) -> Option<Vec<Vec<(String, String)>>> {
    let mut lines = stdout.lines();
    let headers: Vec<&str> = lines.next()?.split_whitespace().collect();
    if headers.is_empty() {
        return None;
    }
    lines.next()?;

    let rows = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            headers
                .iter()
                .zip(line.split_whitespace())
                .map(|(header, value)| (header.to_string(), value.to_string()))
                .collect()
        })
        .collect();
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pdfinfo() {
        let stdout = "Producer:       GPL Ghostscript 9.50\nCreationDate:   Thu Mar  7 12:01:02 2024 CET\nPage size:      595 x 842 pts (A4)\n";
        let parsed = parse_pdfinfo(stdout);
        assert_eq!(parsed[0], ("Producer".to_string(), "GPL Ghostscript 9.50".to_string()));
        assert_eq!(parsed[1].1, "Thu Mar  7 12:01:02 2024 CET");
        assert_eq!(parsed[2].0, "Page_size");
    }

    #[test]
    fn test_parse_pdfimages_list() {
        let stdout = "\
page   num  type   width height color comp bpc  enc interp  object ID x-ppi y-ppi size ratio
--------------------------------------------------------------------------------------------
   1     0 image    2480  3508  rgb     3   8  jpeg   no         9  0   300   300  612K 2.4%
";
        let rows = parse_pdfimages_list(stdout).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], ("page".to_string(), "1".to_string()));
        assert_eq!(rows[0][8], ("enc".to_string(), "jpeg".to_string()));
        assert_eq!(rows[0][11], ("ID".to_string(), "0".to_string()));
    }

    #[test]
    fn test_parse_pdfimages_empty_output() {
        assert!(parse_pdfimages_list("").is_none());
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let tools = ExternalTools {
            pdfinfo: Some(PathBuf::from("/nonexistent/bin/pdfinfo")),
            pdfimages: None,
        };
        assert_eq!(tools.missing(), vec![PathBuf::from("/nonexistent/bin/pdfinfo")]);
    }
}
