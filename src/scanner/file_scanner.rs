//! PDF file scanning and collection

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Collect all files below `dir` whose extension equals `extension`,
/// ignoring case.
///
/// The walk is always recursive and files are returned in traversal order,
/// which is the order they are processed and reported in. Subdirectories
/// that cannot be read are skipped with a warning.
///
/// # Arguments
/// * `dir` - Batch root to scan
/// * `extension` - File extension to match, without the dot
///
/// # Returns
/// Vector of matching file paths, or an error when `dir` itself cannot be read
pub fn collect_pdf_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut pdf_files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                warn!("Skipping unreadable entry below {}: {}", dir.display(), e);
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to scan {}", dir.display())),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = entry.path().extension() {
            if ext.to_string_lossy().eq_ignore_ascii_case(extension) {
                pdf_files.push(entry.path().to_path_buf());
            }
        }
    }

    Ok(pdf_files)
}
