//! Reading caption annotations and resolving them to image files.
//!
//! Each annotation row has the shape `asset_filename | comment_index | caption`.
//! The comment index is informational only. One image usually has several rows,
//! one per caption.

use crate::error::{IndexError, Result};
use std::path::{Path, PathBuf};

/// One well-formed annotation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    /// 1-based line number in the source
    pub line: usize,
    pub asset_filename: String,
    pub comment_index: String,
    pub caption: String,
}

/// A row that could not be split into a filename and a caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    pub line: usize,
    pub reason: &'static str,
}

/// Split one line into its three fields.
///
/// The line is split at most twice, so a caption containing the delimiter is
/// kept whole. Fields are trimmed.
pub fn parse_row(
    line_number: usize,
    line: &str,
    delimiter: char,
) -> std::result::Result<AnnotationRow, MalformedRow> {
    let malformed = |reason| MalformedRow {
        line: line_number,
        reason,
    };

    let mut fields = line.splitn(3, delimiter).map(str::trim);
    let asset_filename = fields.next().unwrap_or_default();
    let comment_index = fields.next().ok_or_else(|| malformed("missing comment index"))?;
    let caption = fields.next().ok_or_else(|| malformed("missing caption"))?;

    if asset_filename.is_empty() {
        return Err(malformed("empty filename"));
    }
    if caption.is_empty() {
        return Err(malformed("empty caption"));
    }

    Ok(AnnotationRow {
        line: line_number,
        asset_filename: asset_filename.to_string(),
        comment_index: comment_index.to_string(),
        caption: caption.to_string(),
    })
}

/// Parse annotation text. Blank lines are ignored.
pub fn parse_annotations(
    content: &str,
    delimiter: char,
) -> Vec<std::result::Result<AnnotationRow, MalformedRow>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_row(i + 1, line, delimiter))
        .collect()
}

/// Read and parse the annotation file at `path`.
pub fn read_annotations(
    path: &Path,
    delimiter: char,
) -> Result<Vec<std::result::Result<AnnotationRow, MalformedRow>>> {
    let content = std::fs::read_to_string(path).map_err(|source| IndexError::Annotations {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_annotations(&content, delimiter))
}

/// Locate the image file for `filename` under `asset_root`.
///
/// If `filename` does not name an existing file and does not already carry
/// `default_extension`, the extension is appended and tried once more.
pub fn resolve_asset(asset_root: &Path, filename: &str, default_extension: &str) -> Option<PathBuf> {
    let direct = asset_root.join(filename);
    if direct.is_file() {
        return Some(direct);
    }

    let extension = default_extension.trim_start_matches('.');
    if extension.is_empty() {
        return None;
    }
    let has_extension = Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
    if has_extension {
        return None;
    }

    let with_extension = asset_root.join(format!("{filename}.{extension}"));
    with_extension.is_file().then_some(with_extension)
}
