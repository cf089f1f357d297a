//! Helpers for sanitizing data before it enters logs, spans, or file names.
//!
//! Submitted file names come from clients and may carry directories; these
//! helpers keep only what is safe to show or write.

use std::path::Path;

/// Returns only the file name component of a path (no directory).
///
/// Safe for span fields. Reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Name of the downloadable text artifact for a job: `<stem>.txt`.
///
/// Directory parts are dropped and characters that are unsafe in file
/// names on common platforms are replaced with `_`.
pub fn result_file_name(file_name: &str) -> String {
    // Client names may use either separator.
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .trim();

    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "result.txt".to_string()
    } else {
        format!("{}.txt", cleaned)
    }
}
