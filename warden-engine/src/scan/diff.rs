//! Unified-diff parsing.
//!
//! The scanner only cares about lines the push *adds*, attributed to the
//! new-file path with 1-based new-file line numbers. Everything else in the
//! diff (context, removals, mode changes, binary notices) is skipped.

/// One added line with its position in the new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedLine {
    pub file: String,
    /// 1-based line number in the new version of the file.
    pub line_number: u64,
    pub content: String,
}

/// Extract all added lines from a unified diff.
///
/// Tolerant of anything that is not a recognised marker; a diff with no
/// hunks (binary files, renames only) simply yields nothing.
pub fn added_lines(diff: &str) -> Vec<AddedLine> {
    let mut out = Vec::new();
    let mut file: Option<String> = None;
    let mut new_line: u64 = 0;
    let mut in_hunk = false;

    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            file = None;
            in_hunk = false;
        } else if let Some(path) = line.strip_prefix("+++ ") {
            file = new_file_path(path);
            in_hunk = false;
        } else if let Some(header) = line.strip_prefix("@@ ") {
            new_line = hunk_new_start(header).unwrap_or(0);
            in_hunk = new_line > 0;
        } else if in_hunk {
            if let Some(content) = line.strip_prefix('+') {
                if let Some(file) = &file {
                    out.push(AddedLine {
                        file: file.clone(),
                        line_number: new_line,
                        content: content.to_owned(),
                    });
                }
                new_line += 1;
            } else if line.starts_with(' ') || line.is_empty() {
                new_line += 1;
            }
            // '-' and '\ No newline at end of file' do not advance the
            // new-file counter.
        }
    }

    out
}

/// `+++ b/src/main.rs` -> `src/main.rs`; `+++ /dev/null` -> none.
fn new_file_path(path: &str) -> Option<String> {
    if path == "/dev/null" {
        return None;
    }
    let path = path.strip_prefix("b/").unwrap_or(path);
    Some(path.to_owned())
}

/// `-12,3 +40,7 @@ fn context()` -> `40`.
fn hunk_new_start(header: &str) -> Option<u64> {
    let plus = header.split_whitespace().find(|part| part.starts_with('+'))?;
    let range = &plus[1..];
    let start = range.split(',').next()?;
    start.parse().ok()
}
