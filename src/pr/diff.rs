use super::types::DiffFile;
use super::PrError;

/// Totals across every file of a parsed diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffStats {
    pub files: Vec<DiffFile>,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffStats {
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Parse unified diff text (as produced by `git diff` or GitHub's diff media
/// type) into per-file line counts.
///
/// Only lines inside a hunk are counted, so the `---`/`+++` file headers never
/// inflate the totals.
pub fn parse_diff(raw_diff: &str) -> Result<DiffStats, PrError> {
    let mut files = Vec::new();
    let mut current: Option<DiffFile> = None;
    let mut in_hunk = false;

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take());
            in_hunk = false;
            current = Some(DiffFile {
                path: header_path(rest)?,
                is_new: false,
                is_deleted: false,
                additions: 0,
                deletions: 0,
            });
            continue;
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if !in_hunk {
            if let Some(path) = line.strip_prefix("--- ") {
                file.is_new |= path.trim() == "/dev/null";
            } else if let Some(path) = line.strip_prefix("+++ ") {
                file.is_deleted |= path.trim() == "/dev/null";
            }
        }

        if line.starts_with("@@") {
            in_hunk = true;
        } else if in_hunk {
            if line.starts_with('+') {
                file.additions += 1;
            } else if line.starts_with('-') {
                file.deletions += 1;
            }
        }
    }
    files.extend(current);

    let additions = files.iter().map(|f| f.additions).sum();
    let deletions = files.iter().map(|f| f.deletions).sum();
    Ok(DiffStats {
        files,
        additions,
        deletions,
    })
}

/// Extract the post-image path from the `a/<path> b/<path>` part of a
/// `diff --git` header.
fn header_path(rest: &str) -> Result<String, PrError> {
    let mut parts = rest.split_whitespace();
    let a_path = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing a/ path in diff header".to_string()))?;
    let b_path = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing b/ path in diff header".to_string()))?;
    Ok(b_path
        .strip_prefix("b/")
        .or_else(|| a_path.strip_prefix("a/"))
        .unwrap_or(b_path)
        .to_string())
}
