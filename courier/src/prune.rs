//! Housekeeping for the chat list: dropping duplicates and names that a
//! previous run already handled or could not find.
//!
//! The pure functions work on file contents; the `*_file` wrappers write a
//! sibling output file and only replace the input when asked to.

use crate::journal::processed_name;
use crate::targets::line_name;
use crate::AutomationError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Counts from one pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneReport {
    /// Lines in the input, blank ones included.
    pub original: usize,
    pub kept: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pruned {
    pub content: String,
    pub report: PruneReport,
}

/// Which log a list is pruned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    NotFound,
    Processed,
}

impl LogKind {
    pub fn names(&self, log: &str) -> HashSet<String> {
        match self {
            LogKind::NotFound => names_from_not_found_log(log),
            LogKind::Processed => names_from_processed_log(log),
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Keep the first occurrence of every line, in order. Blank lines are
/// dropped without counting as duplicates.
pub fn dedupe(content: &str) -> Pruned {
    let mut seen = HashSet::new();
    let mut out = String::new();
    let mut report = PruneReport::default();
    for line in content.lines() {
        report.original += 1;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            push_line(&mut out, line);
            report.kept += 1;
        } else {
            report.removed += 1;
        }
    }
    Pruned {
        content: out,
        report,
    }
}

/// Names in a not-found log: every non-blank line that is not a `[...]`
/// timestamp header.
pub fn names_from_not_found_log(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('['))
        .map(str::to_string)
        .collect()
}

/// Names in a processed log, whatever their status.
pub fn names_from_processed_log(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(processed_name)
        .map(str::to_string)
        .collect()
}

/// Drop every line whose trimmed text, or the name after `Row N:`, is in
/// `names`. Other lines are kept as they are.
pub fn remove_names(content: &str, names: &HashSet<String>) -> Pruned {
    let mut out = String::new();
    let mut report = PruneReport::default();
    for line in content.lines() {
        report.original += 1;
        if names.contains(line.trim()) || names.contains(line_name(line)) {
            report.removed += 1;
        } else {
            push_line(&mut out, line);
            report.kept += 1;
        }
    }
    Pruned {
        content: out,
        report,
    }
}

/// `dir/stem{suffix}.ext` next to `input`.
pub fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    input.with_file_name(name)
}

/// Where results go: the input itself, an explicit path, or a sibling.
fn output_path(input: &Path, output: Option<&Path>, in_place: bool, suffix: &str) -> PathBuf {
    if in_place {
        input.to_path_buf()
    } else {
        output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_path(input, suffix))
    }
}

fn read(path: &Path) -> Result<String, AutomationError> {
    fs::read_to_string(path).map_err(|e| {
        AutomationError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
    })
}

/// Deduplicate a list file. Returns where the result was written.
pub fn dedupe_file(
    input: &Path,
    output: Option<&Path>,
    in_place: bool,
) -> Result<(PathBuf, PruneReport), AutomationError> {
    let pruned = dedupe(&read(input)?);
    let target = output_path(input, output, in_place, "_no_duplicates");
    fs::write(&target, &pruned.content)?;
    info!(
        "Deduplicated {}: {} kept, {} removed -> {}",
        input.display(),
        pruned.report.kept,
        pruned.report.removed,
        target.display()
    );
    Ok((target, pruned.report))
}

/// Remove the names found in `log` from a list file.
pub fn prune_file(
    input: &Path,
    log: &Path,
    kind: LogKind,
    output: Option<&Path>,
    in_place: bool,
) -> Result<(PathBuf, PruneReport), AutomationError> {
    let names = kind.names(&read(log)?);
    info!("Found {} unique names in {}", names.len(), log.display());
    let pruned = remove_names(&read(input)?, &names);
    let target = output_path(input, output, in_place, "_cleaned");
    fs::write(&target, &pruned.content)?;
    info!(
        "Pruned {}: {} kept, {} removed -> {}",
        input.display(),
        pruned.report.kept,
        pruned.report.removed,
        target.display()
    );
    Ok((target, pruned.report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence_in_order() {
        let pruned = dedupe("Alpha\nBeta\n\nAlpha\n Beta \nGamma\n");
        assert_eq!(pruned.content, "Alpha\nBeta\nGamma\n");
        assert_eq!(
            pruned.report,
            PruneReport {
                original: 6,
                kept: 3,
                removed: 2
            }
        );
    }

    #[test]
    fn not_found_log_skips_headers_and_blanks() {
        let names = names_from_not_found_log("[2025-03-09 21:05:00 GMT+7]\nAlpha\n\n Beta \n");
        assert_eq!(names.len(), 2);
        assert!(names.contains("Alpha"));
        assert!(names.contains("Beta"));
    }

    #[test]
    fn processed_log_names_cover_every_status() {
        let names = names_from_processed_log("Row98: Alpha\nNOT_FOUND Row86: Beta\nFAILED Row186: Gamma\n");
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn removal_matches_bare_and_row_lines() {
        let names: HashSet<String> = ["Alpha".to_string(), "Gamma".to_string()].into();
        let pruned = remove_names("Alpha\n- Row 4: Gamma\nBeta\n", &names);
        assert_eq!(pruned.content, "Beta\n");
        assert_eq!(pruned.report.removed, 2);
    }

    #[test]
    fn file_wrappers_leave_the_input_alone_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("chat_name.txt");
        let log = dir.path().join("processed_chats_2025-03-09.txt");
        fs::write(&list, "Alpha\nBeta\nAlpha\n").unwrap();
        fs::write(&log, "Row1: Beta\n").unwrap();

        let (deduped, report) = dedupe_file(&list, None, false).unwrap();
        assert_eq!(deduped, dir.path().join("chat_name_no_duplicates.txt"));
        assert_eq!(report.removed, 1);
        assert_eq!(fs::read_to_string(&list).unwrap(), "Alpha\nBeta\nAlpha\n");

        let (cleaned, _) = prune_file(&list, &log, LogKind::Processed, None, false).unwrap();
        assert_eq!(cleaned, dir.path().join("chat_name_cleaned.txt"));
        assert_eq!(fs::read_to_string(&cleaned).unwrap(), "Alpha\nAlpha\n");

        prune_file(&list, &log, LogKind::Processed, None, true).unwrap();
        assert_eq!(fs::read_to_string(&list).unwrap(), "Alpha\nAlpha\n");
    }
}
