//! The list of chats to message and which part of it to work through.

use crate::AutomationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// One chat from the list, with the row number it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub row: usize,
    pub name: String,
}

impl fmt::Display for ChatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Row {})", self.name, self.row)
    }
}

fn row_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\s*Row\s*(\d+)\s*:\s*(.*)$").expect("static regex"))
}

/// Parse the chat list.
///
/// Blank lines and `#` comments are skipped. `- Row N: name` keeps `N` as
/// the row; any other line is a bare name numbered by its line. Entries
/// whose name ends up empty are dropped.
pub fn parse_chat_list(content: &str) -> Vec<ChatEntry> {
    let mut entries = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (row, name) = match row_line().captures(line) {
            Some(caps) => {
                let row = caps[1].parse().unwrap_or(index + 1);
                (row, caps[2].trim().to_string())
            }
            None => (index + 1, line.to_string()),
        };
        if name.is_empty() {
            debug!("Line {} has no chat name, skipping", index + 1);
            continue;
        }
        entries.push(ChatEntry { row, name });
    }
    entries
}

/// Chat name on a single list line: the part after `Row N:` when present,
/// else the trimmed line.
pub fn line_name(line: &str) -> &str {
    let line = line.trim();
    match row_line().captures(line).and_then(|caps| caps.get(2)) {
        Some(name) => name.as_str().trim(),
        None => line,
    }
}

pub fn load_chat_list(path: &Path) -> Result<Vec<ChatEntry>, AutomationError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AutomationError::InvalidArgument(format!("cannot read chat list {}: {e}", path.display()))
    })?;
    Ok(parse_chat_list(&content))
}

/// Strip the configured prefix (once, at the start) and surrounding spaces.
pub fn clean_chat_name(name: &str, prefix: &str) -> String {
    let trimmed = name.trim();
    if !prefix.is_empty() {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// True for names that are phone numbers once the prefix, `+`, spaces and
/// dashes are gone.
pub fn is_phone(name: &str, prefix: &str) -> bool {
    let digits: String = clean_chat_name(name, prefix)
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatListSummary {
    pub total: usize,
    pub phones: usize,
    pub groups: usize,
}

pub fn summarize(entries: &[ChatEntry], prefix: &str) -> ChatListSummary {
    let phones = entries.iter().filter(|e| is_phone(&e.name, prefix)).count();
    ChatListSummary {
        total: entries.len(),
        phones,
        groups: entries.len() - phones,
    }
}

impl fmt::Display for ChatListSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries ({} phones + {} groups)",
            self.total, self.phones, self.groups
        )
    }
}

/// Which entries to process. Positions are 1-based indexes into the parsed
/// list, not the `Row N` numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    StartFrom(usize),
    /// Inclusive on both ends.
    Range(usize, usize),
    FirstN(usize),
}

impl Selection {
    /// Build from the optional `--start/--end/--first` flags.
    pub fn from_bounds(
        start: Option<usize>,
        end: Option<usize>,
        first: Option<usize>,
    ) -> Result<Self, AutomationError> {
        match (start, end, first) {
            (None, None, None) => Ok(Selection::All),
            (None, None, Some(n)) => Ok(Selection::FirstN(n)),
            (Some(a), None, None) => Ok(Selection::StartFrom(a)),
            (start, Some(b), None) => Ok(Selection::Range(start.unwrap_or(1), b)),
            (_, _, Some(_)) => Err(AutomationError::InvalidArgument(
                "--first cannot be combined with --start or --end".to_string(),
            )),
        }
    }

    /// Check the bounds against a list of `total` entries.
    pub fn validate(&self, total: usize) -> Result<(), AutomationError> {
        let in_range = |n: usize| (1..=total).contains(&n);
        let ok = match *self {
            Selection::All => true,
            Selection::StartFrom(a) => in_range(a),
            Selection::Range(a, b) => in_range(a) && (a..=total).contains(&b),
            Selection::FirstN(n) => in_range(n),
        };
        if ok {
            Ok(())
        } else {
            Err(AutomationError::InvalidArgument(format!(
                "{self} is outside the list (1-{total})"
            )))
        }
    }

    pub fn apply<'a>(&self, entries: &'a [ChatEntry]) -> Result<&'a [ChatEntry], AutomationError> {
        self.validate(entries.len())?;
        Ok(match *self {
            Selection::All => entries,
            Selection::StartFrom(a) => &entries[a - 1..],
            Selection::Range(a, b) => &entries[a - 1..b],
            Selection::FirstN(n) => &entries[..n],
        })
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => write!(f, "all entries"),
            Selection::StartFrom(a) => write!(f, "entries from {a}"),
            Selection::Range(a, b) => write!(f, "entries {a} to {b}"),
            Selection::FirstN(n) => write!(f, "first {n} entries"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "NepalWin🇳🇵";

    #[test]
    fn parses_row_lines_and_bare_names() {
        let list = "# targets\n  - Row 982: NepalWin🇳🇵Shankartr88\n\nFamily Group\n- Row 7:\n";
        let entries = parse_chat_list(list);
        assert_eq!(
            entries,
            vec![
                ChatEntry {
                    row: 982,
                    name: "NepalWin🇳🇵Shankartr88".into()
                },
                ChatEntry {
                    row: 4,
                    name: "Family Group".into()
                },
            ]
        );
    }

    #[test]
    fn cleaning_strips_the_prefix_once() {
        assert_eq!(clean_chat_name("NepalWin🇳🇵 Shankartr88 ", PREFIX), "Shankartr88");
        assert_eq!(clean_chat_name("Shankartr88", PREFIX), "Shankartr88");
        assert_eq!(clean_chat_name(" Team ", ""), "Team");
    }

    #[test]
    fn phones_and_groups_are_counted() {
        let entries = parse_chat_list("+977 980-123-4567\nNepalWin🇳🇵9801234567\nFamily\n");
        let summary = summarize(&entries, PREFIX);
        assert_eq!(
            summary,
            ChatListSummary {
                total: 3,
                phones: 2,
                groups: 1
            }
        );
    }

    #[test]
    fn selection_slices_by_position() {
        let entries = parse_chat_list("a\nb\nc\nd\n");
        let names = |s: Selection| -> Vec<String> {
            s.apply(&entries).unwrap().iter().map(|e| e.name.clone()).collect()
        };
        assert_eq!(names(Selection::All).len(), 4);
        assert_eq!(names(Selection::StartFrom(3)), vec!["c", "d"]);
        assert_eq!(names(Selection::Range(2, 3)), vec!["b", "c"]);
        assert_eq!(names(Selection::FirstN(1)), vec!["a"]);
    }

    #[test]
    fn out_of_range_selection_is_rejected() {
        assert!(Selection::StartFrom(0).validate(4).is_err());
        assert!(Selection::StartFrom(5).validate(4).is_err());
        assert!(Selection::Range(3, 2).validate(4).is_err());
        assert!(Selection::Range(2, 5).validate(4).is_err());
        assert!(Selection::FirstN(4).validate(4).is_ok());
    }

    #[test]
    fn flags_map_onto_selections() {
        assert_eq!(Selection::from_bounds(None, None, None).unwrap(), Selection::All);
        assert_eq!(Selection::from_bounds(Some(3), None, None).unwrap(), Selection::StartFrom(3));
        assert_eq!(Selection::from_bounds(None, Some(9), None).unwrap(), Selection::Range(1, 9));
        assert_eq!(Selection::from_bounds(None, None, Some(2)).unwrap(), Selection::FirstN(2));
        assert!(Selection::from_bounds(Some(1), None, Some(2)).is_err());
    }
}
