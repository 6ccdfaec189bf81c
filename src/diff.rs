use console::style;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, DiffTag, TextDiff};

/// Number of added and removed lines between two versions of a file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    pub added: usize,
    pub removed: usize,
}

impl std::fmt::Display for LineDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{} -{}", self.added, self.removed)
    }
}

pub fn line_delta(old: &str, new: &str) -> LineDelta {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold(LineDelta::default(), |mut delta, change| {
            match change.tag() {
                ChangeTag::Insert => delta.added += 1,
                ChangeTag::Delete => delta.removed += 1,
                ChangeTag::Equal => {}
            }
            delta
        })
}

/// Renders a colored, line-numbered preview of the change from `old` to `new`.
/// Lines that differ only in whitespace are shown as context.
pub fn generate_custom_diff(old: &str, new: &str) -> String {
    if old == new {
        return "No changes detected.".to_string();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    const CONTEXT_LINES: usize = 2;
    let diff = TextDiff::from_slices(&old_lines, &new_lines);

    let mut diff_lines = Vec::new();

    for (hunk_idx, group) in diff.grouped_ops(CONTEXT_LINES).iter().enumerate() {
        if hunk_idx > 0 {
            diff_lines.push("...".to_string());
        }

        for op in group {
            let (tag, old_range, new_range) = (op.tag(), op.old_range(), op.new_range());
            match tag {
                DiffTag::Replace => {
                    if old_range.len() == 1 && new_range.len() == 1 {
                        let old_normalized: String =
                            old_lines[old_range.start].split_whitespace().collect();
                        let new_normalized: String =
                            new_lines[new_range.start].split_whitespace().collect();
                        if old_normalized == new_normalized {
                            let i = new_range.start;
                            diff_lines.push(format!("  {:>4}: {}", i + 1, new_lines[i]));
                            continue;
                        }
                    }
                    for i in old_range {
                        diff_lines.push(
                            style(format!("- {:>4}: {}", i + 1, old_lines[i]))
                                .red()
                                .to_string(),
                        );
                    }
                    for i in new_range {
                        diff_lines.push(
                            style(format!("+ {:>4}: {}", i + 1, new_lines[i]))
                                .green()
                                .to_string(),
                        );
                    }
                }
                DiffTag::Delete => {
                    for i in old_range {
                        diff_lines.push(
                            style(format!("- {:>4}: {}", i + 1, old_lines[i]))
                                .red()
                                .to_string(),
                        );
                    }
                }
                DiffTag::Insert => {
                    for i in new_range {
                        diff_lines.push(
                            style(format!("+ {:>4}: {}", i + 1, new_lines[i]))
                                .green()
                                .to_string(),
                        );
                    }
                }
                DiffTag::Equal => {
                    for i in new_range {
                        diff_lines.push(format!("  {:>4}: {}", i + 1, new_lines[i]));
                    }
                }
            }
        }
    }
    diff_lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use console::style;

    #[test]
    fn test_line_delta() {
        assert_eq!(line_delta("a\nb\n", "a\nb\n"), LineDelta::default());
        assert_eq!(
            line_delta("a\nb\nc\n", "a\nB\nc\nd\n"),
            LineDelta {
                added: 2,
                removed: 1
            }
        );
        assert_eq!(line_delta("", "x\ny\n").to_string(), "+2 -0");
    }

    #[test]
    fn test_generate_custom_diff() {
        let old = "line 1\nline 2\nline 3";
        assert_eq!(generate_custom_diff(old, old), "No changes detected.");

        let new = "line 1\nline 3 modified\nline 4 added";
        let diff = generate_custom_diff(old, new);
        let expected = [
            "     1: line 1".to_string(),
            style("-    2: line 2").red().to_string(),
            style("-    3: line 3").red().to_string(),
            style("+    2: line 3 modified").green().to_string(),
            style("+    3: line 4 added").green().to_string(),
        ]
        .join("\n");
        assert_eq!(diff, expected);
    }

    #[test]
    fn test_whitespace_change_is_neutral() {
        let old = "context before\nmy_function()\ncontext after";
        let new = "context before\n  my_function()\ncontext after";
        let diff = generate_custom_diff(old, new);
        let expected = [
            "     1: context before",
            "     2:   my_function()",
            "     3: context after",
        ]
        .join("\n");
        assert_eq!(diff, expected);
    }

    #[test]
    fn test_multiple_hunks_are_separated() {
        let old = "a\n1\n2\n3\n4\n5\n6\nb";
        let new = "A\n1\n2\n3\n4\n5\n6\nB";
        let diff = generate_custom_diff(old, new);
        assert!(diff.contains("\n...\n"));
    }
}
