//! Line diff over normalized definitions.
//!
//! Classic LCS dynamic programming, good enough for procedure-sized texts.
//! The contract is the add/remove counts plus a renderable artifact; the
//! rendering here is unified-diff-style text.

/// Result of diffing two definitions line by line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    pub added: usize,
    pub removed: usize,
    /// Unified-style rendering: ' ' context, '-' removed, '+' added.
    pub rendered: String,
}

impl LineDiff {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Diff `left` against `right`, line by line.
pub fn line_diff(left: &str, right: &str) -> LineDiff {
    let left_lines: Vec<&str> = if left.is_empty() {
        Vec::new()
    } else {
        left.lines().collect()
    };
    let right_lines: Vec<&str> = if right.is_empty() {
        Vec::new()
    } else {
        right.lines().collect()
    };

    let n = left_lines.len();
    let m = right_lines.len();

    // LCS length table.
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[idx(i, j)] = if left_lines[i] == right_lines[j] {
                table[idx(i + 1, j + 1)] + 1
            } else {
                table[idx(i + 1, j)].max(table[idx(i, j + 1)])
            };
        }
    }

    let mut added = 0;
    let mut removed = 0;
    let mut rendered = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if left_lines[i] == right_lines[j] {
            rendered.push(format!(" {}", left_lines[i]));
            i += 1;
            j += 1;
        } else if table[idx(i + 1, j)] >= table[idx(i, j + 1)] {
            rendered.push(format!("-{}", left_lines[i]));
            removed += 1;
            i += 1;
        } else {
            rendered.push(format!("+{}", right_lines[j]));
            added += 1;
            j += 1;
        }
    }
    while i < n {
        rendered.push(format!("-{}", left_lines[i]));
        removed += 1;
        i += 1;
    }
    while j < m {
        rendered.push(format!("+{}", right_lines[j]));
        added += 1;
        j += 1;
    }

    LineDiff {
        added,
        removed,
        rendered: rendered.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_have_empty_diff() {
        let diff = line_diff("a\nb\nc", "a\nb\nc");
        assert!(diff.is_empty());
        assert_eq!(diff.rendered, " a\n b\n c");
    }

    #[test]
    fn counts_added_and_removed_lines() {
        let diff = line_diff("a\nb\nc", "a\nx\nc\ny");
        assert_eq!(diff.removed, 1);
        assert_eq!(diff.added, 2);
        assert!(diff.rendered.contains("-b"));
        assert!(diff.rendered.contains("+x"));
        assert!(diff.rendered.contains("+y"));
    }

    #[test]
    fn empty_sides() {
        let diff = line_diff("", "a\nb");
        assert_eq!(diff.added, 2);
        assert_eq!(diff.removed, 0);

        let diff = line_diff("a\nb", "");
        assert_eq!(diff.added, 0);
        assert_eq!(diff.removed, 2);

        assert!(line_diff("", "").is_empty());
    }

    #[test]
    fn common_suffix_is_context() {
        let diff = line_diff("one\nshared", "two\nshared");
        assert_eq!(diff.added, 1);
        assert_eq!(diff.removed, 1);
        assert!(diff.rendered.ends_with(" shared"));
    }
}
