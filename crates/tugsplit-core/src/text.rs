//! Line-oriented text utilities.
//!
//! ## Coordinate Conventions
//!
//! - Lines are **1-indexed** and ranges are **inclusive** on both ends
//! - Out-of-range ranges are clamped, never panic

/// Split source text into lines without their terminators.
///
/// Handles both `\n` and `\r\n`.
pub fn split_lines(source: &str) -> Vec<String> {
    source.lines().map(str::to_string).collect()
}

/// Join the inclusive 1-indexed line range `start..=end` with `\n`.
///
/// Returns an empty string when the range is empty after clamping.
pub fn extract_lines(lines: &[String], start: usize, end: usize) -> String {
    let start = start.max(1);
    let end = end.min(lines.len());
    if start > end {
        return String::new();
    }
    lines[start - 1..end].join("\n")
}

/// Trim surrounding blank lines and terminate with exactly one newline.
///
/// Returns an empty string for all-blank input.
pub fn finish_file(text: &str) -> String {
    let trimmed = text.trim_matches(|c| c == '\n' || c == '\r');
    if trimmed.trim().is_empty() {
        return String::new();
    }
    let mut out = trimmed.trim_end().to_string();
    out.push('\n');
    out
}

/// Leading whitespace of a line.
pub fn indentation(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod extraction {
        use super::*;

        #[test]
        fn extract_inclusive_range() {
            let lines = split_lines("a\nb\nc\nd\n");
            assert_eq!(extract_lines(&lines, 2, 3), "b\nc");
            assert_eq!(extract_lines(&lines, 1, 1), "a");
        }

        #[test]
        fn extract_clamps_out_of_range() {
            let lines = split_lines("a\nb");
            assert_eq!(extract_lines(&lines, 0, 10), "a\nb");
            assert_eq!(extract_lines(&lines, 3, 4), "");
        }

        #[test]
        fn split_handles_crlf() {
            assert_eq!(split_lines("x\r\ny\r\n"), vec!["x", "y"]);
        }
    }

    #[test]
    fn finish_file_trims_and_terminates() {
        assert_eq!(finish_file("\n\nx = 1\n\n\n"), "x = 1\n");
        assert_eq!(finish_file("\n \n"), "");
    }

    #[test]
    fn indentation_of_line() {
        assert_eq!(indentation("    from ..x import y"), "    ");
        assert_eq!(indentation("import os"), "");
    }
}
