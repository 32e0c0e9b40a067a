// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Source-line highlighting for rendered diagnostics.

/// Highlight the 1-based column range `start..=end` of `line`.
///
/// Without color the range is marked by a caret line below the source.
pub fn highlight_line(line: &str, start: Option<usize>, end: Option<usize>, use_color: bool) -> String {
    let Some(start) = start.filter(|col| *col > 0) else {
        return line.to_string();
    };
    let chars: Vec<char> = line.chars().collect();
    let first = (start - 1).min(chars.len());
    let last = end
        .filter(|end| *end >= start)
        .map(|end| end.min(chars.len()))
        .unwrap_or(first + 1)
        .max(first + 1);
    if use_color {
        let head: String = chars[..first].iter().collect();
        let mid: String = chars[first..last.min(chars.len())].iter().collect();
        let tail: String = chars[last.min(chars.len())..].iter().collect();
        let mid = if mid.is_empty() { "^".to_string() } else { mid };
        return format!("{head}\x1b[31m{mid}\x1b[0m{tail}");
    }
    let pad: String = chars[..first]
        .iter()
        .map(|ch| if *ch == '\t' { '\t' } else { ' ' })
        .collect();
    format!("{line}\n      | {pad}{}", "^".repeat(last - first))
}

#[cfg(test)]
mod tests {
    use super::highlight_line;

    #[test]
    fn caret_marks_column_range() {
        assert_eq!(
            highlight_line("ld a,foo", Some(6), Some(8), false),
            "ld a,foo\n      |      ^^^"
        );
    }

    #[test]
    fn missing_column_leaves_line_untouched() {
        assert_eq!(highlight_line("nop", None, None, false), "nop");
        assert_eq!(highlight_line("nop", Some(0), None, true), "nop");
    }

    #[test]
    fn color_wraps_range_and_marks_end_of_line() {
        assert_eq!(
            highlight_line("abc", Some(2), None, true),
            "a\x1b[31mb\x1b[0mc"
        );
        assert_eq!(highlight_line("ab", Some(5), None, true), "ab\x1b[31m^\x1b[0m");
    }
}
