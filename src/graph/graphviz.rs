// SPDX-License-Identifier: GPL-2.0-or-later

//! DOT diagnostics output, grounded in the original `graphviz()` /
//! `wordWrap()` implementation: one box per node (id + info, word-wrapped
//! at 40 columns), one oval per decorative entry, edges labeled with the
//! edge's debug label and (if restricted) its stream filter.

const WRAP_WIDTH: usize = 40;

/// Wraps `text` to `width` columns, cutting preferentially at a space, `/`
/// or `,`; a single word longer than `width` is still cut mid-word rather
/// than left unwrapped.
#[must_use]
pub fn word_wrap(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.is_empty() {
        return vec![text.to_owned()];
    }
    let chars: Vec<char> = text.chars().collect();
    let mut lines = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= width {
            lines.push(chars[start..].iter().collect());
            break;
        }
        let window_end = start + width;
        // (line_end, next_start): a space is dropped, '/' and ',' are kept
        // as the last character of the current line.
        let mut cut = None;
        for i in (start..window_end).rev() {
            match chars[i] {
                ' ' => {
                    cut = Some((i, i + 1));
                    break;
                }
                '/' | ',' => {
                    cut = Some((i + 1, i + 1));
                    break;
                }
                _ => {}
            }
        }
        let (line_end, next_start) = cut.unwrap_or((window_end, window_end));
        let line_end = line_end.max(start + 1);
        let next_start = next_start.max(line_end);
        lines.push(chars[start..line_end].iter().collect::<String>());
        start = next_start;
        while start < chars.len() && chars[start] == ' ' {
            start += 1;
        }
    }
    lines
}

/// Escapes `"` and newlines for embedding in a DOT label string.
#[must_use]
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("short", 40, vec!["short"]; "no wrap needed")]
    #[test_case(
        "this label is definitely longer than forty characters",
        40,
        vec!["this label is definitely longer than", "forty characters"];
        "wraps on space"
    )]
    fn test_word_wrap(input: &str, width: usize, want: Vec<&str>) {
        let got = word_wrap(input, width);
        assert_eq!(got, want);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\nc"), "\"a\\\"b\\nc\"");
    }
}
