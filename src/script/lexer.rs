//! Splits script source into logical lines, each tagged with its
//! leading-space indent width. Blank lines and `#`-comment-only lines
//! are dropped before the parser ever sees them.

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub indent: usize,
    pub text: String,
}

pub fn lines(src: &str) -> Vec<Line> {
    let mut out = Vec::new();
    for raw in src.lines() {
        let trimmed_start = raw.trim_start_matches(' ');
        let indent = raw.len() - trimmed_start.len();
        let content = strip_comment(trimmed_start).trim_end();
        if content.is_empty() {
            continue;
        }
        out.push(Line {
            indent,
            text: content.to_string(),
        });
    }
    out
}

/// Strips a trailing `# ...` comment, respecting quoted strings so a
/// `#` inside a literal (e.g. `print('a # b')`) is not treated as one.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_str: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match in_str {
            Some(q) if b == q => in_str = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => in_str = Some(b),
            None if b == b'#' => return &line[..i],
            None => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_blank_and_comment_lines() {
        let ls = lines("install_packages('curl')\n\n# comment\nprint('hi')");
        assert_eq!(ls.len(), 2);
        assert_eq!(ls[0].text, "install_packages('curl')");
        assert_eq!(ls[1].text, "print('hi')");
    }

    #[test]
    fn tracks_indent() {
        let ls = lines("if x:\n    pass");
        assert_eq!(ls[0].indent, 0);
        assert_eq!(ls[1].indent, 4);
    }

    #[test]
    fn hash_inside_string_is_not_a_comment() {
        let ls = lines("print('a # b')  # real comment");
        assert_eq!(ls[0].text, "print('a # b')");
    }
}
