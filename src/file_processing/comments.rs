#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    LineComment,
    BlockComment,
    /// Inside a `'`, `"` or `` ` `` literal, tracking whether the last char was a backslash.
    Quoted { quote: char, escaped: bool },
}

/// Removes `//` and `/* */` comments from JS-like source and tightens whitespace.
///
/// String and template literals are copied untouched. Afterwards every line is
/// right-trimmed, runs of blank lines collapse to one, and the result ends with
/// a single newline.
pub fn strip_comments_and_tighten(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = LexState::Normal;
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        state = match state {
            LexState::LineComment => {
                if ch == '\n' {
                    out.push(ch);
                    LexState::Normal
                } else {
                    LexState::LineComment
                }
            }
            LexState::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    LexState::Normal
                } else {
                    LexState::BlockComment
                }
            }
            LexState::Quoted { quote, escaped } => {
                out.push(ch);
                if !escaped && ch == quote {
                    LexState::Normal
                } else {
                    LexState::Quoted {
                        quote,
                        escaped: ch == '\\' && !escaped,
                    }
                }
            }
            LexState::Normal => match (ch, chars.peek()) {
                ('/', Some('/')) => {
                    chars.next();
                    LexState::LineComment
                }
                ('/', Some('*')) => {
                    chars.next();
                    LexState::BlockComment
                }
                ('\'' | '"' | '`', _) => {
                    out.push(ch);
                    LexState::Quoted {
                        quote: ch,
                        escaped: false,
                    }
                }
                _ => {
                    out.push(ch);
                    LexState::Normal
                }
            },
        };
    }

    tighten(&out)
}

fn tighten(text: &str) -> String {
    let mut lines = Vec::new();
    let mut previous_blank = false;
    for line in text.lines().map(str::trim_end) {
        let blank = line.is_empty();
        if !(blank && previous_blank) {
            lines.push(line);
        }
        previous_blank = blank;
    }

    let mut tightened = lines.join("\n").trim().to_string();
    tightened.push('\n');
    tightened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_line_and_block_comments() {
        let source = "\
// header comment
const a = 1; // trailing
/* block
   spanning */ const b = 2;
";
        assert_eq!(
            strip_comments_and_tighten(source),
            "const a = 1;\n const b = 2;\n"
        );
    }

    #[test]
    fn test_keeps_comment_markers_inside_strings() {
        let source = r#"const url = "http://example.com"; const s = '/* not */'; const t = `// kept`;"#;
        assert_eq!(strip_comments_and_tighten(source), format!("{source}\n"));
    }

    #[test]
    fn test_escaped_quote_does_not_close_string() {
        let source = r#"const s = "a \" // still string"; // gone"#;
        assert_eq!(
            strip_comments_and_tighten(source),
            "const s = \"a \\\" // still string\";\n"
        );
    }

    #[test]
    fn test_double_backslash_closes_string() {
        let source = r#"const s = '\\'; // gone"#;
        assert_eq!(strip_comments_and_tighten(source), "const s = '\\\\';\n");
    }

    #[test]
    fn test_collapses_blank_lines_and_trailing_space() {
        let source = "a();   \n\n\n\n  b();\n\n\n";
        assert_eq!(strip_comments_and_tighten(source), "a();\n\n  b();\n");
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(strip_comments_and_tighten(""), "\n");
        assert_eq!(strip_comments_and_tighten("// only a comment"), "\n");
    }
}
