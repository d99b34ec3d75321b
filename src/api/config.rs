/// System prompt used when no system prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "
You are a senior JavaScript/TypeScript engineer. You receive a runtime error log and the
source files that reference the failing function. Find the root cause and propose a fix.
Your answer is parsed by a program, so follow the response format exactly.
";

/// Prompt template used when no template file is configured.
///
/// `{log_text}` and `{codes_block}` are substituted; `{{` and `}}` produce literal braces.
pub const DEFAULT_PROMPT_FORMAT: &str = "
Analyze the following error log and source files.

ERROR LOG:
{log_text}

SOURCE FILES (each file starts with a line `>>> <path>`):
{codes_block}

Respond in this format only:

UPDATED FILES
<path of a file you changed>
<the complete new content of that file>

CHANGES
<path> - <line number>
Root of the problem:
<short explanation>
How to fix:
<short explanation>
<path> - <line number>
- <line to remove>
+ <line to add>

Use the same paths as in SOURCE FILES. Do not wrap anything in markdown fences.
";

/// Fills `{name}` placeholders in a template. Unknown placeholders are kept as written.
pub fn render_prompt(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            rendered.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            rendered.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            let placeholder = tail[1..].find('}').and_then(|end| {
                let name = &tail[1..1 + end];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, end + 2))
            });
            match placeholder {
                Some((value, consumed)) => {
                    rendered.push_str(value);
                    rest = &tail[consumed..];
                }
                None => {
                    rendered.push('{');
                    rest = &tail[1..];
                }
            }
        } else {
            rendered.push('}');
            rest = &tail[1..];
        }
    }
    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let rendered = render_prompt(
            "LOG:\n{log_text}\nCODE:\n{codes_block}\n",
            &[("log_text", "TypeError: x"), ("codes_block", ">>> a.js\nfoo()")],
        );
        assert_eq!(rendered, "LOG:\nTypeError: x\nCODE:\n>>> a.js\nfoo()\n");
    }

    #[test]
    fn test_render_unescapes_braces_and_keeps_unknown() {
        let rendered = render_prompt(
            "{{\"a\": 1}} {unknown} {log_text} }",
            &[("log_text", "{raw}")],
        );
        assert_eq!(rendered, "{\"a\": 1} {unknown} {raw} }");
    }

    #[test]
    fn test_default_template_mentions_both_sections() {
        let rendered = render_prompt(
            DEFAULT_PROMPT_FORMAT,
            &[("log_text", "L"), ("codes_block", "C")],
        );
        assert!(rendered.contains("UPDATED FILES"));
        assert!(rendered.contains("\nCHANGES\n"));
        assert!(rendered.contains("ERROR LOG:\nL\n"));
        assert!(!rendered.contains("{log_text}"));
    }
}
