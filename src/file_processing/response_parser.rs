use crate::models::{ChangeSet, FileChange};
use std::collections::BTreeMap;

/// Extensions a bare line must end with to open an UPDATED FILES block.
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

const UPDATED_FILES_MARKER: &str = "UPDATED FILES";
const CHANGES_MARKER: &str = "CHANGES";
const ROOT_LABEL: &str = "Root of the problem:";
const FIX_LABEL: &str = "How to fix:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    UpdatedFiles,
    Changes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Root,
    Fix,
}

/// What a single response line means to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    SectionMarker(Section),
    Label(Label),
    /// `<file> - <line>`; `line` is `None` when the number does not fit.
    Header { file: &'a str, line: Option<u64> },
    Path(&'a str),
    Other,
}

/// Parses a model reply using the default JS/TS extension set.
pub fn parse(response: &str) -> ChangeSet {
    parse_with_extensions(response, DEFAULT_EXTENSIONS)
}

/// Parses a model reply into a [`ChangeSet`]. Unknown shapes degrade to empty fields.
pub fn parse_with_extensions<E: AsRef<str>>(response: &str, extensions: &[E]) -> ChangeSet {
    let lines = split_lines(response);

    let (updated_files, resume_at) = match lines
        .iter()
        .position(|line| is_marker(line, Section::UpdatedFiles))
    {
        Some(marker) => scan_updated_files(&lines, marker + 1, extensions),
        None => (BTreeMap::new(), 0),
    };

    let changes_start = lines[resume_at..]
        .iter()
        .position(|line| is_marker(line, Section::Changes))
        .map_or(lines.len(), |offset| resume_at + offset + 1);

    let mut scanner = ChangesScanner::default();
    for &line in &lines[changes_start..] {
        scanner.feed(line);
    }

    let mut code_change = scanner.code_change;
    for (path, content) in updated_files {
        code_change.entry(path).or_default().full_code = Some(content);
    }

    ChangeSet {
        code_change,
        root_cause: squash(&scanner.root_lines.join("\n")),
        fix_description: squash(&scanner.fix_lines.join("\n")),
        raw_response: response.trim().to_string(),
    }
}

/// Trims every line and collapses runs of blank lines down to one.
pub fn squash(text: &str) -> String {
    let trimmed = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");

    let mut squashed = String::with_capacity(trimmed.len());
    let mut newlines = 0;
    for ch in trimmed.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        squashed.push(ch);
    }
    squashed.trim().to_string()
}

/// Classifies a line found inside the UPDATED FILES section.
pub fn classify_updated_files_line<'a, E: AsRef<str>>(
    line: &'a str,
    extensions: &[E],
) -> LineKind<'a> {
    if is_marker(line, Section::Changes) {
        LineKind::SectionMarker(Section::Changes)
    } else if is_path_line(line, extensions) {
        LineKind::Path(line)
    } else {
        LineKind::Other
    }
}

/// Classifies a line found inside the CHANGES section.
pub fn classify_changes_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case(ROOT_LABEL) {
        return LineKind::Label(Label::Root);
    }
    if trimmed.eq_ignore_ascii_case(FIX_LABEL) {
        return LineKind::Label(Label::Fix);
    }
    match parse_header(line) {
        Some((file, line)) => LineKind::Header { file, line },
        None => LineKind::Other,
    }
}

/// Splits on `\n`, `\r\n` and a lone `\r`.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(['\r', '\n']) {
        lines.push(&rest[..pos]);
        let break_len = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[pos + break_len..];
    }
    if !rest.is_empty() {
        lines.push(rest);
    }
    lines
}

fn is_marker(line: &str, section: Section) -> bool {
    let marker = match section {
        Section::UpdatedFiles => UPDATED_FILES_MARKER,
        Section::Changes => CHANGES_MARKER,
    };
    line.trim().eq_ignore_ascii_case(marker)
}

/// Purely syntactic: no leading whitespace and a `<stem>.<ext>` ending.
fn is_path_line<E: AsRef<str>>(line: &str, extensions: &[E]) -> bool {
    if line.is_empty() || line.starts_with(char::is_whitespace) {
        return false;
    }
    extensions.iter().any(|ext| {
        line.strip_suffix(ext.as_ref())
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|stem| !stem.is_empty())
    })
}

/// Splits `path - 12`, `path-12` or `path - (12)` into its file and line parts.
fn parse_header(line: &str) -> Option<(&str, Option<u64>)> {
    let body = line.trim_end();
    let body = body.strip_suffix(')').unwrap_or(body);

    let digits_at = body.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits_at == body.len() {
        return None;
    }
    let digits = &body[digits_at..];

    let rest = &body[..digits_at];
    let rest = rest.strip_suffix('(').unwrap_or(rest).trim_end();
    let file = rest.strip_suffix('-')?.trim();
    if file.is_empty() {
        return None;
    }

    Some((file, digits.parse().ok()))
}

/// Text of a `- ` / `+ ` hunk line, keeping whatever follows the marker verbatim.
fn hunk_text<'a>(line: &'a str, marker: &str, lead: char) -> &'a str {
    match line.split_once(marker) {
        Some((_, text)) => text,
        None => line.trim_start_matches(lead).trim_start(),
    }
}

fn scan_updated_files<'a, E: AsRef<str>>(
    lines: &[&'a str],
    start: usize,
    extensions: &[E],
) -> (BTreeMap<String, String>, usize) {
    let mut files = BTreeMap::new();
    let mut current: Option<(&str, Vec<&str>)> = None;

    let mut index = start;
    while index < lines.len() {
        let line = lines[index];
        match classify_updated_files_line(line, extensions) {
            LineKind::SectionMarker(Section::Changes) => break,
            LineKind::Path(path) => {
                flush_file(&mut files, current.take());
                current = Some((path, Vec::new()));
            }
            _ => {
                if let Some((_, content)) = current.as_mut() {
                    content.push(line);
                }
            }
        }
        index += 1;
    }
    flush_file(&mut files, current);

    (files, index)
}

fn flush_file(files: &mut BTreeMap<String, String>, block: Option<(&str, Vec<&str>)>) {
    if let Some((path, content)) = block {
        let content = content.join("\n").trim_end_matches('\n').to_string();
        files.insert(path.to_string(), content);
    }
}

#[derive(Default)]
struct ChangesScanner<'a> {
    code_change: BTreeMap<String, FileChange>,
    hunk: Option<(String, u64)>,
    accumulating: Option<Label>,
    root_lines: Vec<&'a str>,
    fix_lines: Vec<&'a str>,
}

impl<'a> ChangesScanner<'a> {
    fn feed(&mut self, line: &'a str) {
        let kind = classify_changes_line(line);

        if let LineKind::Label(label) = kind {
            self.accumulating = Some(label);
            return;
        }

        if let Some(label) = self.accumulating {
            if !matches!(kind, LineKind::Header { .. }) {
                match label {
                    Label::Root => self.root_lines.push(line),
                    Label::Fix => self.fix_lines.push(line),
                }
                return;
            }
            self.accumulating = None;
        }

        match kind {
            LineKind::Header { file, line } => self.start_hunk(file, line),
            _ => self.push_hunk_line(line),
        }
    }

    fn start_hunk(&mut self, file: &str, line: Option<u64>) {
        // Content after an unusable line number is dropped until the next valid header.
        self.hunk = line.map(|number| (file.to_string(), number));
        if let Some((file, number)) = &self.hunk {
            self.code_change
                .entry(file.clone())
                .or_default()
                .line_edits
                .entry(*number)
                .or_default();
        }
    }

    fn push_hunk_line(&mut self, line: &str) {
        let Some((file, number)) = &self.hunk else {
            return;
        };
        let Some(edit) = self
            .code_change
            .get_mut(file)
            .and_then(|change| change.line_edits.get_mut(number))
        else {
            return;
        };

        let stripped = line.trim();
        if stripped.starts_with("- ") {
            edit.removed.push(hunk_text(line, "- ", '-').to_string());
        } else if stripped.starts_with("+ ") {
            edit.added.push(hunk_text(line, "+ ", '+').to_string());
        }
    }
}
