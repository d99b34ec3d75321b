use super::comments::strip_comments_and_tighten;
use crate::errors::AppError;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Marks the start of each file inside the context artifact.
pub const HEADER_PREFIX: &str = ">>> ";

/// Directories never descended into.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    "dist",
    "build",
    "out",
    "coverage",
    ".next",
    ".turbo",
    ".cache",
];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: super::response_parser::DEFAULT_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|dir| dir.to_string()).collect(),
        }
    }
}

/// Outcome of a context collection.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Repo-relative paths of the included files, in output order.
    pub files: Vec<String>,
    pub output_path: PathBuf,
}

impl ScanResult {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Writes every file that mentions `target` as a whole word into one context artifact.
pub async fn collect_context(
    project_root: &Path,
    target: &str,
    out_path: &Path,
    options: &ScanOptions,
) -> Result<ScanResult, AppError> {
    if !project_root.is_dir() {
        return Err(AppError::MissingFile {
            what: "project directory",
            path: project_root.to_path_buf(),
        });
    }

    let mut matches = Vec::new();
    for path in get_candidate_files(project_root, options) {
        let text = read_text_lossy(&path).await;
        if !text.is_empty() && contains_symbol(&text, target) {
            matches.push((normalize_rel_path(&path, project_root), text));
        }
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0));
    log::info!(
        "Found {} file(s) referencing '{}' under {}",
        matches.len(),
        target,
        project_root.display()
    );

    let output = if matches.is_empty() {
        String::new()
    } else {
        let chunks: Vec<String> = matches
            .iter()
            .map(|(rel, text)| {
                format!(
                    "{}{}\n{}",
                    HEADER_PREFIX,
                    rel,
                    strip_comments_and_tighten(text)
                )
            })
            .collect();
        let mut joined = chunks.join("\n").trim().to_string();
        joined.push('\n');
        joined
    };

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(out_path, output).await?;

    Ok(ScanResult {
        files: matches.into_iter().map(|(rel, _)| rel).collect(),
        output_path: out_path.to_path_buf(),
    })
}

/// Recursively lists files with an allowed extension, pruning skipped directories.
fn get_candidate_files(root: &Path, options: &ScanOptions) -> Vec<PathBuf> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !options
                .skip_dirs
                .iter()
                .any(|skip| entry.file_name().to_str() == Some(skip.as_str()))
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if options
            .extensions
            .iter()
            .any(|ext| name.ends_with(&format!(".{ext}")))
        {
            files.push(entry.into_path());
        }
    }
    files
}

async fn read_text_lossy(path: &Path) -> String {
    match fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            log::warn!("Could not read {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Whole-word search with `\b` semantics on both ends of `target`.
pub fn contains_symbol(text: &str, target: &str) -> bool {
    if target.is_empty() {
        return false;
    }
    let first = target.chars().next().is_some_and(is_word_char);
    let last = target.chars().next_back().is_some_and(is_word_char);

    text.match_indices(target).any(|(start, _)| {
        let before = text[..start].chars().next_back().is_some_and(is_word_char);
        let after = text[start + target.len()..]
            .chars()
            .next()
            .is_some_and(is_word_char);
        before != first && after != last
    })
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// `/`-separated path relative to `root`.
pub fn normalize_rel_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
