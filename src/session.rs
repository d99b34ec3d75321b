use crate::errors::AppError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const SESSION_PREFIX: &str = "analysis_";

pub const FULL_PROMPT_TXT: &str = "full_prompt.txt";
pub const PROMPT_JSON: &str = "prompt.json";
pub const RESPONSE_TXT: &str = "response.txt";
pub const RESPONSE_JSON: &str = "response.json";
pub const META_JSON: &str = "meta.json";

/// Local time as `YYYYmmdd_HHMMSS`; sorts chronologically as a string.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// One `analysis_<timestamp>` folder holding every artifact of a run.
#[derive(Debug, Clone)]
pub struct Session {
    pub dir: PathBuf,
    pub timestamp: String,
}

impl Session {
    pub async fn create(out_dir: &Path, timestamp: &str) -> Result<Self, AppError> {
        let dir = out_dir.join(format!("{SESSION_PREFIX}{timestamp}"));
        fs::create_dir_all(&dir).await?;
        log::debug!("Session folder: {}", dir.display());
        Ok(Self {
            dir,
            timestamp: timestamp.to_string(),
        })
    }

    pub fn open(dir: PathBuf) -> Self {
        let timestamp = dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(SESSION_PREFIX))
            .unwrap_or_default()
            .to_string();
        Self { dir, timestamp }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub async fn write_text(&self, name: &str, text: &str) -> Result<PathBuf, AppError> {
        let path = self.path(name);
        fs::write(&path, text).await?;
        Ok(path)
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, AppError> {
        let path = self.path(name);
        write_json(&path, value).await?;
        Ok(path)
    }
}

/// Pretty-printed, UTF-8 JSON.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, json).await?;
    Ok(())
}

/// Newest `analysis_*` folder under `out_dir`, if any.
pub fn find_latest_session(out_dir: &Path) -> Option<PathBuf> {
    list_sessions(out_dir).pop()
}

/// Newest session folder accepted by `predicate`.
pub fn find_latest_session_where(
    out_dir: &Path,
    predicate: impl Fn(&Path) -> bool,
) -> Option<PathBuf> {
    list_sessions(out_dir)
        .into_iter()
        .rev()
        .find(|dir| predicate(dir))
}

/// Session folders sorted oldest first. Names embed the timestamp, so name order is time order.
fn list_sessions(out_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(out_dir) else {
        return Vec::new();
    };
    let mut sessions: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(SESSION_PREFIX))
        })
        .map(|entry| entry.path())
        .collect();
    sessions.sort();
    sessions
}
