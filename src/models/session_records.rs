use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Written to `prompt.json` before the model is called.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PromptMetadata {
    pub timestamp: String,
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub system_prompt_present: bool,
    pub prompt_text: String,
    pub log_source: PathBuf,
    pub codes_file: PathBuf,
}

/// Written to `meta.json` once a session has a parsed response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionMeta {
    pub log_file: PathBuf,
    pub codes_file: PathBuf,
    pub model: String,
    pub prompt_file_txt: PathBuf,
    pub prompt_file_json: PathBuf,
    pub response_file_txt: PathBuf,
    pub response_file_json: PathBuf,
    pub stderr: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    Overwrite,
    DryRun,
}

/// One destination file touched (or previewed) by an apply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppliedFile {
    pub path: String,
    pub destination: PathBuf,
    pub created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_previous: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_new: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Written next to `response.json` after an apply or dry run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    pub mode: ApplyMode,
    pub updated_files: Vec<PathBuf>,
    #[serde(default)]
    pub files: Vec<AppliedFile>,
    #[serde(default)]
    pub skipped: Vec<SkippedEntry>,
}

impl ApplySummary {
    pub fn new(mode: ApplyMode) -> Self {
        Self {
            mode,
            updated_files: Vec::new(),
            files: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self.mode {
            ApplyMode::Overwrite => "apply_summary_overwrite.json",
            ApplyMode::DryRun => "apply_summary_dryrun.json",
        }
    }
}
