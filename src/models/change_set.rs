use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured result of parsing one model response.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    #[serde(default)]
    pub code_change: BTreeMap<String, FileChange>,
    #[serde(rename = "root", default)]
    pub root_cause: String,
    #[serde(rename = "fix", default)]
    pub fix_description: String,
    #[serde(rename = "raw", default)]
    pub raw_response: String,
}

/// Everything the model proposed for a single file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChange {
    /// Complete replacement content from an UPDATED FILES block.
    #[serde(rename = "code", default, skip_serializing_if = "Option::is_none")]
    pub full_code: Option<String>,
    /// Hunks keyed by the line number given in their header.
    #[serde(rename = "changes", default)]
    pub line_edits: BTreeMap<u64, LineEdit>,
}

/// Removed and added lines anchored to one line number.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEdit {
    #[serde(rename = "remove", default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(rename = "add", default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.code_change.is_empty()
    }

    /// Entries carrying a non-empty full-file replacement.
    pub fn full_replacements(&self) -> impl Iterator<Item = (&str, &str)> {
        self.code_change.iter().filter_map(|(path, change)| {
            change
                .full_code
                .as_deref()
                .filter(|code| !code.is_empty())
                .map(|code| (path.as_str(), code))
        })
    }
}

impl LineEdit {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}
