pub mod change_set;
pub mod session_records;

pub use change_set::{ChangeSet, FileChange, LineEdit};
pub use session_records::{
    AppliedFile, ApplyMode, ApplySummary, PromptMetadata, SessionMeta, SkippedEntry,
};
