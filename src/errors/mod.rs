use crate::api::errors::TransportError;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum AppError {
    IoError(std::io::Error),
    TransportError(TransportError),
    TomlError(toml::de::Error),
    JsonError(serde_json::Error),
    MissingFile { what: &'static str, path: PathBuf },
    MissingConfig(String),
    EmptyChangeSet(String),
    NoSession(PathBuf),
    RollbackError(String),
    InvalidInput(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::IoError(e) => write!(f, "IO error: {}", e),
            AppError::TransportError(e) => write!(f, "Model request failed: {}", e),
            AppError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            AppError::JsonError(e) => write!(f, "JSON error: {}", e),
            AppError::MissingFile { what, path } => {
                write!(f, "{} not found: {}", capitalize(what), path.display())
            }
            AppError::MissingConfig(key) => write!(f, "Missing configuration value: {}", key),
            AppError::EmptyChangeSet(source) => {
                write!(f, "No valid 'code_change' found in {}", source)
            }
            AppError::NoSession(dir) => {
                write!(f, "No analysis_* folder found under {}", dir.display())
            }
            AppError::RollbackError(e) => write!(f, "Rollback error: {}", e),
            AppError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::TomlError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError(err)
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::TransportError(err)
    }
}
