use crate::errors::AppError;
use crate::file_processing::response_parser::DEFAULT_EXTENSIONS;
use crate::file_processing::scanner::DEFAULT_SKIP_DIRS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Settings for one run, loaded once and passed down explicitly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub project: ProjectConfig,
    pub paths: PathsConfig,
    pub ssh: SshConfig,
    pub model: ModelConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub target: String,
    pub log_path: PathBuf,
    pub extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Context artifact; defaults to `ctx_out/ctx_<target>_files.txt`.
    pub codes_out: Option<PathBuf>,
    /// Prompt template with `{log_text}` and `{codes_block}` placeholders.
    pub prompt_format: Option<PathBuf>,
    pub system_prompt: Option<PathBuf>,
    pub out_dir: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: Option<PathBuf>,
    pub passfile_path: Option<PathBuf>,
    pub connect_timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ssh,
    Http,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub transport: TransportKind,
    pub api_url: String,
    pub name: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub keep_alive: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            project: ProjectConfig::default(),
            paths: PathsConfig::default(),
            ssh: SshConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            target: "handleLogging".to_string(),
            log_path: PathBuf::from("src/log.txt"),
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|dir| dir.to_string()).collect(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            codes_out: None,
            prompt_format: None,
            system_prompt: None,
            out_dir: PathBuf::from("error_analysis_reports"),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: "root".to_string(),
            key_path: None,
            passfile_path: None,
            connect_timeout_secs: 30,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Ssh,
            api_url: "http://localhost:11434/api/generate".to_string(),
            name: "llama3.1:8b".to_string(),
            temperature: 0.1,
            num_predict: 2048,
            keep_alive: "5m".to_string(),
            timeout_secs: 600,
        }
    }
}

impl Config {
    pub fn codes_out_path(&self) -> PathBuf {
        self.paths.codes_out.clone().unwrap_or_else(|| {
            PathBuf::from("ctx_out").join(format!("ctx_{}_files.txt", self.project.target))
        })
    }
}

/// `config.toml` next to the executable.
pub fn get_config_path() -> PathBuf {
    let mut path = get_executable_dir();
    path.push("config.toml");
    path
}

/// Validate config to prevent obviously wrong or missing values.
pub fn validate_config(config: &Config) -> Result<(), AppError> {
    if config.project.target.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Target symbol cannot be empty".to_string(),
        ));
    }
    if config.project.extensions.is_empty() {
        return Err(AppError::InvalidInput(
            "At least one file extension is required".to_string(),
        ));
    }
    if config.model.temperature < 0.0 || config.model.temperature > 2.0 {
        return Err(AppError::InvalidInput(
            "Temperature must be between 0.0 and 2.0".to_string(),
        ));
    }
    if config.model.timeout_secs == 0 {
        return Err(AppError::InvalidInput(
            "Timeout must be greater than zero".to_string(),
        ));
    }
    if config.model.num_predict == 0 {
        return Err(AppError::InvalidInput(
            "num_predict must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Read config from file, and create a default config if none exists.
pub fn read_config(config_path: &Path) -> Result<Config, AppError> {
    if !config_path.exists() {
        log::info!("Creating default config at {}", config_path.display());
        write_config(config_path, &Config::default())?;
    }
    let config_str = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&config_str)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn write_config(config_path: &Path, config: &Config) -> Result<(), AppError> {
    let config_str =
        toml::to_string(config).map_err(|e| AppError::InvalidInput(e.to_string()))?;
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, config_str)?;
    Ok(())
}

fn get_executable_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
