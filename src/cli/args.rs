use crate::errors::AppError;
use crate::utils::config::{validate_config, Config, TransportKind};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for mend.
///
/// Without a subcommand the full pipeline runs: collect, analyze, and (with `--apply`) apply.
#[derive(Parser, Debug, PartialEq, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to config.toml. Defaults to the one next to the executable.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Reuse the existing context file instead of scanning the project.
    #[arg(long)]
    pub no_collect: bool,

    /// Stop after collecting context.
    #[arg(long)]
    pub no_analyze: bool,

    /// Overwrite project files with the proposed full-file contents.
    #[arg(long)]
    pub apply: bool,

    /// Show the diffs `--apply` would write without touching any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// One-off values that take precedence over config.toml.
#[derive(ClapArgs, Debug, PartialEq, Clone, Default)]
pub struct Overrides {
    /// Project directory to scan and patch.
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Function or symbol to search for.
    #[arg(short, long, global = true)]
    pub target: Option<String>,

    /// Error log sent to the model.
    #[arg(long, global = true)]
    pub log_path: Option<PathBuf>,

    /// Where the collected context file is written.
    #[arg(long, global = true)]
    pub codes_out: Option<PathBuf>,

    /// Folder holding the analysis_* session folders.
    #[arg(long, global = true)]
    pub out_dir: Option<PathBuf>,

    /// Model name, e.g. llama3.1:8b.
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Seconds to wait for the model.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl Overrides {
    /// Layers the overrides onto `config` and validates the result.
    pub fn apply_to(&self, config: &mut Config) -> Result<(), AppError> {
        if let Some(project) = &self.project {
            config.project.root = project.clone();
        }
        if let Some(target) = &self.target {
            config.project.target = target.clone();
        }
        if let Some(log_path) = &self.log_path {
            config.project.log_path = log_path.clone();
        }
        if let Some(codes_out) = &self.codes_out {
            config.paths.codes_out = Some(codes_out.clone());
        }
        if let Some(out_dir) = &self.out_dir {
            config.paths.out_dir = out_dir.clone();
        }
        if let Some(model) = &self.model {
            config.model.name = model.clone();
        }
        if let Some(timeout) = self.timeout {
            config.model.timeout_secs = timeout;
        }
        validate_config(config)
    }
}

/// Subcommands for mend.
#[derive(Subcommand, Debug, PartialEq, Clone)]
pub enum Commands {
    /// Collect files referencing the target into one context file.
    Collect,

    /// Send the log and context to the model and save the parsed answer.
    Analyze,

    /// Apply the newest session's response.json.
    Apply {
        /// Print unified diffs instead of writing files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a saved model response into change-set JSON.
    Parse {
        /// Response text, e.g. a session's response.txt.
        input: PathBuf,

        /// Output JSON path. Defaults to the input with a .json extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore the files changed by the last apply.
    Rollback,

    /// Manage configuration options.
    Config(ConfigArgs),
}

#[derive(ClapArgs, Debug, PartialEq, Clone, Default)]
pub struct ConfigArgs {
    /// Set the log level (debug, info, warn, error, off).
    #[arg(long)]
    pub set_log_level: Option<String>,

    #[arg(long)]
    pub set_project_root: Option<PathBuf>,

    #[arg(long)]
    pub set_target: Option<String>,

    #[arg(long)]
    pub set_log_path: Option<PathBuf>,

    #[arg(long)]
    pub set_out_dir: Option<PathBuf>,

    /// Prompt template file with {log_text} and {codes_block} placeholders.
    #[arg(long)]
    pub set_prompt_format: Option<PathBuf>,

    #[arg(long)]
    pub set_system_prompt: Option<PathBuf>,

    /// Set the SSH host running the model server.
    #[arg(long)]
    pub set_host: Option<String>,

    #[arg(long)]
    pub set_port: Option<u16>,

    #[arg(long)]
    pub set_user: Option<String>,

    /// Set the private key used for SSH.
    #[arg(long)]
    pub set_key: Option<PathBuf>,

    /// File holding the key passphrase (requires sshpass).
    #[arg(long)]
    pub set_passfile: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub set_transport: Option<TransportKind>,

    #[arg(long)]
    pub set_api_url: Option<String>,

    #[arg(long)]
    pub set_model: Option<String>,

    /// Set the sampling temperature (0.0 to 2.0).
    #[arg(long)]
    pub set_temperature: Option<f32>,

    /// Set the model timeout in seconds.
    #[arg(long)]
    pub set_timeout: Option<u64>,

    /// Print the resulting configuration.
    #[arg(long)]
    pub show: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_flags() {
        let args = Args::parse_from(["mend", "--no-collect", "--apply", "-t", "renderUser"]);
        assert!(args.command.is_none());
        assert!(args.no_collect);
        assert!(args.apply);
        assert!(!args.dry_run);
        assert_eq!(args.overrides.target.as_deref(), Some("renderUser"));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Args::parse_from([
            "mend",
            "apply",
            "--dry-run",
            "--config",
            "alt.toml",
            "--project",
            "web",
        ]);
        assert_eq!(args.command, Some(Commands::Apply { dry_run: true }));
        assert_eq!(args.config, Some(PathBuf::from("alt.toml")));
        assert_eq!(args.overrides.project, Some(PathBuf::from("web")));
    }

    #[test]
    fn test_config_subcommand() {
        let args = Args::parse_from([
            "mend",
            "config",
            "--set-host",
            "10.0.0.5",
            "--set-transport",
            "http",
            "--show",
        ]);
        let Some(Commands::Config(config_args)) = args.command else {
            panic!("expected config subcommand");
        };
        assert_eq!(config_args.set_host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config_args.set_transport, Some(TransportKind::Http));
        assert!(config_args.show);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let mut config = Config::default();
        Overrides {
            target: Some("renderUser".to_string()),
            timeout: Some(30),
            ..Default::default()
        }
        .apply_to(&mut config)
        .unwrap();
        assert_eq!(config.project.target, "renderUser");
        assert_eq!(config.model.timeout_secs, 30);
        assert_eq!(config.project.log_path, PathBuf::from("src/log.txt"));
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let args = Args::parse_from(["mend", "--timeout", "0"]);
        let err = args.overrides.apply_to(&mut Config::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let args = Args::parse_from(["mend", "collect", "--target", ""]);
        assert!(args.overrides.apply_to(&mut Config::default()).is_err());
    }
}
