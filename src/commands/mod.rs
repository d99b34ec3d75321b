pub mod analyze;

use crate::api::client::{HttpTransport, SshTransport, Transport};
use crate::cli::args::ConfigArgs;
use crate::cli::display::CliDisplayManager;
use crate::errors::AppError;
use crate::file_processing::scanner::{self, ScanOptions, ScanResult};
use crate::file_processing::{response_parser, writer};
use crate::models::ApplySummary;
use crate::session::{self, Session};
use crate::utils::config::{write_config, Config, TransportKind};
use analyze::{analyze_errors, require_file, AnalysisOutcome};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;

/// Which pipeline stages `run` executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub collect: bool,
    pub analyze: bool,
    pub apply: bool,
    pub dry_run: bool,
}

/// Collect, analyze, then optionally apply.
pub async fn handle_run(
    config: &Config,
    options: RunOptions,
    display: &mut CliDisplayManager,
) -> Result<(), AppError> {
    let start_time = Instant::now();
    display.print_header();

    if options.collect {
        handle_collect(config, display).await?;
    } else {
        display.print_skipped("[1/3] Collect");
    }

    let mut updated = 0;
    if options.analyze {
        let outcome = handle_analyze(config, display).await?;
        if (options.apply || options.dry_run) && outcome.change_set.is_empty() {
            display.print_warning("Nothing to apply: the response carried no file changes");
            display.print_footer(0, start_time.elapsed());
            return Ok(());
        }
    } else {
        display.print_skipped("[2/3] Analyze");
    }

    if options.apply || options.dry_run {
        let summary = handle_apply(config, options.dry_run, display).await?;
        if !options.dry_run {
            updated = summary.updated_files.len();
        }
    } else {
        display.print_skipped("[3/3] Apply");
    }

    display.print_footer(updated, start_time.elapsed());
    Ok(())
}

pub async fn handle_collect(
    config: &Config,
    display: &mut CliDisplayManager,
) -> Result<ScanResult, AppError> {
    display.print_collect_start(&config.project.root, &config.project.target);
    let options = ScanOptions {
        extensions: config.project.extensions.clone(),
        skip_dirs: config.project.skip_dirs.clone(),
    };
    let result = scanner::collect_context(
        &config.project.root,
        &config.project.target,
        &config.codes_out_path(),
        &options,
    )
    .await?;
    display.print_collect_result(&result);
    Ok(result)
}

pub async fn handle_analyze(
    config: &Config,
    display: &mut CliDisplayManager,
) -> Result<AnalysisOutcome, AppError> {
    let transport = build_transport(config)?;
    display.print_analyze_start(&config.model.name, &transport);

    display.start_spinner("Waiting for the model response");
    let outcome = analyze_errors(config, &transport).await;
    display.stop_spinner();

    let outcome = outcome?;
    display.print_analysis_result(&outcome);
    Ok(outcome)
}

pub async fn handle_apply(
    config: &Config,
    dry_run: bool,
    display: &mut CliDisplayManager,
) -> Result<ApplySummary, AppError> {
    let (session_dir, summary) = apply_latest(config, dry_run).await?;
    display.print_apply_result(&session_dir, &summary);
    Ok(summary)
}

/// Applies (or previews) the newest session's `response.json` and records the summary there.
pub async fn apply_latest(
    config: &Config,
    dry_run: bool,
) -> Result<(PathBuf, ApplySummary), AppError> {
    let out_dir = &config.paths.out_dir;
    let session = session::find_latest_session(out_dir)
        .map(Session::open)
        .ok_or_else(|| AppError::NoSession(out_dir.clone()))?;
    let response_json = session.path(session::RESPONSE_JSON);

    let summary = if dry_run {
        let change_set = writer::read_change_set(&response_json).await?;
        writer::preview_change_set(&change_set, &config.project.root).await?
    } else {
        writer::apply_from_file(&response_json, &config.project.root, &session.dir).await?
    };

    let summary_path = session.write_json(summary.file_name(), &summary).await?;
    log::info!("Apply summary written to {}", summary_path.display());
    Ok((session.dir, summary))
}

/// Re-parses a saved response text into a `ChangeSet` JSON file.
pub async fn handle_parse(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    display: &mut CliDisplayManager,
) -> Result<PathBuf, AppError> {
    require_file("response text", input)?;
    let bytes = fs::read(input).await?;
    let text = String::from_utf8_lossy(&bytes);
    let change_set = response_parser::parse_with_extensions(&text, &config.project.extensions);

    let output = output.unwrap_or_else(|| input.with_extension("json"));
    session::write_json(&output, &change_set).await?;
    display.print_parse_result(&output, &change_set);
    Ok(output)
}

pub async fn handle_rollback(
    config: &Config,
    display: &mut CliDisplayManager,
) -> Result<(), AppError> {
    let restored = writer::rollback_last_apply(&config.paths.out_dir).await?;
    display.print_rollback_result(&restored);
    Ok(())
}

/// Applies the `config` subcommand's settings and saves the file.
pub fn handle_config(
    config_path: &Path,
    mut config: Config,
    args: ConfigArgs,
) -> Result<Config, AppError> {
    if let Some(log_level) = args.set_log_level {
        println!("Log level set to {}", log_level);
        config.log_level = log_level;
    }
    if let Some(root) = args.set_project_root {
        println!("Project root set to {}", root.display());
        config.project.root = root;
    }
    if let Some(target) = args.set_target {
        println!("Target symbol set to {}", target);
        config.project.target = target;
    }
    if let Some(log_path) = args.set_log_path {
        println!("Log path set to {}", log_path.display());
        config.project.log_path = log_path;
    }
    if let Some(out_dir) = args.set_out_dir {
        println!("Output directory set to {}", out_dir.display());
        config.paths.out_dir = out_dir;
    }
    if let Some(prompt_format) = args.set_prompt_format {
        println!("Prompt format set to {}", prompt_format.display());
        config.paths.prompt_format = Some(prompt_format);
    }
    if let Some(system_prompt) = args.set_system_prompt {
        println!("System prompt file set to {}", system_prompt.display());
        config.paths.system_prompt = Some(system_prompt);
    }
    if let Some(host) = args.set_host {
        println!("SSH host set to {}", host);
        config.ssh.host = host;
    }
    if let Some(port) = args.set_port {
        println!("SSH port set to {}", port);
        config.ssh.port = port;
    }
    if let Some(user) = args.set_user {
        println!("SSH user set to {}", user);
        config.ssh.user = user;
    }
    if let Some(key) = args.set_key {
        println!("SSH key set to {}", key.display());
        config.ssh.key_path = Some(key);
    }
    if let Some(passfile) = args.set_passfile {
        println!("Passphrase file set to {}", passfile.display());
        config.ssh.passfile_path = Some(passfile);
    }
    if let Some(transport) = args.set_transport {
        println!("Transport set to {:?}", transport);
        config.model.transport = transport;
    }
    if let Some(api_url) = args.set_api_url {
        println!("API URL set to {}", api_url);
        config.model.api_url = api_url;
    }
    if let Some(model) = args.set_model {
        println!("Model set to {}", model);
        config.model.name = model;
    }
    if let Some(temperature) = args.set_temperature {
        println!("Temperature set to {}", temperature);
        config.model.temperature = temperature;
    }
    if let Some(timeout) = args.set_timeout {
        println!("Timeout set to {}s", timeout);
        config.model.timeout_secs = timeout;
    }

    crate::utils::config::validate_config(&config)?;
    write_config(config_path, &config)?;

    if args.show {
        let rendered =
            toml::to_string_pretty(&config).map_err(|e| AppError::InvalidInput(e.to_string()))?;
        println!("# {}\n{}", config_path.display(), rendered);
    }
    Ok(config)
}

/// Picks the transport named in `[model]`, checking its prerequisites first.
pub fn build_transport(config: &Config) -> Result<Transport, AppError> {
    match config.model.transport {
        TransportKind::Ssh => {
            if config.ssh.host.trim().is_empty() {
                return Err(AppError::MissingConfig("ssh.host".to_string()));
            }
            if let Some(key) = &config.ssh.key_path {
                require_file("SSH key", key)?;
            }
            if let Some(passfile) = &config.ssh.passfile_path {
                require_file("SSH passphrase file", passfile)?;
            }
            Ok(Transport::Ssh(SshTransport::new(&config.ssh, &config.model)))
        }
        TransportKind::Http => Ok(Transport::Http(HttpTransport::new(&config.model)?)),
    }
}
