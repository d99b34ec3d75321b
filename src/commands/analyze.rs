use crate::api::client::{GenerateRequest, ModelTransport};
use crate::api::config::{render_prompt, DEFAULT_PROMPT_FORMAT, DEFAULT_SYSTEM_PROMPT};
use crate::errors::AppError;
use crate::file_processing::response_parser;
use crate::models::{ChangeSet, PromptMetadata, SessionMeta};
use crate::session::{self, Session};
use crate::utils::config::Config;
use std::path::Path;
use tokio::fs;

const NO_RESPONSE: &str = "_(no response)_";

/// Result of one analysis: the session folder and what the model proposed.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub session: Session,
    pub change_set: ChangeSet,
    pub reply_ok: bool,
}

/// Builds the prompt, asks the model, and records every artifact in a new session folder.
///
/// Prompt artifacts are written before the model call, so a transport failure still
/// leaves `full_prompt.txt` and `prompt.json` behind.
pub async fn analyze_errors<T: ModelTransport>(
    config: &Config,
    transport: &T,
) -> Result<AnalysisOutcome, AppError> {
    let log_file = config.project.log_path.as_path();
    let codes_file = config.codes_out_path();
    require_file("log file", log_file)?;
    require_file("codes file", &codes_file)?;

    let template = match &config.paths.prompt_format {
        Some(path) => {
            require_file("prompt format file", path)?;
            fs::read_to_string(path).await?
        }
        None => DEFAULT_PROMPT_FORMAT.trim_start().to_string(),
    };
    let system_prompt = load_system_prompt(config).await?;

    let log_text = read_lossy(log_file).await?;
    let codes_block = read_lossy(&codes_file).await?;
    let prompt = render_prompt(
        &template,
        &[
            ("log_text", log_text.trim()),
            ("codes_block", codes_block.trim()),
        ],
    );

    let session = Session::create(&config.paths.out_dir, &session::timestamp()).await?;
    let prompt_txt = session.write_text(session::FULL_PROMPT_TXT, &prompt).await?;
    let prompt_json = session
        .write_json(
            session::PROMPT_JSON,
            &PromptMetadata {
                timestamp: session.timestamp.clone(),
                model: config.model.name.clone(),
                temperature: config.model.temperature,
                num_predict: config.model.num_predict,
                system_prompt_present: system_prompt.is_some(),
                prompt_text: prompt.clone(),
                log_source: log_file.to_path_buf(),
                codes_file: codes_file.clone(),
            },
        )
        .await?;

    log::info!(
        "Sending {} char prompt to {} via {}",
        prompt.chars().count(),
        config.model.name,
        transport.describe()
    );
    let request = GenerateRequest::new(&config.model, prompt, system_prompt);
    let reply = transport.generate(&request).await?;
    if !reply.stderr.trim().is_empty() {
        log::debug!("Transport stderr: {}", reply.stderr.trim());
    }

    let response_text = if reply.ok {
        reply.text.trim()
    } else {
        log::warn!("Model returned an empty response");
        NO_RESPONSE
    };
    let response_txt = session.write_text(session::RESPONSE_TXT, response_text).await?;

    let change_set = if reply.ok {
        response_parser::parse_with_extensions(response_text, &config.project.extensions)
    } else {
        ChangeSet::default()
    };
    let response_json = session.write_json(session::RESPONSE_JSON, &change_set).await?;

    session
        .write_json(
            session::META_JSON,
            &SessionMeta {
                log_file: log_file.to_path_buf(),
                codes_file,
                model: config.model.name.clone(),
                prompt_file_txt: prompt_txt,
                prompt_file_json: prompt_json,
                response_file_txt: response_txt,
                response_file_json: response_json,
                stderr: reply.stderr.clone(),
            },
        )
        .await?;

    log::info!(
        "Parsed {} file change(s) into {}",
        change_set.code_change.len(),
        session.dir.display()
    );
    Ok(AnalysisOutcome {
        session,
        change_set,
        reply_ok: reply.ok,
    })
}

/// Built-in prompt when none is configured; a configured but missing file means none.
async fn load_system_prompt(config: &Config) -> Result<Option<String>, AppError> {
    match &config.paths.system_prompt {
        None => Ok(Some(DEFAULT_SYSTEM_PROMPT.trim().to_string())),
        Some(path) if path.is_file() => {
            let text = read_lossy(path).await?;
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        Some(path) => {
            log::warn!(
                "System prompt file not found, continuing without one: {}",
                path.display()
            );
            Ok(None)
        }
    }
}

pub(crate) fn require_file(what: &'static str, path: &Path) -> Result<(), AppError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AppError::MissingFile {
            what,
            path: path.to_path_buf(),
        })
    }
}

async fn read_lossy(path: &Path) -> Result<String, AppError> {
    let bytes = fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
