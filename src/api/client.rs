use super::errors::TransportError;
use crate::utils::config::{ModelConfig, SshConfig};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Body of an Ollama `/api/generate` call.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub keep_alive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub options: GenerateOptions,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub num_predict: u32,
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(model: &ModelConfig, prompt: String, system: Option<String>) -> Self {
        Self {
            model: model.name.clone(),
            prompt,
            stream: false,
            keep_alive: model.keep_alive.clone(),
            system,
            options: GenerateOptions {
                num_predict: model.num_predict,
                temperature: model.temperature,
            },
        }
    }
}

/// What came back from the model server.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub ok: bool,
    pub text: String,
    pub raw: String,
    pub stderr: String,
}

/// Sends one generate request and waits for the full reply.
pub trait ModelTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, TransportError>;

    fn describe(&self) -> String;
}

/// Runs `curl` on the remote host through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    port: u16,
    user: String,
    key_path: Option<PathBuf>,
    passfile_path: Option<PathBuf>,
    connect_timeout_secs: u64,
    api_url: String,
    timeout: Duration,
}

impl SshTransport {
    pub fn new(ssh: &SshConfig, model: &ModelConfig) -> Self {
        Self {
            host: ssh.host.clone(),
            port: ssh.port,
            user: ssh.user.clone(),
            key_path: ssh.key_path.clone(),
            passfile_path: ssh.passfile_path.clone(),
            connect_timeout_secs: ssh.connect_timeout_secs,
            api_url: model.api_url.clone(),
            timeout: Duration::from_secs(model.timeout_secs),
        }
    }

    /// Program and arguments; the JSON payload goes to stdin.
    pub fn command_line(&self) -> (String, Vec<String>) {
        let remote = format!(
            "curl -s -X POST {} -H 'Content-Type: application/json' --data-binary @-",
            shell_quote(&self.api_url)
        );

        let mut ssh_args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(key) = &self.key_path {
            ssh_args.extend([
                "-o".to_string(),
                "IdentitiesOnly=yes".to_string(),
                "-i".to_string(),
                key.display().to_string(),
            ]);
        }

        match &self.passfile_path {
            // sshpass answers the key passphrase prompt from the file.
            Some(passfile) => {
                let mut args = vec![
                    "-P".to_string(),
                    "passphrase".to_string(),
                    "-f".to_string(),
                    passfile.display().to_string(),
                    "ssh".to_string(),
                ];
                args.extend(ssh_args);
                args.push(format!("{}@{}", self.user, self.host));
                args.push(remote);
                ("sshpass".to_string(), args)
            }
            None => {
                let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
                args.extend(ssh_args);
                args.push(format!("{}@{}", self.user, self.host));
                args.push(remote);
                ("ssh".to_string(), args)
            }
        }
    }
}

impl ModelTransport for SshTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, TransportError> {
        let payload = serde_json::to_vec(request)?;
        let (program, args) = self.command_line();
        log::debug!(
            "Sending {} byte payload via {}@{}:{}",
            payload.len(),
            self.user,
            self.host,
            self.port
        );
        run_piped(&program, &args, &payload, self.timeout).await
    }

    fn describe(&self) -> String {
        format!("ssh {}@{}:{} → {}", self.user, self.host, self.port, self.api_url)
    }
}

/// Posts straight to the model server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(model: &ModelConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(model.timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: model.api_url.clone(),
            timeout,
        })
    }
}

impl ModelTransport for HttpTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, TransportError> {
        log::debug!("Posting generate request to {}", self.api_url);
        let response = self
            .client
            .post(&self.api_url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout.as_secs())
                } else {
                    TransportError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(TransportError::ApiError(format!("{}: {}", status, error_text)));
        }

        let raw_response = response.text().await?;
        extract_reply(&raw_response, String::new())
    }

    fn describe(&self) -> String {
        format!("http {}", self.api_url)
    }
}

/// The transport selected by configuration.
#[derive(Debug, Clone)]
pub enum Transport {
    Ssh(SshTransport),
    Http(HttpTransport),
}

impl ModelTransport for Transport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, TransportError> {
        match self {
            Transport::Ssh(ssh) => ssh.generate(request).await,
            Transport::Http(http) => http.generate(request).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Transport::Ssh(ssh) => ssh.describe(),
            Transport::Http(http) => http.describe(),
        }
    }
}

/// Spawns `program`, feeds `payload` to stdin and collects the output within `timeout`.
async fn run_piped(
    program: &str,
    args: &[String],
    payload: &[u8],
    timeout: Duration,
) -> Result<ModelReply, TransportError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TransportError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let exchange = async move {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload).await?;
            stdin.shutdown().await?;
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(timeout, exchange).await {
        Ok(output) => output?,
        Err(_) => return Err(TransportError::Timeout(timeout.as_secs())),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(TransportError::CommandFailed {
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    extract_reply(&stdout, stderr)
}

/// Pulls the `response` text out of a generate reply; non-JSON output is taken verbatim.
pub fn extract_reply(raw: &str, stderr: String) -> Result<ModelReply, TransportError> {
    let trimmed = raw.trim();
    let text = if trimmed.is_empty() {
        String::new()
    } else {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(object)) => {
                if let Some(error) = object.get("error") {
                    let message = error
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    return Err(TransportError::ApiError(message));
                }
                object
                    .get("response")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            }
            Ok(_) => String::new(),
            Err(_) => trimmed.to_string(),
        }
    };

    let text = text.trim().to_string();
    Ok(ModelReply {
        ok: !text.is_empty(),
        text,
        raw: raw.to_string(),
        stderr,
    })
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ssh_config() -> SshConfig {
        SshConfig {
            host: "83.104.0.1".to_string(),
            port: 31103,
            key_path: Some(PathBuf::from("/keys/llama")),
            ..SshConfig::default()
        }
    }

    #[test]
    fn test_generate_request_body() {
        let request = GenerateRequest::new(&ModelConfig::default(), "hi".to_string(), None);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3.1:8b",
                "prompt": "hi",
                "stream": false,
                "keep_alive": "5m",
                "options": {"num_predict": 2048, "temperature": 0.1f32}
            })
        );

        let with_system =
            GenerateRequest::new(&ModelConfig::default(), "hi".to_string(), Some("sys".into()));
        assert_eq!(serde_json::to_value(&with_system).unwrap()["system"], "sys");
    }

    #[test]
    fn test_ssh_command_line_with_key() {
        let transport = SshTransport::new(&ssh_config(), &ModelConfig::default());
        let (program, args) = transport.command_line();

        assert_eq!(program, "ssh");
        assert_eq!(&args[..2], ["-o", "BatchMode=yes"]);
        assert!(args.windows(2).any(|pair| pair == ["-p", "31103"]));
        assert!(args.windows(2).any(|pair| pair == ["-i", "/keys/llama"]));
        assert_eq!(args[args.len() - 2], "root@83.104.0.1");
        assert_eq!(
            args[args.len() - 1],
            "curl -s -X POST 'http://localhost:11434/api/generate' \
             -H 'Content-Type: application/json' --data-binary @-"
        );
    }

    #[test]
    fn test_ssh_command_line_with_passfile() {
        let mut ssh = ssh_config();
        ssh.passfile_path = Some(PathBuf::from("/keys/passphrase.txt"));
        let transport = SshTransport::new(&ssh, &ModelConfig::default());
        let (program, args) = transport.command_line();

        assert_eq!(program, "sshpass");
        assert_eq!(
            &args[..5],
            ["-P", "passphrase", "-f", "/keys/passphrase.txt", "ssh"]
        );
        assert!(!args.iter().any(|arg| arg == "BatchMode=yes"));
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_extract_reply_from_json() {
        let reply = extract_reply(r#"{"model":"m","response":"  CHANGES\n","done":true}"#, String::new())
            .unwrap();
        assert!(reply.ok);
        assert_eq!(reply.text, "CHANGES");
    }

    #[test]
    fn test_extract_reply_plain_text_and_empty() {
        let reply = extract_reply("  not json  ", "warn".to_string()).unwrap();
        assert_eq!(reply.text, "not json");
        assert_eq!(reply.stderr, "warn");

        let empty = extract_reply("   ", String::new()).unwrap();
        assert!(!empty.ok);
        assert_eq!(empty.text, "");

        let array = extract_reply("[1, 2]", String::new()).unwrap();
        assert!(!array.ok);
    }

    #[test]
    fn test_extract_reply_error_field() {
        let err = extract_reply(r#"{"error":"model 'x' not found"}"#, String::new()).unwrap_err();
        assert!(matches!(err, TransportError::ApiError(message) if message == "model 'x' not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_piped_feeds_stdin() {
        let reply = run_piped(
            "cat",
            &[],
            br#"{"response":"UPDATED FILES"}"#,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(reply.text, "UPDATED FILES");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_piped_times_out() {
        let err = run_piped("sleep", &["5".to_string()], b"", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_piped_reports_failure() {
        let err = run_piped(
            "sh",
            &["-c".to_string(), "echo refused >&2; exit 7".to_string()],
            b"",
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
        match err {
            TransportError::CommandFailed { stderr, .. } => assert_eq!(stderr, "refused"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_piped(
            "definitely-not-a-real-binary-7f3a",
            &[],
            b"",
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }
}
