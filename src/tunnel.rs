//! Port-Forwarding Tunnel
//!
//! Opens an SSM port-forwarding session to an environment's database host
//! by spawning the AWS CLI. Credentials are injected as child environment
//! variables; nothing goes through a shell string. A failed launch is
//! classified from stderr so callers can show a remediation hint.

use crate::config::{EnvironmentConfig, TunnelConfig};
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

const REQUIRED_VARS: [&str; 3] = [ACCESS_KEY_VAR, SECRET_KEY_VAR, SESSION_TOKEN_VAR];

/// Categorized tunnel failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("Missing AWS credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    #[error("Tunnel tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Tunnel target not connected: {0}")]
    TargetNotConnected(String),

    #[error("Tunnel access denied: {0}")]
    Forbidden(String),

    #[error("Tunnel failed: {0}")]
    Failed(String),
}

impl TunnelError {
    pub fn code(&self) -> &'static str {
        match self {
            TunnelError::MissingCredentials(_) => "TUNNEL_MISSING_CREDENTIALS",
            TunnelError::ToolUnavailable(_) => "TUNNEL_TOOL_UNAVAILABLE",
            TunnelError::TargetNotConnected(_) => "TUNNEL_TARGET_NOT_CONNECTED",
            TunnelError::Forbidden(_) => "TUNNEL_FORBIDDEN",
            TunnelError::Failed(_) => "TUNNEL_FAILED",
        }
    }

    /// User-facing guidance for the category
    pub fn remediation(&self) -> &'static str {
        match self {
            TunnelError::MissingCredentials(_) => {
                "Paste the export lines for AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY and AWS_SESSION_TOKEN into POST /api/credentials, then connect again."
            }
            TunnelError::ToolUnavailable(_) => {
                "Install the AWS CLI and the Session Manager plugin on the host running this service, or disable the tunnel to connect directly."
            }
            TunnelError::TargetNotConnected(_) => {
                "The bastion instance is not registered with SSM. Check that it is running and its SSM agent is online."
            }
            TunnelError::Forbidden(_) => {
                "The credentials were rejected. Refresh the session token or check the ssm:StartSession permission."
            }
            TunnelError::Failed(_) => "Check the tunnel output and try running locally for full functionality.",
        }
    }

    /// Classify the stderr of an exited tunnel process
    pub fn classify(stderr: &str) -> Self {
        let text = stderr.trim().to_string();
        if text.contains("aws: not found") || text.contains("SessionManagerPlugin is not found") {
            TunnelError::ToolUnavailable(text)
        } else if text.contains("TargetNotConnected") {
            TunnelError::TargetNotConnected(text)
        } else if text.contains("403") || text.contains("Forbidden") || text.contains("AccessDenied") {
            TunnelError::Forbidden(text)
        } else {
            TunnelError::Failed(text)
        }
    }
}

/// Session credentials for the AWS CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

/// Result of parsing pasted `export` lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedExports {
    /// Every key that was set, in input order
    pub keys_set: Vec<String>,
    #[serde(skip)]
    pub credentials: Option<AwsCredentials>,
    /// Required keys that were not present
    pub missing: Vec<String>,
}

impl AwsCredentials {
    fn from_lookup<F>(lookup: F) -> Result<Self, Vec<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: Vec<Option<String>> = REQUIRED_VARS
            .iter()
            .map(|k| lookup(k).filter(|v| !v.is_empty()))
            .collect();
        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.to_string())
            .collect();
        match (&values[0], &values[1], &values[2]) {
            (Some(a), Some(s), Some(t)) => Ok(Self {
                access_key_id: a.clone(),
                secret_access_key: s.clone(),
                session_token: t.clone(),
            }),
            _ => Err(missing),
        }
    }

    /// Parse `export KEY="VALUE"` lines. Non-export lines are ignored and
    /// surrounding quotes are stripped from values.
    pub fn parse_exports(text: &str) -> ParsedExports {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            let Some(rest) = line.trim().strip_prefix("export ") else {
                continue;
            };
            let Some((key, value)) = rest.split_once('=') else {
                continue;
            };
            let key = key.trim().to_string();
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
        }

        let lookup = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let (credentials, missing) = match Self::from_lookup(lookup) {
            Ok(creds) => (Some(creds), Vec::new()),
            Err(missing) => (None, missing),
        };

        ParsedExports {
            keys_set: pairs.into_iter().map(|(k, _)| k).collect(),
            credentials,
            missing,
        }
    }

    /// Read the three variables from the process environment
    pub fn from_env() -> Result<Self, TunnelError> {
        Self::from_lookup(|k| std::env::var(k).ok()).map_err(TunnelError::MissingCredentials)
    }

    /// Access key prefix safe for logs
    pub fn masked_key(&self) -> String {
        let prefix: String = self.access_key_id.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

/// A running tunnel; the child process is killed when this is dropped
#[derive(Debug)]
pub struct TunnelHandle {
    child: Child,
    pub local_port: u16,
}

impl TunnelHandle {
    pub(crate) fn new(child: Child, local_port: u16) -> Self {
        Self { child, local_port }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// True while the forwarding process is alive
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub async fn close(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Tunnel process already gone: {}", e);
        }
    }
}

/// Spawns tunnel processes from the `[tunnel]` settings
#[derive(Debug, Clone)]
pub struct TunnelLauncher {
    config: TunnelConfig,
}

impl TunnelLauncher {
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// CLI arguments for one environment
    pub fn command_args(&self, env: &EnvironmentConfig) -> Vec<String> {
        let parameters = serde_json::json!({
            "host": [env.host],
            "portNumber": [env.remote_port.to_string()],
            "localPortNumber": [env.local_port.to_string()],
        });
        vec![
            "ssm".to_string(),
            "start-session".to_string(),
            "--target".to_string(),
            env.target.clone(),
            "--document-name".to_string(),
            self.config.document_name.clone(),
            "--parameters".to_string(),
            parameters.to_string(),
            "--region".to_string(),
            env.region.clone(),
        ]
    }

    /// Spawn the tunnel and wait for it to settle. Success means the process
    /// is still running after the startup wait.
    pub async fn open(&self, env: &EnvironmentConfig, creds: &AwsCredentials) -> Result<TunnelHandle, TunnelError> {
        info!(
            "Opening tunnel to {} via {} (local port {}, key {})",
            env.host,
            env.target,
            env.local_port,
            creds.masked_key()
        );

        let mut child = Command::new(&self.config.aws_binary)
            .args(self.command_args(env))
            .env(ACCESS_KEY_VAR, &creds.access_key_id)
            .env(SECRET_KEY_VAR, &creds.secret_access_key)
            .env(SESSION_TOKEN_VAR, &creds.session_token)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TunnelError::ToolUnavailable(format!("{}: not found", self.config.aws_binary))
                } else {
                    TunnelError::Failed(e.to_string())
                }
            })?;

        tokio::time::sleep(Duration::from_secs(self.config.startup_wait_secs)).await;

        match child.try_wait() {
            Ok(None) => {
                info!("Tunnel established on local port {}", env.local_port);
                Ok(TunnelHandle::new(child, env.local_port))
            }
            Ok(Some(status)) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                if stderr.trim().is_empty() {
                    stderr = format!("tunnel process exited with {}", status);
                }
                let err = TunnelError::classify(&stderr);
                warn!("Tunnel to {} failed: {}", env.host, err);
                Err(err)
            }
            Err(e) => Err(TunnelError::Failed(e.to_string())),
        }
    }
}
