//! SSH-backed guest
//!
//! Runs commands on a static, already provisioned machine over `ssh`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, Guest};
use crate::error::{Error, Result};

/// SSH connection configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// SSH username
    pub username: String,

    /// SSH private key path
    pub private_key_path: Option<PathBuf>,

    /// SSH port
    pub port: u16,

    /// Connection timeout in seconds
    pub timeout_secs: u64,

    /// Strict host key checking
    pub strict_host_key_checking: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            private_key_path: None,
            port: 22,
            timeout_secs: 30,
            strict_host_key_checking: false,
        }
    }
}

impl SshConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Guest reachable over SSH; does not support snapshots
#[derive(Clone, Debug)]
pub struct SshGuest {
    name: String,
    host: String,
    config: SshConfig,
}

impl SshGuest {
    pub fn new(name: impl Into<String>, host: impl Into<String>, config: SshConfig) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            config,
        }
    }

    fn build_ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.config.strict_host_key_checking {
                    "yes"
                } else {
                    "no"
                }
            ),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.timeout_secs),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-p".to_string(),
            self.config.port.to_string(),
        ];

        if let Some(ref key_path) = self.config.private_key_path {
            args.push("-i".to_string());
            args.push(key_path.to_string_lossy().to_string());
        }

        args.push(format!("{}@{}", self.config.username, self.host));
        args
    }

    fn ssh_command(&self, command: &str) -> Command {
        let mut ssh = Command::new("ssh");
        ssh.args(self.build_ssh_args()).arg(command);
        ssh
    }
}

#[async_trait]
impl Guest for SshGuest {
    fn name(&self) -> &str {
        &self.name
    }

    fn hostname(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.config.port
    }

    fn user(&self) -> &str {
        &self.config.username
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("Executing SSH command on {}: {}", self.host, command);

        let output = self
            .ssh_command(command)
            .output()
            .await
            .map_err(|e| Error::guest(&self.name, format!("failed to execute ssh: {e}")))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
