//! Transport over the system OpenSSH client.
//!
//! Each [`CommandExecutor::execute`] call spawns one `ssh` process. Key
//! authentication runs in batch mode; password authentication goes through
//! `sshpass -e` so the password never appears on a command line.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use serde::{Deserialize, Serialize};

use super::{CommandExecutor, ExecError};

/// OpenSSH reserves this status for its own failures (connect, auth, protocol)
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// How the transport authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Key,
    Password,
}

/// Resolved connection parameters for one host
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    pub key_file: Option<PathBuf>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl SshSettings {
    /// Build the argument vector passed to `ssh`, ending with the remote command
    fn ssh_args(&self, command: &str) -> Vec<String> {
        let connect_timeout = self.timeout.as_secs().max(1);
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_timeout),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];

        match self.auth_type {
            AuthType::Key => {
                args.push("-o".to_string());
                args.push("BatchMode=yes".to_string());
                if let Some(key) = &self.key_file {
                    args.push("-i".to_string());
                    args.push(key.display().to_string());
                }
            }
            AuthType::Password => {
                args.push("-o".to_string());
                args.push("PubkeyAuthentication=no".to_string());
            }
        }

        args.push(format!("{}@{}", self.username, self.hostname));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// [`CommandExecutor`] backed by the `ssh` binary
#[derive(Debug, Clone)]
pub struct SshExecutor {
    settings: SshSettings,
    /// Upper bound for a single remote command, connection included
    command_timeout: Duration,
}

impl SshExecutor {
    pub fn new(settings: SshSettings) -> Self {
        // Remote probes are short; give each command a few connect budgets.
        let command_timeout = settings.timeout.saturating_mul(3);
        Self { settings, command_timeout }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn build_command(&self, remote: &str) -> Result<Command, ExecError> {
        let mut cmd = match self.settings.auth_type {
            AuthType::Key => Command::new("ssh"),
            AuthType::Password => {
                let password = self.settings.password.as_ref().ok_or_else(|| ExecError::Connection {
                    host: self.settings.hostname.clone(),
                    reason: "password authentication requires a password".to_string(),
                })?;
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").env("SSHPASS", password);
                cmd
            }
        };

        cmd.args(self.settings.ssh_args(remote))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn execute(&self, command: &str) -> Result<String, ExecError> {
        debug!("Executing on {}: {}", self.settings.hostname, command);

        let mut cmd = self.build_command(command)?;
        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| ExecError::Timeout {
                host: self.settings.hostname.clone(),
                seconds: self.command_timeout.as_secs(),
            })?
            .map_err(|e| ExecError::Connection {
                host: self.settings.hostname.clone(),
                reason: format!("failed to spawn ssh: {}", e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        match output.status.code() {
            Some(0) => Ok(stdout),
            Some(SSH_TRANSPORT_FAILURE) => Err(ExecError::Connection {
                host: self.settings.hostname.clone(),
                reason: if stderr.is_empty() { "ssh exited with status 255".to_string() } else { stderr },
            }),
            Some(code) => {
                debug!("Command on {} returned {}: {}", self.settings.hostname, code, stderr);
                Err(ExecError::CommandFailed { exit_code: code, stderr })
            }
            None => Err(ExecError::Connection {
                host: self.settings.hostname.clone(),
                reason: "ssh terminated by signal".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(auth_type: AuthType) -> SshSettings {
        SshSettings {
            hostname: "10.0.0.5".to_string(),
            port: 2222,
            username: "lab".to_string(),
            auth_type,
            key_file: Some(PathBuf::from("/keys/id_ed25519")),
            password: None,
            timeout: Duration::from_secs(7),
        }
    }

    #[test]
    fn test_key_auth_args() {
        let args = settings(AuthType::Key).ssh_args("ip -o link show");

        assert!(args.contains(&"ConnectTimeout=7".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/keys/id_ed25519"));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().map(String::as_str), Some("ip -o link show"));
        assert!(args.contains(&"lab@10.0.0.5".to_string()));
    }

    #[test]
    fn test_password_auth_args() {
        let args = settings(AuthType::Password).ssh_args("hostname");

        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"PubkeyAuthentication=no".to_string()));
        assert!(!args.contains(&"-i".to_string()));
    }

    #[test]
    fn test_password_auth_without_password_is_connection_error() {
        let executor = SshExecutor::new(settings(AuthType::Password));
        let err = executor.build_command("true").err();
        assert!(matches!(err, Some(ExecError::Connection { .. })));
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/lab");
        assert_eq!(expand_home("~/.ssh/id_rsa"), PathBuf::from("/home/lab/.ssh/id_rsa"));
        assert_eq!(expand_home("/etc/key"), PathBuf::from("/etc/key"));
    }
}
