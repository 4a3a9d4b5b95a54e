//! Command execution on scan targets

use patchscan_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Captured output of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_status,
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs shell commands on a target
///
/// Implementations report channel failures (connection lost, timeout) as
/// `Error::Transport` or `Error::CommandTimeout`. A command that ran and exited
/// non-zero is not an error; callers inspect `exit_status`.
#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<ExecOutput>;
}

/// Executes commands on the local machine through `sh -c` (agent mode)
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, command: &str) -> Result<ExecOutput> {
        trace!("exec: {}", command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn `{}`: {}", command, e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Transport(format!("`{}` failed: {}", command, e)));
            }
            Err(_) => {
                return Err(Error::CommandTimeout {
                    command: command.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal
            exit_status: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    enum Reply {
        Output(ExecOutput),
        Transport(String),
    }

    /// Executor answering from canned replies, matched by command substring
    ///
    /// Rules are checked in insertion order. Unmatched commands exit 127.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        rules: Vec<(String, Reply)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, needle: &str, stdout: &str, exit_status: i32) -> Self {
            self.rules.push((
                needle.to_string(),
                Reply::Output(ExecOutput::new(stdout, exit_status)),
            ));
            self
        }

        pub fn on_stderr(mut self, needle: &str, stderr: &str, exit_status: i32) -> Self {
            self.rules.push((
                needle.to_string(),
                Reply::Output(ExecOutput::new("", exit_status).with_stderr(stderr)),
            ));
            self
        }

        pub fn fail(mut self, needle: &str, message: &str) -> Self {
            self.rules
                .push((needle.to_string(), Reply::Transport(message.to_string())));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn called(&self, needle: &str) -> bool {
            self.calls().iter().any(|c| c.contains(needle))
        }
    }

    #[async_trait::async_trait]
    impl RemoteExecutor for ScriptedExecutor {
        async fn run(&self, command: &str) -> Result<ExecOutput> {
            self.calls.lock().unwrap().push(command.to_string());
            for (needle, reply) in &self.rules {
                if command.contains(needle.as_str()) {
                    return match reply {
                        Reply::Output(out) => Ok(out.clone()),
                        Reply::Transport(msg) => Err(Error::Transport(msg.clone())),
                    };
                }
            }
            Ok(ExecOutput::new("", 127).with_stderr("command not found"))
        }
    }
}
