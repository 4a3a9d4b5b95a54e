//! The OS scanner capability set and helpers shared by its variants

use crate::exec::RemoteExecutor;
use patchscan_core::{Error, Kernel, Packages, Result, ScanMode, SrcPackages};
use tracing::debug;

/// Per-target settings handed to a scanner variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Display name of the target (`server` or `container@server`)
    pub target: String,
    /// Lower-cased OS family
    pub family: String,
    pub mode: ScanMode,
}

impl ScanOptions {
    pub fn new(target: impl Into<String>, family: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            target: target.into(),
            family: family.into().to_ascii_lowercase(),
            mode,
        }
    }
}

/// Raw package-manager output as returned by the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawInventory {
    /// Installed package listing
    pub packages: String,
    /// Candidate update listing, empty when not collected
    pub updatable: String,
}

/// Structured inventory plus the lines that could not be understood
#[derive(Debug, Default)]
pub struct ParsedInventory {
    pub packages: Packages,
    pub src_packages: SrcPackages,
    /// `Error::ParseWarning` per skipped line
    pub warnings: Vec<Error>,
}

impl ParsedInventory {
    pub fn warn(&mut self, line_no: usize, line: &str, message: impl Into<String>) {
        self.warnings.push(Error::ParseWarning {
            line_no,
            line: line.to_string(),
            message: message.into(),
        });
    }
}

/// Operations an OS family must provide to be scanned
///
/// The pipeline calls the stages in declaration order. `parse_inventory` is
/// pure and must never fail; unparseable lines go to `warnings`.
#[async_trait::async_trait]
pub trait OsScanner: Send + Sync {
    fn options(&self) -> &ScanOptions;

    fn family(&self) -> &str {
        &self.options().family
    }

    /// Verify the tools this family needs exist on the target
    async fn check_dependencies(&self, exec: &dyn RemoteExecutor) -> Result<()>;

    /// Verify `sudo` works without a password when the mode needs root
    async fn check_privilege_escalation(&self, exec: &dyn RemoteExecutor) -> Result<()> {
        let options = self.options();
        if !options.mode.needs_privilege() {
            return Ok(());
        }

        let out = exec.run("sudo -n true").await?;
        if out.success() {
            return Ok(());
        }

        let stderr = out.stderr.trim();
        Err(Error::PrivilegeError {
            target: options.target.clone(),
            message: if stderr.is_empty() {
                String::from("sudo requires a password")
            } else {
                stderr.to_string()
            },
        })
    }

    /// Pre-scan normalization, safe to call more than once
    async fn prepare(&mut self, exec: &dyn RemoteExecutor) -> Result<()>;

    async fn collect_inventory(&self, exec: &dyn RemoteExecutor) -> Result<RawInventory>;

    fn parse_inventory(&self, raw: &RawInventory) -> ParsedInventory;

    /// Release of the newest installed kernel package, comparable to `uname -r`
    fn latest_kernel_release(&self, _packages: &Packages) -> Option<String> {
        None
    }

    async fn running_kernel(
        &self,
        exec: &dyn RemoteExecutor,
        packages: &Packages,
    ) -> Result<Kernel> {
        let release = exec.run("uname -r").await?.stdout.trim().to_string();
        let version = exec.run("uname -v").await?.stdout.trim().to_string();

        let reboot_required = match self.latest_kernel_release(packages) {
            Some(latest) if !release.is_empty() => latest != release,
            _ => false,
        };

        Ok(Kernel {
            release,
            version,
            reboot_required,
        })
    }

    /// Undo whatever `prepare` left behind
    async fn cleanup(&mut self, exec: &dyn RemoteExecutor) -> Result<()>;
}

/// Fail with `UnsupportedEnvironment` for the first missing command
pub async fn require_commands(
    exec: &dyn RemoteExecutor,
    target: &str,
    commands: &[&str],
) -> Result<()> {
    for cmd in commands {
        let out = exec.run(&format!("command -v {}", cmd)).await?;
        if !out.success() {
            return Err(Error::UnsupportedEnvironment {
                target: target.to_string(),
                message: format!("{} is not installed", cmd),
            });
        }
        debug!("{} found at {}", cmd, out.stdout.trim());
    }
    Ok(())
}

const SCRATCH_PREFIX: &str = "/tmp/patchscan.";

/// True for a single `/tmp/patchscan.<alphanumeric>` path
///
/// Such a path needs no escaping inside single quotes.
fn is_scratch_path(path: &str) -> bool {
    match path.strip_prefix(SCRATCH_PREFIX) {
        Some(suffix) => !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_alphanumeric()),
        None => false,
    }
}

/// A private temporary directory on the target
///
/// Created on first use, removed by `remove`. Only paths created here are
/// ever deleted.
#[derive(Debug, Default)]
pub struct ScratchDir {
    path: Option<String>,
}

impl ScratchDir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Create the directory unless it already exists, returning its path
    pub async fn ensure(&mut self, exec: &dyn RemoteExecutor, target: &str) -> Result<String> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }

        let out = exec
            .run(&format!("mktemp -d {}XXXXXXXX", SCRATCH_PREFIX))
            .await?;
        if !out.success() {
            return Err(Error::PrepareFailed {
                target: target.to_string(),
                message: format!("mktemp failed: {}", out.stderr.trim()),
            });
        }
        let path = out.stdout.trim();
        if !is_scratch_path(path) {
            return Err(Error::PrepareFailed {
                target: target.to_string(),
                message: format!("mktemp returned unexpected path {:?}", path),
            });
        }

        debug!("Created scratch directory {}", path);
        self.path = Some(path.to_string());
        Ok(path.to_string())
    }

    /// Delete the directory if one was created
    pub async fn remove(&mut self, exec: &dyn RemoteExecutor, target: &str) -> Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };

        if !is_scratch_path(&path) {
            return Err(Error::CleanupFailed {
                target: target.to_string(),
                message: format!("refusing to remove {:?}", path),
            });
        }

        let out = exec.run(&format!("rm -rf '{}'", path)).await?;
        if !out.success() {
            return Err(Error::CleanupFailed {
                target: target.to_string(),
                message: format!("could not remove {}: {}", path, out.stderr.trim()),
            });
        }
        debug!("Removed scratch directory {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;

    #[tokio::test]
    async fn test_require_commands() {
        let exec = ScriptedExecutor::new().on("command -v rpm", "/usr/bin/rpm\n", 0);

        assert!(require_commands(&exec, "db01", &["rpm"]).await.is_ok());

        let err = require_commands(&exec, "db01", &["rpm", "yum"])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_ENVIRONMENT");
        assert!(err.to_string().contains("yum"));
    }

    #[tokio::test]
    async fn test_scratch_dir_lifecycle() {
        let exec = ScriptedExecutor::new()
            .on("mktemp", "/tmp/patchscan.AbCd1234\n", 0)
            .on("rm -rf", "", 0);
        let mut dir = ScratchDir::new();

        let first = dir.ensure(&exec, "web01").await.unwrap();
        let second = dir.ensure(&exec, "web01").await.unwrap();
        assert_eq!(first, "/tmp/patchscan.AbCd1234");
        assert_eq!(first, second);

        dir.remove(&exec, "web01").await.unwrap();
        assert!(dir.path().is_none());
        // Nothing left to remove
        dir.remove(&exec, "web01").await.unwrap();

        let calls = exec.calls();
        assert_eq!(calls.iter().filter(|c| c.contains("mktemp")).count(), 1);
        assert_eq!(calls.iter().filter(|c| c.contains("rm -rf")).count(), 1);
        assert!(exec.called("rm -rf '/tmp/patchscan.AbCd1234'"));
    }

    #[tokio::test]
    async fn test_scratch_dir_rejects_unexpected_path() {
        for reply in [
            "/\n",
            "/tmp/patchscan.\n",
            "/tmp/patchscan.AbCd1234 /etc\n",
            "Welcome to web01\n/tmp/patchscan.AbCd1234\n",
            "/tmp/patchscan.AbCd1234;reboot\n",
        ] {
            let exec = ScriptedExecutor::new()
                .on("mktemp", reply, 0)
                .on("rm -rf", "", 0);
            let mut dir = ScratchDir::new();
            let err = dir.ensure(&exec, "web01").await.unwrap_err();
            assert_eq!(err.code(), "PREPARE_FAILED", "reply {:?}", reply);
            assert!(dir.path().is_none());

            dir.remove(&exec, "web01").await.unwrap();
            assert!(!exec.called("rm -rf"), "reply {:?}", reply);
        }
    }

    #[test]
    fn test_is_scratch_path() {
        assert!(is_scratch_path("/tmp/patchscan.q1w2e3r4"));
        assert!(!is_scratch_path("/tmp/patchscan."));
        assert!(!is_scratch_path("/tmp/patchscan.q1w2 /etc"));
        assert!(!is_scratch_path("/tmp/patchscan.q1w2/../../etc"));
        assert!(!is_scratch_path("/tmp/other.q1w2e3r4"));
    }
}
