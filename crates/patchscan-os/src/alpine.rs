//! Alpine Linux scanner

use crate::exec::RemoteExecutor;
use crate::scanner::{require_commands, OsScanner, ParsedInventory, RawInventory, ScanOptions};
use patchscan_core::{Error, Package, Result};
use tracing::{debug, warn};

pub const FAMILIES: &[&str] = &["alpine"];

pub struct AlpineScanner {
    options: ScanOptions,
}

impl AlpineScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }
}

#[async_trait::async_trait]
impl OsScanner for AlpineScanner {
    fn options(&self) -> &ScanOptions {
        &self.options
    }

    async fn check_dependencies(&self, exec: &dyn RemoteExecutor) -> Result<()> {
        require_commands(exec, &self.options.target, &["apk"]).await
    }

    async fn prepare(&mut self, exec: &dyn RemoteExecutor) -> Result<()> {
        // apk keeps one index cache; only root may refresh it
        if !self.options.mode.needs_privilege() {
            return Ok(());
        }
        let out = exec.run("sudo -n apk update -q").await?;
        if !out.success() {
            return Err(Error::PrepareFailed {
                target: self.options.target.clone(),
                message: format!("apk update: {}", out.stderr.trim()),
            });
        }
        Ok(())
    }

    async fn collect_inventory(&self, exec: &dyn RemoteExecutor) -> Result<RawInventory> {
        let listing = exec.run("apk info -v").await?;
        if !listing.success() {
            warn!("apk info exited with {}", listing.exit_status);
        }

        let updatable = if self.options.mode.is_offline() {
            String::new()
        } else {
            exec.run("apk version -l '<'").await?.stdout
        };

        Ok(RawInventory {
            packages: listing.stdout,
            updatable,
        })
    }

    fn parse_inventory(&self, raw: &RawInventory) -> ParsedInventory {
        let mut inventory = ParsedInventory::default();

        for (idx, line) in raw.packages.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match split_name_version(line) {
                Some((name, version)) => inventory.packages.upsert(Package::new(name, version)),
                None => inventory.warn(idx + 1, line, "expected name-version-rN"),
            }
        }

        for (idx, line) in raw.updatable.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("Installed:") {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 || tokens[1] != "<" {
                inventory.warn(idx + 1, line, "expected name-version-rN < version");
                continue;
            }
            let Some((name, _)) = split_name_version(tokens[0]) else {
                inventory.warn(idx + 1, line, "expected name-version-rN");
                continue;
            };
            if !inventory.packages.set_new_version(name, tokens[2], "") {
                debug!("Update for {} does not match an installed package", name);
            }
        }

        inventory
    }

    async fn cleanup(&mut self, _exec: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }
}

/// Split `name-version-rN` into `(name, version-rN)`
fn split_name_version(s: &str) -> Option<(&str, &str)> {
    let (rest, pkgrel) = s.rsplit_once('-')?;
    let digits = pkgrel.strip_prefix('r')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (name, _) = rest.rsplit_once('-')?;
    let version = &s[name.len() + 1..];
    if name.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;
    use patchscan_core::ScanMode;

    const INFO: &str = "\
WARNING: opening /lib/apk/db: No such file or directory
musl-1.2.4-r1
busybox-1.36.1-r2
libcrypto3-3.1.2-r0
py3-setuptools-68.0.0-r0
";

    const VERSIONS: &str = "\
Installed:                                Available:
musl-1.2.4-r1                           < 1.2.4-r2
libcrypto3-3.1.2-r0                     < 3.1.4-r1
";

    fn scanner(mode: ScanMode) -> AlpineScanner {
        AlpineScanner::new(ScanOptions::new("app@docker01", "alpine", mode))
    }

    #[test]
    fn test_split_name_version() {
        assert_eq!(split_name_version("musl-1.2.4-r1"), Some(("musl", "1.2.4-r1")));
        assert_eq!(
            split_name_version("py3-setuptools-68.0.0-r0"),
            Some(("py3-setuptools", "68.0.0-r0"))
        );
        assert_eq!(split_name_version("musl-1.2.4"), None);
        assert_eq!(split_name_version("r1"), None);
    }

    #[test]
    fn test_parse_inventory() {
        let inv = scanner(ScanMode::Fast).parse_inventory(&RawInventory {
            packages: INFO.to_string(),
            updatable: VERSIONS.to_string(),
        });

        assert_eq!(inv.packages.len(), 4);
        assert_eq!(inv.warnings.len(), 1);
        assert_eq!(inv.packages.get("musl").unwrap().new_version, "1.2.4-r2");
        assert_eq!(inv.packages.get("busybox").unwrap().version, "1.36.1-r2");
        assert_eq!(inv.packages.updatable_count(), 2);
        assert!(inv.src_packages.is_empty());
    }

    #[test]
    fn test_malformed_version_lines_are_warned() {
        let versions = format!(
            "{}busybox-1.36.1                          < 1.36.1-r5\nfetch failed\n\n",
            VERSIONS
        );
        let inv = scanner(ScanMode::Fast).parse_inventory(&RawInventory {
            packages: INFO.to_string(),
            updatable: versions,
        });

        // One from the installed list, two from the version list, none for the header
        assert_eq!(inv.warnings.len(), 3);
        assert!(inv
            .warnings
            .iter()
            .all(|w| !w.to_string().contains("Installed:")));
        assert!(inv.warnings.iter().any(|w| w.to_string().contains("fetch failed")));
        assert_eq!(inv.packages.updatable_count(), 2);
        assert!(!inv.packages.get("busybox").unwrap().is_updatable());
    }

    #[tokio::test]
    async fn test_fast_mode_runs_no_refresh() {
        let exec = ScriptedExecutor::new()
            .on("apk info -v", INFO, 0)
            .on("apk version", VERSIONS, 0)
            .on("uname -r", "6.1.55-0-lts\n", 0)
            .on("uname -v", "#1-Alpine SMP PREEMPT_DYNAMIC\n", 0);
        let mut scanner = scanner(ScanMode::Fast);

        scanner.prepare(&exec).await.unwrap();
        let raw = scanner.collect_inventory(&exec).await.unwrap();
        let kernel = scanner.running_kernel(&exec, &Default::default()).await.unwrap();
        scanner.cleanup(&exec).await.unwrap();

        assert_eq!(raw.updatable, VERSIONS);
        // linux-lts-6.1.55-r0 does not name the uname release
        assert_eq!(kernel.release, "6.1.55-0-lts");
        assert!(!kernel.reboot_required);
        assert!(!exec.called("sudo"));
    }

    #[tokio::test]
    async fn test_privileged_refresh_failure() {
        let exec = ScriptedExecutor::new().on_stderr("apk update", "ERROR: unable to lock", 1);
        let err = scanner(ScanMode::FastRoot).prepare(&exec).await.unwrap_err();
        assert_eq!(err.code(), "PREPARE_FAILED");
    }
}
