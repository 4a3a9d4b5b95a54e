//! Debian family scanner (debian, ubuntu, raspbian)
//!
//! Inventory comes from `dpkg-query`, candidate updates from
//! `apt list --upgradable`. In fast mode the package lists are refreshed into a
//! private scratch directory so the target's own apt state is never touched.

use crate::exec::RemoteExecutor;
use crate::scanner::{
    require_commands, OsScanner, ParsedInventory, RawInventory, ScanOptions, ScratchDir,
};
use patchscan_core::{compare_versions, Error, Package, Packages, Result, SrcPackage};
use tracing::{debug, warn};

/// Families handled by this scanner
pub const FAMILIES: &[&str] = &["debian", "ubuntu", "raspbian"];

const DPKG_QUERY: &str =
    r"dpkg-query -W -f='${binary:Package},${db:Status-Abbrev},${Version},${Source},${source:Version}\n'";

const KERNEL_PREFIX: &str = "linux-image-";

pub struct DebianScanner {
    options: ScanOptions,
    scratch: ScratchDir,
}

impl DebianScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            scratch: ScratchDir::new(),
        }
    }

    /// apt options pointing lists and caches at the scratch directory
    fn apt_options(&self) -> String {
        match self.scratch.path() {
            Some(dir) => format!(
                " -o Dir::State::Lists='{0}/lists' -o Dir::Cache='{0}/cache' -o Debug::NoLocking=true",
                dir
            ),
            None => String::new(),
        }
    }

    fn prepare_failed(&self, what: &str, stderr: &str) -> Error {
        Error::PrepareFailed {
            target: self.options.target.clone(),
            message: format!("{}: {}", what, stderr.trim()),
        }
    }
}

#[async_trait::async_trait]
impl OsScanner for DebianScanner {
    fn options(&self) -> &ScanOptions {
        &self.options
    }

    async fn check_dependencies(&self, exec: &dyn RemoteExecutor) -> Result<()> {
        if self.options.mode.is_offline() {
            require_commands(exec, &self.options.target, &["dpkg-query"]).await
        } else {
            require_commands(exec, &self.options.target, &["dpkg-query", "apt-get"]).await
        }
    }

    async fn prepare(&mut self, exec: &dyn RemoteExecutor) -> Result<()> {
        let mode = self.options.mode;
        if mode.is_offline() {
            return Ok(());
        }

        if mode.needs_privilege() {
            let out = exec.run("sudo -n apt-get update -qq").await?;
            if !out.success() {
                return Err(self.prepare_failed("apt-get update", &out.stderr));
            }
            return Ok(());
        }

        let dir = self.scratch.ensure(exec, &self.options.target).await?;
        let out = exec
            .run(&format!(
                "mkdir -p '{0}/lists/partial' '{0}/cache/archives/partial'",
                dir
            ))
            .await?;
        if !out.success() {
            return Err(self.prepare_failed("mkdir", &out.stderr));
        }

        let out = exec
            .run(&format!("apt-get update -qq{}", self.apt_options()))
            .await?;
        if !out.success() {
            return Err(self.prepare_failed("apt-get update", &out.stderr));
        }
        Ok(())
    }

    async fn collect_inventory(&self, exec: &dyn RemoteExecutor) -> Result<RawInventory> {
        let listing = exec.run(DPKG_QUERY).await?;
        if !listing.success() {
            warn!(
                "dpkg-query exited with {}: {}",
                listing.exit_status,
                listing.stderr.trim()
            );
        }

        let updatable = if self.options.mode.is_offline() {
            String::new()
        } else {
            let out = exec
                .run(&format!("apt list --upgradable{}", self.apt_options()))
                .await?;
            if !out.success() {
                warn!("apt list exited with {}: {}", out.exit_status, out.stderr.trim());
            }
            out.stdout
        };

        Ok(RawInventory {
            packages: listing.stdout,
            updatable,
        })
    }

    fn parse_inventory(&self, raw: &RawInventory) -> ParsedInventory {
        let mut inventory = ParsedInventory::default();
        parse_dpkg_listing(&raw.packages, &mut inventory);
        parse_upgradable(&raw.updatable, &mut inventory);
        inventory
    }

    fn latest_kernel_release(&self, packages: &Packages) -> Option<String> {
        packages
            .names()
            .filter_map(|name| name.strip_prefix(KERNEL_PREFIX))
            .filter(|release| release.starts_with(|c: char| c.is_ascii_digit()))
            .max_by(|a, b| compare_versions(a, b))
            .map(String::from)
    }

    async fn cleanup(&mut self, exec: &dyn RemoteExecutor) -> Result<()> {
        self.scratch.remove(exec, &self.options.target).await
    }
}

/// Parse `dpkg-query` output, keeping installed packages only
fn parse_dpkg_listing(text: &str, inventory: &mut ParsedInventory) {
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.splitn(5, ',').collect();
        if fields.len() < 5 {
            inventory.warn(line_no, line, "expected 5 comma-separated fields");
            continue;
        }

        let binary = fields[0].trim();
        let status = fields[1];
        let version = fields[2].trim();

        // Second letter is the current state, `i` for installed
        if status.chars().nth(1) != Some('i') {
            continue;
        }
        if binary.is_empty() || version.is_empty() {
            inventory.warn(line_no, line, "missing package name or version");
            continue;
        }

        let (name, arch) = binary.split_once(':').unwrap_or((binary, ""));
        let (src_name, src_version) = parse_source(fields[3], fields[4], name, version);

        inventory.packages.upsert(
            Package::new(name, version)
                .with_arch(arch)
                .with_source(src_name),
        );
        inventory
            .src_packages
            .upsert(SrcPackage::new(src_name, src_version).with_binary(name));
    }
}

/// Resolve the source package of a binary
///
/// `${Source}` is empty when it equals the binary name and may carry its own
/// version as `name (version)`.
fn parse_source<'a>(
    source: &'a str,
    source_version: &'a str,
    name: &'a str,
    version: &'a str,
) -> (&'a str, &'a str) {
    let source = source.trim();
    let source_version = source_version.trim();

    if let Some((src_name, rest)) = source.split_once(' ') {
        let inner = rest.trim().trim_start_matches('(').trim_end_matches(')');
        if !inner.is_empty() {
            return (src_name, inner);
        }
        return (src_name, version);
    }

    let src_name = if source.is_empty() { name } else { source };
    let src_version = if source_version.is_empty() {
        version
    } else {
        source_version
    };
    (src_name, src_version)
}

/// Parse `apt list --upgradable`: `name/suite version arch [upgradable from: old]`
fn parse_upgradable(text: &str, inventory: &mut ParsedInventory) {
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Listing") || line.starts_with("WARNING") {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let name = match tokens.first().and_then(|t| t.split_once('/')) {
            Some((name, _suite)) if tokens.len() >= 2 => name,
            _ => {
                inventory.warn(idx + 1, line, "unrecognized apt list line");
                continue;
            }
        };

        if !inventory.packages.set_new_version(name, tokens[1], "") {
            debug!("Upgradable package {} is not installed, skipping", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;
    use patchscan_core::ScanMode;

    const LISTING: &str = "\
openssl,ii ,1.1.1n-0+deb11u5,,
libssl1.1:amd64,ii ,1.1.1n-0+deb11u5,openssl,1.1.1n-0+deb11u5
libc6:amd64,ii ,2.31-13+deb11u5,glibc,2.31-13+deb11u5
libc-bin,ii ,2.31-13+deb11u5,glibc (2.31-13+deb11u5),
old-tool,rc ,1.0-1,,
linux-image-5.10.0-21-amd64,ii ,5.10.162-1,linux-signed-amd64 (5.10.162+1),
linux-image-5.10.0-23-amd64,ii ,5.10.179-1,linux-signed-amd64 (5.10.179+1),
linux-image-amd64,ii ,5.10.179-1,linux-signed-amd64 (5.10.179+1),
garbage line without commas
";

    const UPGRADABLE: &str = "\
Listing...
openssl/stable-security 1.1.1w-0+deb11u1 amd64 [upgradable from: 1.1.1n-0+deb11u5]
libc6/stable 2.31-13+deb11u7 amd64 [upgradable from: 2.31-13+deb11u5]
nginx/stable 1.18.0-6.1+deb11u3 amd64 [upgradable from: 1.18.0-6.1]
";

    fn scanner(mode: ScanMode) -> DebianScanner {
        DebianScanner::new(ScanOptions::new("web01", "debian", mode))
    }

    fn parse(listing: &str, upgradable: &str) -> ParsedInventory {
        scanner(ScanMode::Fast).parse_inventory(&RawInventory {
            packages: listing.to_string(),
            updatable: upgradable.to_string(),
        })
    }

    #[test]
    fn test_parse_dpkg_listing() {
        let inv = parse(LISTING, "");

        assert_eq!(inv.packages.len(), 7);
        assert!(!inv.packages.contains("old-tool"));

        let libssl = inv.packages.get("libssl1.1").unwrap();
        assert_eq!(libssl.arch, "amd64");
        assert_eq!(libssl.source_name.as_deref(), Some("openssl"));

        let openssl = inv.src_packages.get("openssl").unwrap();
        assert!(openssl.binary_names.contains("openssl"));
        assert!(openssl.binary_names.contains("libssl1.1"));

        let glibc = inv.src_packages.get("glibc").unwrap();
        assert_eq!(glibc.version, "2.31-13+deb11u5");
        assert_eq!(glibc.binary_names.len(), 2);

        let signed = inv.src_packages.get("linux-signed-amd64").unwrap();
        assert_eq!(signed.version, "5.10.162+1");

        assert_eq!(inv.warnings.len(), 1);
        assert_eq!(inv.warnings[0].code(), "PARSE_WARNING");
        assert!(inv.warnings[0].to_string().contains("line 9"));
    }

    #[test]
    fn test_parse_upgradable() {
        let inv = parse(LISTING, UPGRADABLE);

        let openssl = inv.packages.get("openssl").unwrap();
        assert_eq!(openssl.new_version, "1.1.1w-0+deb11u1");
        assert!(inv.packages.get("libc6").unwrap().is_updatable());
        // nginx is not installed
        assert!(!inv.packages.contains("nginx"));
        assert_eq!(inv.packages.updatable_count(), 2);
    }

    #[test]
    fn test_unrecognized_input_yields_empty_inventory() {
        let inv = parse("", "");
        assert!(inv.packages.is_empty());
        assert!(inv.src_packages.is_empty());
        assert!(inv.warnings.is_empty());
    }

    #[test]
    fn test_latest_kernel_release() {
        let inv = parse(LISTING, "");
        let latest = scanner(ScanMode::Fast).latest_kernel_release(&inv.packages);
        assert_eq!(latest.as_deref(), Some("5.10.0-23-amd64"));
    }

    #[tokio::test]
    async fn test_running_kernel_reboot_required() {
        let inv = parse(LISTING, "");
        let exec = ScriptedExecutor::new()
            .on("uname -r", "5.10.0-21-amd64\n", 0)
            .on("uname -v", "#1 SMP Debian 5.10.162-1 (2023-01-21)\n", 0);

        let kernel = scanner(ScanMode::Fast)
            .running_kernel(&exec, &inv.packages)
            .await
            .unwrap();
        assert_eq!(kernel.release, "5.10.0-21-amd64");
        assert!(kernel.reboot_required);
    }

    #[tokio::test]
    async fn test_fast_prepare_uses_scratch_lists() {
        let exec = ScriptedExecutor::new()
            .on("mktemp", "/tmp/patchscan.q1w2e3r4\n", 0)
            .on("mkdir -p", "", 0)
            .on("apt-get update", "", 0)
            .on("dpkg-query", LISTING, 0)
            .on("apt list --upgradable", UPGRADABLE, 0)
            .on("rm -rf", "", 0);
        let mut scanner = scanner(ScanMode::Fast);

        scanner.prepare(&exec).await.unwrap();
        scanner.prepare(&exec).await.unwrap();
        let raw = scanner.collect_inventory(&exec).await.unwrap();
        scanner.cleanup(&exec).await.unwrap();

        assert!(raw.updatable.contains("openssl/stable-security"));
        let calls = exec.calls();
        assert_eq!(calls.iter().filter(|c| c.contains("mktemp")).count(), 1);
        let lists = "-o Dir::State::Lists='/tmp/patchscan.q1w2e3r4/lists'";
        assert!(calls
            .iter()
            .any(|c| c.starts_with("apt list --upgradable") && c.contains(lists)));
        assert!(exec.called("rm -rf '/tmp/patchscan.q1w2e3r4'"));
        assert!(!exec.called("sudo"));
    }

    #[tokio::test]
    async fn test_prepare_failure_is_not_fatal() {
        let exec = ScriptedExecutor::new()
            .on("mktemp", "/tmp/patchscan.q1w2e3r4\n", 0)
            .on("mkdir -p", "", 0)
            .on_stderr("apt-get update", "E: network unreachable", 100);

        let err = scanner(ScanMode::Fast).prepare(&exec).await.unwrap_err();
        assert_eq!(err.code(), "PREPARE_FAILED");
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_offline_mode_skips_apt() {
        let exec = ScriptedExecutor::new()
            .on("command -v dpkg-query", "/usr/bin/dpkg-query\n", 0)
            .on("dpkg-query", LISTING, 0);
        let mut scanner = scanner(ScanMode::Offline);

        scanner.check_dependencies(&exec).await.unwrap();
        scanner.prepare(&exec).await.unwrap();
        let raw = scanner.collect_inventory(&exec).await.unwrap();
        scanner.cleanup(&exec).await.unwrap();

        assert!(raw.updatable.is_empty());
        assert!(!exec.called("apt"));
        assert!(!exec.called("mktemp"));
    }
}
