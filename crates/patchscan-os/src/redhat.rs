//! RedHat family scanner (redhat, centos, rocky, alma, oracle, fedora, amazon)

use crate::exec::RemoteExecutor;
use crate::scanner::{
    require_commands, OsScanner, ParsedInventory, RawInventory, ScanOptions, ScratchDir,
};
use patchscan_core::{compare_versions, Error, Package, Packages, Result, SrcPackage};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Families handled by this scanner
pub const FAMILIES: &[&str] = &[
    "redhat", "centos", "rocky", "alma", "oracle", "fedora", "amazon",
];

const RPM_QUERY: &str =
    r#"rpm -qa --queryformat "%{NAME} %{EPOCHNUM} %{VERSION} %{RELEASE} %{ARCH} %{SOURCERPM}\n""#;

/// `yum check-update` exit status when updates are available
const UPDATES_AVAILABLE: i32 = 100;

pub struct RedHatScanner {
    options: ScanOptions,
    scratch: ScratchDir,
}

impl RedHatScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            scratch: ScratchDir::new(),
        }
    }

    fn check_update_command(&self) -> String {
        match self.scratch.path() {
            Some(dir) => format!("yum -q check-update --setopt=cachedir='{}'", dir),
            None => String::from("yum -q check-update"),
        }
    }
}

#[async_trait::async_trait]
impl OsScanner for RedHatScanner {
    fn options(&self) -> &ScanOptions {
        &self.options
    }

    async fn check_dependencies(&self, exec: &dyn RemoteExecutor) -> Result<()> {
        if self.options.mode.is_offline() {
            require_commands(exec, &self.options.target, &["rpm"]).await
        } else {
            require_commands(exec, &self.options.target, &["rpm", "yum"]).await
        }
    }

    async fn prepare(&mut self, exec: &dyn RemoteExecutor) -> Result<()> {
        let mode = self.options.mode;
        if mode.is_offline() {
            return Ok(());
        }

        if mode.needs_privilege() {
            let out = exec.run("sudo -n yum makecache -q").await?;
            if !out.success() {
                return Err(Error::PrepareFailed {
                    target: self.options.target.clone(),
                    message: format!("yum makecache: {}", out.stderr.trim()),
                });
            }
            return Ok(());
        }

        // Unprivileged yum writes its metadata cache here
        self.scratch.ensure(exec, &self.options.target).await?;
        Ok(())
    }

    async fn collect_inventory(&self, exec: &dyn RemoteExecutor) -> Result<RawInventory> {
        let listing = exec.run(RPM_QUERY).await?;
        if !listing.success() {
            warn!(
                "rpm exited with {}: {}",
                listing.exit_status,
                listing.stderr.trim()
            );
        }

        let updatable = if self.options.mode.is_offline() {
            String::new()
        } else {
            let out = exec.run(&self.check_update_command()).await?;
            match out.exit_status {
                0 => String::new(),
                UPDATES_AVAILABLE => out.stdout,
                status => {
                    warn!("yum check-update exited with {}: {}", status, out.stderr.trim());
                    String::new()
                }
            }
        };

        Ok(RawInventory {
            packages: listing.stdout,
            updatable,
        })
    }

    fn parse_inventory(&self, raw: &RawInventory) -> ParsedInventory {
        let mut inventory = ParsedInventory::default();
        parse_rpm_listing(&raw.packages, &mut inventory);
        parse_check_update(&raw.updatable, &mut inventory);
        inventory
    }

    fn latest_kernel_release(&self, packages: &Packages) -> Option<String> {
        let kernel = packages.get("kernel")?;
        let version = kernel
            .version
            .split_once(':')
            .map_or(kernel.version.as_str(), |(_, v)| v);
        Some(format!("{}-{}.{}", version, kernel.release, kernel.arch))
    }

    async fn cleanup(&mut self, exec: &dyn RemoteExecutor) -> Result<()> {
        self.scratch.remove(exec, &self.options.target).await
    }
}

/// Parse `rpm -qa` output, keeping the newest entry of multi-version packages
fn parse_rpm_listing(text: &str, inventory: &mut ParsedInventory) {
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            inventory.warn(line_no, line, "expected 6 whitespace-separated fields");
            continue;
        }

        let name = fields[0];
        if name == "gpg-pubkey" {
            continue;
        }

        let version = match fields[1] {
            "0" | "(none)" => fields[2].to_string(),
            epoch => format!("{}:{}", epoch, fields[2]),
        };
        let mut pkg = Package::new(name, version)
            .with_release(fields[3])
            .with_arch(fields[4]);

        let src = match parse_source_rpm(fields[5]) {
            Some((src_name, src_version, src_release)) => Some(
                SrcPackage::new(src_name, format!("{}-{}", src_version, src_release))
                    .with_binary(name),
            ),
            None if fields[5] == "(none)" => None,
            None => {
                inventory.warn(line_no, line, "unrecognized source rpm name");
                None
            }
        };

        let newer = match inventory.packages.get(name) {
            Some(existing) => {
                compare_versions(&existing.full_version(), &pkg.full_version()) == Ordering::Less
            }
            None => true,
        };
        if !newer {
            continue;
        }

        // The source record follows the row that is kept
        match src {
            Some(src) => {
                pkg = pkg.with_source(src.name.clone());
                let replaced = inventory.packages.insert(pkg);
                let (src_name, src_version) = (src.name.clone(), src.version.clone());
                inventory.src_packages.upsert(src);
                if replaced.is_some() {
                    inventory.src_packages.set_version(&src_name, src_version);
                }
            }
            None => {
                inventory.packages.insert(pkg);
            }
        }
    }
}

/// Split `name-version-release.src.rpm`
fn parse_source_rpm(file_name: &str) -> Option<(&str, &str, &str)> {
    let base = file_name
        .strip_suffix(".src.rpm")
        .or_else(|| file_name.strip_suffix(".nosrc.rpm"))?;

    let mut parts = base.rsplitn(3, '-');
    let release = parts.next()?;
    let version = parts.next()?;
    let name = parts.next()?;
    if name.is_empty() || version.is_empty() || release.is_empty() {
        return None;
    }
    Some((name, version, release))
}

/// Parse `yum check-update`: `name.arch [epoch:]version-release repo`
///
/// Long names push the remaining columns onto the next line.
fn parse_check_update(text: &str, inventory: &mut ParsedInventory) {
    let mut pending: Option<(usize, String)> = None;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("Obsoleting Packages") {
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with("Security:") {
            continue;
        }

        let (line_no, joined) = match pending.take() {
            Some((first_no, head)) => (first_no, format!("{} {}", head, trimmed)),
            None => (idx + 1, trimmed.to_string()),
        };

        let tokens: Vec<&str> = joined.split_whitespace().collect();
        if tokens.len() < 3 {
            pending = Some((line_no, joined));
            continue;
        }

        let Some((name, _arch)) = tokens[0].rsplit_once('.') else {
            inventory.warn(line_no, &joined, "expected name.arch");
            continue;
        };
        let Some((new_version, new_release)) = tokens[1].rsplit_once('-') else {
            inventory.warn(line_no, &joined, "expected version-release");
            continue;
        };

        if !inventory
            .packages
            .set_new_version(name, new_version, new_release)
        {
            debug!("Update for {} does not match an installed package", name);
        }
    }

    if let Some((line_no, rest)) = pending {
        inventory.warn(line_no, &rest, "truncated check-update line");
    }
}
