//! Fallback scanner for unrecognized OS families

use crate::exec::RemoteExecutor;
use crate::scanner::{OsScanner, ParsedInventory, RawInventory, ScanOptions};
use patchscan_core::{Kernel, Packages, Result};
use tracing::debug;

/// Runs no commands and reports an empty inventory
pub struct UnknownScanner {
    options: ScanOptions,
}

impl UnknownScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }
}

#[async_trait::async_trait]
impl OsScanner for UnknownScanner {
    fn options(&self) -> &ScanOptions {
        &self.options
    }

    async fn check_dependencies(&self, _exec: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }

    async fn check_privilege_escalation(&self, _exec: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }

    async fn prepare(&mut self, _exec: &dyn RemoteExecutor) -> Result<()> {
        debug!(
            "No scanner for family {:?} on {}, reporting an empty inventory",
            self.options.family, self.options.target
        );
        Ok(())
    }

    async fn collect_inventory(&self, _exec: &dyn RemoteExecutor) -> Result<RawInventory> {
        Ok(RawInventory::default())
    }

    fn parse_inventory(&self, _raw: &RawInventory) -> ParsedInventory {
        ParsedInventory::default()
    }

    async fn running_kernel(
        &self,
        _exec: &dyn RemoteExecutor,
        _packages: &Packages,
    ) -> Result<Kernel> {
        Ok(Kernel::default())
    }

    async fn cleanup(&mut self, _exec: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;
    use patchscan_core::ScanMode;

    #[tokio::test]
    async fn test_every_stage_succeeds_without_commands() {
        let exec = ScriptedExecutor::new();
        let mut scanner = UnknownScanner::new(ScanOptions::new("box01", "plan9", ScanMode::Deep));

        scanner.check_dependencies(&exec).await.unwrap();
        scanner.check_privilege_escalation(&exec).await.unwrap();
        scanner.prepare(&exec).await.unwrap();
        let raw = scanner.collect_inventory(&exec).await.unwrap();
        let parsed = scanner.parse_inventory(&raw);
        let kernel = scanner.running_kernel(&exec, &parsed.packages).await.unwrap();
        scanner.cleanup(&exec).await.unwrap();

        assert!(parsed.packages.is_empty());
        assert!(parsed.warnings.is_empty());
        assert_eq!(kernel, Kernel::default());
        assert_eq!(scanner.family(), "plan9");
        assert!(exec.calls().is_empty());
    }
}
