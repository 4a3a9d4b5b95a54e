//! Scan result aggregate

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::package::{Packages, SrcPackages};
use crate::severity::Severity;
use crate::target::ScanTarget;
use crate::vuln::{CweDictEntry, VulnInfos};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Version of the serialized result layout
pub const JSON_VERSION: u32 = 4;

/// Running kernel of the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    pub release: String,
    pub version: String,
    /// The running kernel differs from the newest installed kernel package
    pub reboot_required: bool,
}

/// Result of one completed scan pipeline run for a single target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub json_version: u32,
    #[serde(default)]
    pub lang: String,

    pub target: ScanTarget,

    pub scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub scanned_version: String,
    #[serde(default)]
    pub scanned_revision: String,
    #[serde(default)]
    pub scanned_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reported_version: String,
    #[serde(default)]
    pub reported_revision: String,
    #[serde(default)]
    pub reported_by: String,

    #[serde(default)]
    pub running_kernel: Kernel,
    #[serde(default)]
    pub packages: Packages,
    #[serde(default)]
    pub src_packages: SrcPackages,
    #[serde(default)]
    pub scanned_cves: VulnInfos,
    #[serde(default)]
    pub cwe_dict: HashMap<String, CweDictEntry>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub optional: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ScanResult {
    /// Create an empty result for a target, stamped with the current time
    pub fn new(target: ScanTarget) -> Self {
        Self {
            json_version: JSON_VERSION,
            lang: String::from("en"),
            target,
            scanned_at: Utc::now(),
            scanned_version: env!("CARGO_PKG_VERSION").to_string(),
            scanned_revision: String::new(),
            scanned_by: String::new(),
            reported_at: None,
            reported_version: String::new(),
            reported_revision: String::new(),
            reported_by: String::new(),
            running_kernel: Kernel::default(),
            packages: Packages::new(),
            src_packages: SrcPackages::new(),
            scanned_cves: VulnInfos::new(),
            cwe_dict: HashMap::new(),
            optional: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_scanned_by(mut self, scanned_by: impl Into<String>) -> Self {
        self.scanned_by = scanned_by.into();
        self
    }

    pub fn with_cves(mut self, cves: VulnInfos) -> Self {
        self.scanned_cves = cves;
        self
    }

    /// Append a diagnostic
    pub fn push_diagnostic(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.diagnostics.push(diagnostic.into());
    }

    /// Append a diagnostic of the given kind
    pub fn diagnose(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(kind, message));
    }

    /// Whether the pipeline for this target stopped on a fatal error
    pub fn has_fatal_diagnostic(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_fatal())
    }

    pub fn is_container(&self) -> bool {
        self.target.is_container()
    }

    pub fn server_name(&self) -> &str {
        &self.target.server_name
    }

    /// File name of the report without extension
    pub fn report_file_name(&self) -> String {
        self.target.display()
    }

    /// Object key of the report in remote storage, without extension
    pub fn report_key_name(&self) -> String {
        format!(
            "{}/{}",
            self.scanned_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.report_file_name()
        )
    }

    /// Number of installed packages with a known newer version
    pub fn updatable_count(&self) -> usize {
        self.packages.updatable_count()
    }

    pub fn count_by_severity(&self) -> HashMap<Severity, usize> {
        self.scanned_cves.count_by_severity()
    }

    /// Mark the result as reported now
    pub fn mark_reported(&mut self, reported_by: impl Into<String>) {
        self.reported_at = Some(Utc::now());
        self.reported_version = env!("CARGO_PKG_VERSION").to_string();
        self.reported_by = reported_by.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Container;
    use chrono::TimeZone;

    #[test]
    fn test_report_names() {
        let mut result = ScanResult::new(ScanTarget::host("web01"));
        result.scanned_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(result.report_file_name(), "web01");
        assert_eq!(result.report_key_name(), "2024-03-01T12:00:00Z/web01");

        let mut result = ScanResult::new(ScanTarget::container(
            "docker-host",
            Container::new("abc123", "redis"),
        ));
        result.scanned_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert!(result.is_container());
        assert_eq!(result.report_key_name(), "2024-03-01T12:00:00Z/redis@docker-host");
    }

    #[test]
    fn test_fatal_diagnostics() {
        let mut result = ScanResult::new(ScanTarget::host("web01"));
        result.diagnose(DiagnosticKind::ParseWarning, "skipped line 4");
        assert!(!result.has_fatal_diagnostic());
        result.diagnose(DiagnosticKind::PrivilegeError, "sudo requires a password");
        assert!(result.has_fatal_diagnostic());
    }

    #[test]
    fn test_json_roundtrip_keeps_diagnostics() {
        let mut result = ScanResult::new(ScanTarget::host("db01").with_family("centos", "7"));
        result.diagnose(DiagnosticKind::CleanupFailed, "rm failed");
        let json = serde_json::to_string(&result).unwrap();
        let back: ScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.diagnostics, result.diagnostics);
        assert_eq!(back.target.family, "centos");
    }
}
