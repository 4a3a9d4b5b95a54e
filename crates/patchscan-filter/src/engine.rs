//! Filter engine - applies an ordered set of filters to scan results

use crate::filters;
use patchscan_common::Config;
use patchscan_core::{ScanResult, ScopeLookup};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One step of a filter sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Filter {
    /// Keep findings whose effective CVSS score is at least the threshold
    MinimumSeverity(f64),
    /// Drop CVEs listed in the target's `ignore_cves`
    IgnoreList,
    /// Drop findings without any fixed package, when `ignore_unfixed` is set
    FixedStatus,
    /// Drop findings whose affected packages all match `ignore_pkgs_regexp`
    IgnorePackagePatterns,
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::MinimumSeverity(_) => "minimum_severity",
            Filter::IgnoreList => "ignore_list",
            Filter::FixedStatus => "fixed_status",
            Filter::IgnorePackagePatterns => "ignore_package_patterns",
        }
    }
}

/// Applies filters with a fixed scope lookup and `ignore_unfixed` flag
#[derive(Clone)]
pub struct FilterEngine {
    scope: Arc<dyn ScopeLookup>,
    ignore_unfixed: bool,
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("scope", &"...")
            .field("ignore_unfixed", &self.ignore_unfixed)
            .finish()
    }
}

impl FilterEngine {
    pub fn new(scope: Arc<dyn ScopeLookup>, ignore_unfixed: bool) -> Self {
        Self {
            scope,
            ignore_unfixed,
        }
    }

    /// Engine over the configured server scopes and `filter.ignore_unfixed`
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(config.clone()), config.filter.ignore_unfixed)
    }

    pub fn ignore_unfixed(&self) -> bool {
        self.ignore_unfixed
    }

    /// Apply one filter
    pub fn apply_one(&self, result: ScanResult, filter: &Filter) -> ScanResult {
        match filter {
            Filter::MinimumSeverity(threshold) => filters::by_minimum_severity(result, *threshold),
            Filter::IgnoreList => filters::by_ignore_list(result, self.scope.as_ref()),
            Filter::FixedStatus => filters::by_fixed_status(result, self.ignore_unfixed),
            Filter::IgnorePackagePatterns => {
                filters::by_ignore_package_patterns(result, self.scope.as_ref())
            }
        }
    }

    /// Apply filters in the given order
    pub fn apply(&self, result: ScanResult, filters: &[Filter]) -> ScanResult {
        filters.iter().fold(result, |acc, filter| {
            let before = acc.scanned_cves.len();
            let next = self.apply_one(acc, filter);
            debug!(
                "Filter {} on {}: {} -> {} findings",
                filter.name(),
                next.target,
                before,
                next.scanned_cves.len()
            );
            next
        })
    }

    /// Apply the same filters to every result
    pub fn apply_all(&self, results: Vec<ScanResult>, filters: &[Filter]) -> Vec<ScanResult> {
        results
            .into_iter()
            .map(|r| self.apply(r, filters))
            .collect()
    }
}

/// Conventional filter order: severity (when set), ignore list, unfixed, package patterns
pub fn default_filters(cvss_over: Option<f64>) -> Vec<Filter> {
    let mut steps = Vec::with_capacity(4);
    if let Some(threshold) = cvss_over {
        steps.push(Filter::MinimumSeverity(threshold));
    }
    steps.push(Filter::IgnoreList);
    steps.push(Filter::FixedStatus);
    steps.push(Filter::IgnorePackagePatterns);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchscan_core::{
        CveContent, CveContentType, Cvss, DiagnosticKind, IgnoreScope, PackageStatus, ScanTarget,
        ScopeTable, VulnInfo, VulnInfos,
    };

    fn sample_result(server: &str) -> ScanResult {
        let vulns: VulnInfos = vec![
            VulnInfo::new("CVE-2023-0001")
                .with_content(CveContent::new(CveContentType::Nvd).with_cvss3(Cvss::v3(9.8)))
                .with_package(PackageStatus::fixed("openssl")),
            VulnInfo::new("CVE-2023-0002")
                .with_content(CveContent::new(CveContentType::Nvd).with_cvss3(Cvss::v3(8.1)))
                .with_package(PackageStatus::not_fixed("libxml2")),
            VulnInfo::new("CVE-2023-0003")
                .with_content(CveContent::new(CveContentType::Nvd).with_cvss2(Cvss::v2(7.5)))
                .with_package(PackageStatus::fixed("libtiff5")),
            VulnInfo::new("CVE-2023-0004")
                .with_content(CveContent::new(CveContentType::Nvd).with_cvss3(Cvss::v3(4.3)))
                .with_package(PackageStatus::fixed("curl")),
            VulnInfo::new("CVE-2023-0005")
                .with_content(CveContent::new(CveContentType::Nvd).with_cvss3(Cvss::v3(9.1))),
        ]
        .into_iter()
        .collect();
        ScanResult::new(ScanTarget::host(server)).with_cves(vulns)
    }

    fn engine(ignore_unfixed: bool) -> FilterEngine {
        let scopes = ScopeTable::new().server(
            "web01",
            IgnoreScope::new()
                .ignore_cve("CVE-2023-0001")
                .ignore_pkg_pattern("^libtiff"),
        );
        FilterEngine::new(Arc::new(scopes), ignore_unfixed)
    }

    #[test]
    fn test_default_pipeline() {
        let filtered = engine(true).apply(sample_result("web01"), &default_filters(Some(7.0)));
        let ids: Vec<&str> = filtered.scanned_cves.cve_ids().collect();
        // 0001 ignored, 0002 unfixed, 0003 pattern, 0004 low, 0005 no packages
        assert!(ids.is_empty());
        assert!(filtered.diagnostics.is_empty());
    }

    #[test]
    fn test_order_does_not_change_surviving_set() {
        let engine = engine(false);
        let steps = default_filters(Some(5.0));
        let mut reversed = steps.clone();
        reversed.reverse();

        let a = engine.apply(sample_result("web01"), &steps);
        let b = engine.apply(sample_result("web01"), &reversed);
        assert_eq!(a.scanned_cves, b.scanned_cves);
        let ids: Vec<&str> = a.scanned_cves.cve_ids().collect();
        assert_eq!(ids, vec!["CVE-2023-0002", "CVE-2023-0005"]);
    }

    #[test]
    fn test_unknown_server_diagnostics_accumulate_in_call_order() {
        let filtered = engine(true).apply(
            sample_result("db01"),
            &[Filter::IgnorePackagePatterns, Filter::IgnoreList],
        );
        assert_eq!(filtered.scanned_cves.len(), 5);
        assert_eq!(filtered.diagnostics.len(), 2);
        assert!(filtered
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::ConfigScopeNotFound));
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_toml(
            r#"
            [filter]
            cvss_over = 9.0
            ignore_unfixed = true

            [servers.web01]
            ignore_cves = ["CVE-2023-0001"]
            "#,
        )
        .unwrap();

        let engine = FilterEngine::from_config(&config);
        assert!(engine.ignore_unfixed());

        let filtered = engine.apply(
            sample_result("web01"),
            &default_filters(config.filter.cvss_over),
        );
        let ids: Vec<&str> = filtered.scanned_cves.cve_ids().collect();
        // 0005 scores 9.1 but has no packages, so it counts as unfixed
        assert!(ids.is_empty());
        assert!(filtered.diagnostics.is_empty());
    }

    #[test]
    fn test_filter_serde_shape() {
        let json = serde_json::to_string(&Filter::MinimumSeverity(7.0)).unwrap();
        assert_eq!(json, r#"{"type":"minimum_severity","value":7.0}"#);
        let back: Filter = serde_json::from_str(r#"{"type":"ignore_list"}"#).unwrap();
        assert_eq!(back, Filter::IgnoreList);
    }
}
