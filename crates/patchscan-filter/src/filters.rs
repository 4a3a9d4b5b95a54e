//! Individual result filters
//!
//! Every filter consumes a `ScanResult` and returns one whose findings are a
//! subset of the input's. Fields other than `scanned_cves` are left as they
//! were, except that a filter may append to `diagnostics`.

use patchscan_core::{DiagnosticKind, Error, IgnoreScope, ScanResult, ScopeLookup};
use regex::Regex;
use tracing::{debug, warn};

/// Keep findings whose max(CVSS v2, CVSS v3) is at least `threshold`
///
/// Unscored findings count as 0 and survive only when `threshold <= 0`.
pub fn by_minimum_severity(mut result: ScanResult, threshold: f64) -> ScanResult {
    let before = result.scanned_cves.len();
    result
        .scanned_cves
        .retain(|v| v.max_cvss_score() >= threshold);
    debug!(
        "Severity filter ({}) on {}: {} -> {}",
        threshold,
        result.target,
        before,
        result.scanned_cves.len()
    );
    result
}

/// Drop findings whose CVE id is on the target's ignore list
///
/// An unresolvable scope appends a diagnostic and leaves findings untouched.
pub fn by_ignore_list(mut result: ScanResult, scope: &dyn ScopeLookup) -> ScanResult {
    let Some(resolved) = resolve_scope(&mut result, scope) else {
        return result;
    };
    if resolved.ignore_cves.is_empty() {
        return result;
    }

    result
        .scanned_cves
        .retain(|v| !resolved.ignore_cves.iter().any(|c| *c == v.cve_id));
    result
}

/// Drop findings that no affected package has a fix for
///
/// A no-op unless `ignore_unfixed` is set. Findings without affected packages
/// count as unfixed (all of nothing is unfixed) and are dropped.
pub fn by_fixed_status(mut result: ScanResult, ignore_unfixed: bool) -> ScanResult {
    if !ignore_unfixed {
        return result;
    }
    result.scanned_cves.retain(|v| !v.all_not_fixed_yet());
    result
}

/// Drop findings whose affected packages all match an ignore pattern
///
/// Invalid patterns are skipped with a diagnostic. Without any valid pattern
/// the findings pass through unchanged. Findings without affected packages
/// always pass.
pub fn by_ignore_package_patterns(mut result: ScanResult, scope: &dyn ScopeLookup) -> ScanResult {
    let Some(resolved) = resolve_scope(&mut result, scope) else {
        return result;
    };

    let regexps = compile_patterns(&mut result, &resolved.ignore_pkgs_regexp);
    if regexps.is_empty() {
        return result;
    }

    result.scanned_cves.retain(|v| {
        if v.affected_packages.is_empty() {
            return true;
        }
        v.affected_packages
            .iter()
            .any(|p| !regexps.iter().any(|re| re.is_match(&p.name)))
    });
    result
}

fn compile_patterns(result: &mut ScanResult, patterns: &[String]) -> Vec<Regex> {
    let mut regexps = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match Regex::new(pattern) {
            Ok(re) => regexps.push(re),
            Err(e) => {
                let err = Error::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                };
                warn!("{}", err);
                result.push_diagnostic(err);
            }
        }
    }
    regexps
}

/// Resolve the target's ignore scope, recording a diagnostic when it is unknown
fn resolve_scope(result: &mut ScanResult, scope: &dyn ScopeLookup) -> Option<IgnoreScope> {
    let server = result.target.server_name.clone();
    let container = result.target.container_name().map(String::from);

    let resolved = scope.resolve(&server, container.as_deref());
    if resolved.is_some() {
        return resolved;
    }

    // Name the server when it is the missing part, the container otherwise
    let missing = match container {
        Some(name) if scope.resolve(&server, None).is_some() => name,
        _ => server,
    };
    let err = Error::ConfigScopeNotFound { scope: missing };
    warn!("{}", err);
    result.diagnose(DiagnosticKind::ConfigScopeNotFound, err.to_string());
    None
}
