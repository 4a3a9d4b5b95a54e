//! PatchScan Filter - Narrows scan results to the findings worth reporting
//!
//! Filters are pure `ScanResult -> ScanResult` transformations:
//! - `by_minimum_severity`: CVSS threshold over max(v2, v3)
//! - `by_ignore_list`: per-target / per-container ignored CVE ids
//! - `by_fixed_status`: drop findings no vendor has fixed yet
//! - `by_ignore_package_patterns`: drop findings whose packages all match a regex
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use patchscan_core::{IgnoreScope, ScanResult, ScanTarget, ScopeTable};
//! use patchscan_filter::{default_filters, FilterEngine};
//!
//! let scopes = ScopeTable::new().server("web01", IgnoreScope::new().ignore_cve("CVE-2014-0160"));
//! let engine = FilterEngine::new(Arc::new(scopes), true);
//!
//! let result = ScanResult::new(ScanTarget::host("web01"));
//! let filtered = engine.apply(result, &default_filters(Some(7.0)));
//! println!("{} findings left", filtered.scanned_cves.len());
//! ```

pub mod engine;
pub mod filters;

pub use engine::{default_filters, Filter, FilterEngine};
pub use filters::{by_fixed_status, by_ignore_list, by_ignore_package_patterns, by_minimum_severity};
