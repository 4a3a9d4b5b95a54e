//! PatchScan Core - Foundation types, traits, and error handling
//!
//! This crate provides the data model shared by the scanner and the filter engine:
//! - `ScanTarget`: Host or container to scan, with its OS family
//! - `Packages` / `SrcPackages`: Installed inventory keyed by package name
//! - `VulnInfo`: A CVE detected against a target, with scores and affected packages
//! - `ScanResult`: The per-target aggregate, including accumulated diagnostics
//! - `ScopeLookup`: Read-only access to per-target ignore configuration

pub mod diagnostic;
pub mod error;
pub mod package;
pub mod result;
pub mod scope;
pub mod severity;
pub mod target;
pub mod version;
pub mod vuln;

// Re-export commonly used types at crate root
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{Error, Result};
pub use package::{Package, Packages, SrcPackage, SrcPackages};
pub use result::{Kernel, ScanResult, JSON_VERSION};
pub use scope::{IgnoreScope, ScopeLookup, ScopeTable};
pub use severity::{Cvss, CvssVersion, Severity};
pub use target::{Container, Platform, ScanMode, ScanTarget};
pub use version::compare_versions;
pub use vuln::{
    Confidence, CveContent, CveContentType, Cwe, CweDictEntry, PackageStatus, VulnInfo, VulnInfos,
};
