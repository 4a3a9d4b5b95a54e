//! Diagnostics accumulated while scanning and filtering

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Kind of a recorded diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A tool required by the OS scanner is missing on the target
    UnsupportedEnvironment,
    /// Elevated execution needs a password or was denied
    PrivilegeError,
    /// The remote command channel failed
    TransportError,
    /// An inventory line could not be parsed and was skipped
    ParseWarning,
    /// The target or container has no configuration section
    ConfigScopeNotFound,
    /// An ignore-package pattern failed to compile
    InvalidPattern,
    /// Pre-scan normalization (cache refresh) failed, results may be stale
    PrepareFailed,
    /// Reversing prepare-time state failed
    CleanupFailed,
    /// Unexpected failure inside the scanner itself
    Internal,
}

impl DiagnosticKind {
    /// Whether this kind stopped the target's pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::UnsupportedEnvironment
                | DiagnosticKind::PrivilegeError
                | DiagnosticKind::TransportError
                | DiagnosticKind::Internal
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::UnsupportedEnvironment => "unsupported_environment",
            DiagnosticKind::PrivilegeError => "privilege_error",
            DiagnosticKind::TransportError => "transport_error",
            DiagnosticKind::ParseWarning => "parse_warning",
            DiagnosticKind::ConfigScopeNotFound => "config_scope_not_found",
            DiagnosticKind::InvalidPattern => "invalid_pattern",
            DiagnosticKind::PrepareFailed => "prepare_failed",
            DiagnosticKind::CleanupFailed => "cleanup_failed",
            DiagnosticKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message describing an anomaly met during scan or filter execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        Diagnostic::new(err.diagnostic_kind(), err.to_string())
    }
}

impl From<Error> for Diagnostic {
    fn from(err: Error) -> Self {
        Diagnostic::from(&err)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
