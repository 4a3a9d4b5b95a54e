//! Error types for PatchScan

use crate::diagnostic::DiagnosticKind;
use thiserror::Error;

/// Result type alias using PatchScan Error
pub type Result<T> = std::result::Result<T, Error>;

/// PatchScan error types
#[derive(Error, Debug)]
pub enum Error {
    // === Per-target fatal errors ===
    #[error("Unsupported environment on {target}: {message}")]
    UnsupportedEnvironment { target: String, message: String },

    #[error("Privilege escalation failed on {target}: {message}")]
    PrivilegeError { target: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Command `{command}` timed out after {seconds}s")]
    CommandTimeout { command: String, seconds: u64 },

    // === Non-fatal errors ===
    #[error("Failed to parse line {line_no}: {line:?}: {message}")]
    ParseWarning {
        line_no: usize,
        line: String,
        message: String,
    },

    #[error("{scope} is not found in configuration")]
    ConfigScopeNotFound { scope: String },

    #[error("Failed to compile pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Prepare failed on {target}: {message}")]
    PrepareFailed { target: String, message: String },

    #[error("Cleanup failed on {target}: {message}")]
    CleanupFailed { target: String, message: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error stops the pipeline of the target it occurred on
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedEnvironment { .. }
                | Error::PrivilegeError { .. }
                | Error::Transport(_)
                | Error::CommandTimeout { .. }
                | Error::Internal(_)
        )
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnsupportedEnvironment { .. } => "UNSUPPORTED_ENVIRONMENT",
            Error::PrivilegeError { .. } => "PRIVILEGE_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::CommandTimeout { .. } => "COMMAND_TIMEOUT",
            Error::ParseWarning { .. } => "PARSE_WARNING",
            Error::ConfigScopeNotFound { .. } => "CONFIG_SCOPE_NOT_FOUND",
            Error::InvalidPattern { .. } => "INVALID_PATTERN",
            Error::PrepareFailed { .. } => "PREPARE_FAILED",
            Error::CleanupFailed { .. } => "CLEANUP_FAILED",
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::InvalidConfig { .. } => "INVALID_CONFIG",
            Error::Io(_) => "IO_ERROR",
            Error::FileNotFound { .. } => "FILE_NOT_FOUND",
            Error::Json(_) => "JSON_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Map this error onto the diagnostic kind recorded in a scan result
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            Error::UnsupportedEnvironment { .. } => DiagnosticKind::UnsupportedEnvironment,
            Error::PrivilegeError { .. } => DiagnosticKind::PrivilegeError,
            Error::Transport(_) | Error::CommandTimeout { .. } | Error::Io(_) => {
                DiagnosticKind::TransportError
            }
            Error::ParseWarning { .. } => DiagnosticKind::ParseWarning,
            Error::ConfigScopeNotFound { .. } => DiagnosticKind::ConfigScopeNotFound,
            Error::InvalidPattern { .. } => DiagnosticKind::InvalidPattern,
            Error::PrepareFailed { .. } => DiagnosticKind::PrepareFailed,
            Error::CleanupFailed { .. } => DiagnosticKind::CleanupFailed,
            Error::Configuration(_)
            | Error::InvalidConfig { .. }
            | Error::FileNotFound { .. }
            | Error::Json(_)
            | Error::Internal(_) => DiagnosticKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        let err = Error::UnsupportedEnvironment {
            target: "web01".into(),
            message: "dpkg-query not found".into(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.code(), "UNSUPPORTED_ENVIRONMENT");

        let err = Error::ParseWarning {
            line_no: 3,
            line: "garbage".into(),
            message: "expected 5 fields".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::ParseWarning);
    }

    #[test]
    fn test_transport_maps_to_fatal_diagnostic() {
        let err = Error::Transport("connection reset".into());
        assert!(err.diagnostic_kind().is_fatal());
        assert_eq!(err.to_string(), "Transport error: connection reset");
    }
}
