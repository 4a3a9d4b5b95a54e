//! PatchScan Common - Shared utilities: logging and configuration
//!
//! This crate provides common functionality used by the scanner and the filter engine.
//! `Config` doubles as the `ScopeLookup` the filters resolve ignore settings from.

pub mod config;
pub mod logging;

pub use config::{
    Config, ConfigBuilder, ContainerConfig, FilterConfig, LoggingConfig, ScanConfig, ServerConfig,
};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogFormat};
