//! PatchScan OS - package inventory scanning for hosts and containers
//!
//! This crate provides the per-OS scanner pipeline:
//! - `OsScanner`: The six-stage capability set each OS family implements
//! - Debian, RedHat and Alpine families plus a fallback for anything else
//! - `ScannerRegistry`: Family name to scanner lookup, open for new families
//! - `Scanner`: Runs the pipeline for one target or many at bounded concurrency
//! - `RemoteExecutor`: The command channel to a target, `LocalExecutor` for agent mode
//!
//! # Example
//!
//! ```no_run
//! use patchscan_core::{ScanMode, ScanTarget};
//! use patchscan_os::{LocalExecutor, ScanJob, Scanner, ScannerRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let scanner = Scanner::new(Arc::new(ScannerRegistry::with_defaults()));
//! let job = ScanJob::new(ScanTarget::host("localhost"), Arc::new(LocalExecutor::default()))
//!     .with_mode(ScanMode::Offline);
//!
//! let result = scanner.scan(job).await;
//! println!("{} packages", result.packages.len());
//! for diag in &result.diagnostics {
//!     println!("{}", diag);
//! }
//! # }
//! ```

pub mod alpine;
pub mod debian;
pub mod detect;
pub mod exec;
pub mod pipeline;
pub mod redhat;
pub mod registry;
pub mod scanner;
pub mod unknown;

pub use alpine::AlpineScanner;
pub use debian::DebianScanner;
pub use detect::{detect_os, DetectedOs};
pub use exec::{ExecOutput, LocalExecutor, RemoteExecutor};
pub use pipeline::{local_jobs, PipelineOutcome, ScanJob, Scanner, Stage};
pub use redhat::RedHatScanner;
pub use registry::{scanner_factory, ScannerFactory, ScannerRegistry};
pub use scanner::{
    require_commands, OsScanner, ParsedInventory, RawInventory, ScanOptions, ScratchDir,
};
pub use unknown::UnknownScanner;
