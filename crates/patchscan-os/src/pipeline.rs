//! Pipeline driver - runs the scanner stages for each target
//!
//! Stages run strictly in order for one target. A fatal failure stops that
//! target only: the error is recorded as a diagnostic and a result is still
//! returned. Once `prepare` has run, `cleanup` always runs, even when a later
//! stage panics.

use crate::detect;
use crate::exec::{LocalExecutor, RemoteExecutor};
use crate::registry::ScannerRegistry;
use crate::scanner::{OsScanner, ScanOptions};
use patchscan_common::config::{Config, ScanConfig};
use patchscan_core::{DiagnosticKind, Error, ScanMode, ScanResult, ScanTarget};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Pipeline stage, recorded in the order it was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DetectOs,
    CheckDependencies,
    CheckPrivilegeEscalation,
    Prepare,
    CollectInventory,
    ParseInventory,
    DetectKernel,
    Cleanup,
}

/// Result of one pipeline run plus the stages it went through
#[derive(Debug)]
pub struct PipelineOutcome {
    pub result: ScanResult,
    pub stages: Vec<Stage>,
}

impl PipelineOutcome {
    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// One target to scan and the channel to reach it
#[derive(Clone)]
pub struct ScanJob {
    pub target: ScanTarget,
    pub mode: ScanMode,
    pub executor: Arc<dyn RemoteExecutor>,
}

impl ScanJob {
    pub fn new(target: ScanTarget, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            target,
            mode: ScanMode::default(),
            executor,
        }
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Build a job per configured server, scanned on this machine
///
/// Servers with a configured family skip OS detection.
pub fn local_jobs(config: &Config) -> Vec<ScanJob> {
    let executor: Arc<dyn RemoteExecutor> = Arc::new(LocalExecutor::new(Duration::from_secs(
        config.scan.command_timeout_seconds,
    )));

    let mut names: Vec<&String> = config.servers.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let mut target = ScanTarget::host(name.as_str());
            if let Some(family) = config.servers[name].family.as_deref() {
                target = target.with_family(family, "");
            }
            ScanJob::new(target, executor.clone()).with_mode(config.mode_for(name))
        })
        .collect()
}

/// Drives scans over any number of targets
#[derive(Clone)]
pub struct Scanner {
    registry: Arc<ScannerRegistry>,
    max_concurrent: usize,
    scanned_by: String,
}

impl Scanner {
    pub fn new(registry: Arc<ScannerRegistry>) -> Self {
        Self {
            registry,
            max_concurrent: 10,
            scanned_by: String::new(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(Arc::new(ScannerRegistry::with_defaults()))
            .with_max_concurrent(config.max_concurrent_targets)
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Host name recorded as `scanned_by` in every result
    pub fn with_scanned_by(mut self, scanned_by: impl Into<String>) -> Self {
        self.scanned_by = scanned_by.into();
        self
    }

    /// Scan one target; never fails, problems end up in `diagnostics`
    pub async fn scan(&self, job: ScanJob) -> ScanResult {
        self.run_pipeline(job).await.result
    }

    /// Scan all targets with at most `max_concurrent` in flight
    ///
    /// Results come back in job order. A task that panics yields a result
    /// carrying an `Internal` diagnostic. Panics after `prepare` are caught
    /// inside the pipeline, so the target is still cleaned up.
    pub async fn scan_all(&self, jobs: Vec<ScanJob>) -> Vec<ScanResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(jobs.len());

        info!(
            "Scanning {} targets, {} at a time",
            jobs.len(),
            self.max_concurrent
        );

        for job in jobs {
            let target = job.target.clone();
            let scanner = self.clone();
            let semaphore = semaphore.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                scanner.scan(job).await
            });
            handles.push((target, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Scan task for {} failed: {}", target, e);
                    let mut result = ScanResult::new(target).with_scanned_by(&self.scanned_by);
                    result.diagnose(DiagnosticKind::Internal, format!("scan task failed: {}", e));
                    results.push(result);
                }
            }
        }
        results
    }

    /// Run every stage for one target
    pub async fn run_pipeline(&self, job: ScanJob) -> PipelineOutcome {
        let span = info_span!("scan", server = %job.target, mode = job.mode.as_str());
        self.run_stages(job).instrument(span).await
    }

    async fn run_stages(&self, job: ScanJob) -> PipelineOutcome {
        let ScanJob {
            mut target,
            mode,
            executor,
        } = job;
        let exec = executor.as_ref();
        let started = Instant::now();
        let mut stages = Vec::new();

        if target.family.is_empty() {
            stages.push(Stage::DetectOs);
            match detect::detect_os(exec).await {
                Ok(Some(os)) => {
                    debug!("Detected {} {}", os.family, os.release);
                    target.family = os.family;
                    target.release = os.release;
                }
                Ok(None) => debug!("OS family not detected, using fallback scanner"),
                Err(e) => {
                    let mut result = self.new_result(target);
                    record(&mut result, e);
                    return PipelineOutcome { result, stages };
                }
            }
        }

        let options = ScanOptions::new(target.display(), target.family.as_str(), mode);
        let mut os = self.registry.create(options);
        let mut result = self.new_result(target);
        info!("Starting {} scan ({})", os.family(), mode.as_str());

        stages.push(Stage::CheckDependencies);
        if let Err(e) = os.check_dependencies(exec).await {
            record(&mut result, e);
            return PipelineOutcome { result, stages };
        }

        stages.push(Stage::CheckPrivilegeEscalation);
        if let Err(e) = os.check_privilege_escalation(exec).await {
            record(&mut result, e);
            return PipelineOutcome { result, stages };
        }

        stages.push(Stage::Prepare);
        if let Err(e) = os.prepare(exec).await {
            let fatal = e.is_fatal();
            record(&mut result, e);
            if fatal {
                cleanup(os.as_mut(), exec, &mut result, &mut stages).await;
                return PipelineOutcome { result, stages };
            }
        }

        // Inventory stages run as their own task so a panic still reaches cleanup
        let os = Arc::new(Mutex::new(os));
        let task = tokio::spawn(
            inspect(os.clone(), executor.clone(), result.clone(), stages.clone())
                .instrument(Span::current()),
        );
        let (mut result, mut stages) = match task.await {
            Ok(done) => done,
            Err(e) => {
                error!("Inventory stages for {} failed: {}", result.target, e);
                result.diagnose(DiagnosticKind::Internal, format!("scan task failed: {}", e));
                (result, stages)
            }
        };

        let mut os = os.lock().await;
        cleanup(&mut **os, exec, &mut result, &mut stages).await;

        info!(
            "Scan finished in {:?}: {} packages, {} updatable, {} diagnostics",
            started.elapsed(),
            result.packages.len(),
            result.updatable_count(),
            result.diagnostics.len()
        );
        PipelineOutcome { result, stages }
    }

    fn new_result(&self, target: ScanTarget) -> ScanResult {
        ScanResult::new(target).with_scanned_by(&self.scanned_by)
    }
}

/// Collect, parse and kernel stages; the caller runs cleanup afterwards
async fn inspect(
    os: Arc<Mutex<Box<dyn OsScanner>>>,
    executor: Arc<dyn RemoteExecutor>,
    mut result: ScanResult,
    mut stages: Vec<Stage>,
) -> (ScanResult, Vec<Stage>) {
    let os = os.lock().await;
    let exec = executor.as_ref();

    stages.push(Stage::CollectInventory);
    let raw = match os.collect_inventory(exec).await {
        Ok(raw) => raw,
        Err(e) => {
            record(&mut result, e);
            return (result, stages);
        }
    };

    stages.push(Stage::ParseInventory);
    let parsed = os.parse_inventory(&raw);
    if !parsed.warnings.is_empty() {
        warn!("{} inventory lines skipped", parsed.warnings.len());
    }
    for warning in parsed.warnings {
        debug!("{}", warning);
        result.push_diagnostic(warning);
    }
    result.packages = parsed.packages;
    result.src_packages = parsed.src_packages;

    stages.push(Stage::DetectKernel);
    match os.running_kernel(exec, &result.packages).await {
        Ok(kernel) => {
            if kernel.reboot_required {
                info!("Reboot required to load the newest kernel");
            }
            result.running_kernel = kernel;
        }
        Err(e) => record(&mut result, e),
    }

    (result, stages)
}

fn record(result: &mut ScanResult, err: Error) {
    if err.is_fatal() {
        error!("[{}] {}", err.code(), err);
    } else {
        warn!("[{}] {}", err.code(), err);
    }
    result.push_diagnostic(err);
}

async fn cleanup(
    os: &mut dyn OsScanner,
    exec: &dyn RemoteExecutor,
    result: &mut ScanResult,
    stages: &mut Vec<Stage>,
) {
    stages.push(Stage::Cleanup);
    if let Err(e) = os.cleanup(exec).await {
        let err = match e {
            Error::CleanupFailed { .. } => e,
            other => Error::CleanupFailed {
                target: result.target.display(),
                message: other.to_string(),
            },
        };
        record(result, err);
    }
}
