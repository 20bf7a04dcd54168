//! Orchestrator module for the movies ETL.
//!
//! Runs extract, transform and load passes on a fixed interval until asked to stop.

use movies_etl_repository::StateStore;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::errors::PipelineError;
use crate::extractor::Extractor;
use crate::loader::{BulkLoader, LoadReport};
use crate::retry::BackoffPolicy;
use crate::transformer::transform;

/// Default pause between two passes.
const DEFAULT_RUN_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap of the delay between failed passes.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Index the documents are written to; also the key of the resume cursor.
    pub index_name: String,
    /// Pause between a finished pass and the next one.
    pub run_interval: Duration,
    /// Backoff applied between failed passes.
    pub backoff: BackoffPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            index_name: "movies".to_string(),
            run_interval: DEFAULT_RUN_INTERVAL,
            backoff: BackoffPolicy::new(DEFAULT_MAX_BACKOFF),
        }
    }
}

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtlPhase {
    /// Waiting for the next pass.
    Idle,
    /// Reading the cursor and opening the change stream.
    Extracting,
    /// Transforming and loading batches.
    Loading,
}

impl fmt::Display for EtlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Extracting => write!(f, "extracting"),
            Self::Loading => write!(f, "loading"),
        }
    }
}

/// Requests a graceful stop of a running orchestrator.
///
/// A pass in progress finishes the batch it is loading and stops before the next one;
/// an idle orchestrator, or one waiting on an unreachable backend, wakes up and returns.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Orchestrator that coordinates the ETL components.
///
/// The orchestrator:
/// - Reads the cursor and extracts everything modified after it
/// - Streams batches through the transformer into the loader
/// - Retries failed passes with backoff, except state store failures
/// - Sleeps between passes and honors stop requests
pub struct Orchestrator {
    extractor: Extractor,
    loader: BulkLoader,
    state: Arc<dyn StateStore>,
    config: OrchestratorConfig,
    phase: EtlPhase,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    /// Number of passes completed since startup.
    total_runs: Arc<AtomicU64>,
    /// Total number of documents loaded since startup.
    total_documents_loaded: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Create a new orchestrator with the default configuration.
    pub fn new(extractor: Extractor, loader: BulkLoader, state: Arc<dyn StateStore>) -> Self {
        Self::with_config(extractor, loader, state, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        extractor: Extractor,
        loader: BulkLoader,
        state: Arc<dyn StateStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            extractor,
            loader,
            state,
            config,
            phase: EtlPhase::Idle,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            total_runs: Arc::new(AtomicU64::new(0)),
            total_documents_loaded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle that can stop this orchestrator from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn phase(&self) -> EtlPhase {
        self.phase
    }

    pub fn total_documents_loaded(&self) -> u64 {
        self.total_documents_loaded.load(Ordering::Relaxed)
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs.load(Ordering::Relaxed)
    }

    /// Run passes until a stop is requested or a fatal error occurs.
    ///
    /// Returns `Ok(())` after a graceful stop. Only state store failures are fatal.
    #[instrument(skip(self), fields(index = %self.config.index_name))]
    pub async fn run(&mut self) -> Result<(), PipelineError> {
        info!(
            run_interval_secs = self.config.run_interval.as_secs_f64(),
            "Starting movies ETL orchestrator"
        );

        while !self.is_stop_requested() {
            self.run_with_retry().await?;
            self.set_phase(EtlPhase::Idle);

            if !self.sleep_unless_stopped(self.config.run_interval).await {
                break;
            }
        }

        info!(
            total_runs = self.total_runs(),
            total_documents_loaded = self.total_documents_loaded(),
            "Orchestrator stopped"
        );
        Ok(())
    }

    /// Repeat a pass until it succeeds, backing off after each retriable failure.
    ///
    /// Returns `Ok(None)` if a stop is requested while waiting to retry or while a
    /// backend is unreachable.
    async fn run_with_retry(&mut self) -> Result<Option<LoadReport>, PipelineError> {
        let mut delays = self.config.backoff.delays();
        let mut attempt: u32 = 0;

        loop {
            match self.run_once().await {
                Ok(report) => return Ok(Some(report)),
                Err(PipelineError::Stopped) => return Ok(None),
                Err(e) if e.is_retriable() => {
                    attempt += 1;
                    let delay = delays.next().unwrap_or(self.config.backoff.max_delay);
                    error!(
                        error = %e,
                        attempt = attempt,
                        phase = %self.phase,
                        retry_in_ms = delay.as_millis() as u64,
                        "ETL pass failed, retrying"
                    );
                    self.set_phase(EtlPhase::Idle);
                    if !self.sleep_unless_stopped(delay).await {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    error!(error = %e, phase = %self.phase, "ETL pass failed fatally");
                    return Err(e);
                }
            }
        }
    }

    /// Execute a single pass: read the cursor, extract, transform and load.
    pub async fn run_once(&mut self) -> Result<LoadReport, PipelineError> {
        self.set_phase(EtlPhase::Extracting);
        let token = self.state.get_state(&self.config.index_name).await?;
        let records = self
            .extractor
            .extract(token.as_deref(), &self.shutdown_rx)
            .await?;

        self.set_phase(EtlPhase::Loading);
        let batches = transform(self.config.index_name.clone(), records);
        let report = self
            .loader
            .load_and_checkpoint(
                batches,
                self.state.as_ref(),
                &self.config.index_name,
                &self.shutdown_rx,
            )
            .await?;

        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.total_documents_loaded
            .fetch_add(report.documents as u64, Ordering::Relaxed);

        if report.batches == 0 {
            info!("No changes since last run");
        } else {
            info!(
                batches = report.batches,
                documents = report.documents,
                completed = report.completed,
                "ETL pass finished"
            );
        }

        Ok(report)
    }

    fn set_phase(&mut self, phase: EtlPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "Phase changed");
            self.phase = phase;
        }
    }

    fn is_stop_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Sleep for `duration`; returns `false` if a stop was requested instead.
    async fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stop_requested(),
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }
}
