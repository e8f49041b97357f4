#![allow(dead_code)]

//! Orchestrates a full discovery sweep: plans traditional vs. streaming mode,
//! drives the Batch/Network/Memory Optimizers and the Streaming Scanner
//! against a connected device, tracks progress and collected errors in a
//! [`types::ScanState`], auto-saves checkpoints, and resumes from one. This
//! is the component every other crate in the workspace feeds into — its
//! shape (identity + config + state, an async `run`) is the one thing kept
//! from the teacher's `poller-actor`, generalized from a continuous poll
//! loop to a single bounded sweep.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use batch_optimizer::BatchOptimizer;
use memory_optimizer::{FlushOutcome, MemoryOptimizer, MemoryOptimizerConfig};
use modbus_client::{ClientError, ModbusClient};
use network_optimizer::{NetworkOptimizer, PacingConfig};
use register_reader::RegisterReader;
use scan_state::{ScanStateManager, StateError, ValidationError};
use streaming_scanner::{ScanCallbacks, ScanControl, StreamingConfig, StreamingScanner};
use types::{
    AddressRange, CollectedError, DiscoveryRecord, FunctionCode, PersistentCheckpoint,
    ReadErrorKind, ScanConfig, ScanConfigError, ScanOptions, ScanOptionsError, ScanState,
};

pub use streaming_scanner::ChunkError;

/// Base delay for the first reconnect attempt after the device drops mid-scan.
const RECONNECT_BASE_MS: u64 = 2_000;
/// Upper bound on the exponential reconnect backoff (spec §7).
const RECONNECT_MAX_MS: u64 = 60_000;
/// Consecutive transport-classified records (`Timeout`/`ConnectionRefused`/
/// `Transport`) before the engine treats the connection as lost and attempts
/// a reconnect at the next function-code boundary. The spec describes
/// reconnection as a response to "connection lost mid-scan" without naming a
/// detection granularity; checking at FC boundaries (rather than mid-chunk)
/// keeps the reconnect decision out of the Streaming Scanner's chunk loop —
/// see DESIGN.md.
const CONSECUTIVE_TRANSPORT_FAILURE_THRESHOLD: usize = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scan options invalid: {0}")]
    InvalidOptions(#[from] ScanOptionsError),
    #[error("scan config invalid: {0}")]
    InvalidConfig(#[from] ScanConfigError),
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("no saved checkpoint to resume from")]
    NoCheckpoint,
    #[error("saved checkpoint failed validation: {0:?}")]
    InvalidCheckpoint(Vec<ValidationError>),
    #[error("checkpoint io error: {0}")]
    State(#[from] StateError),
}

/// `Idle -> Running` on start/resume; `Running <-> Paused` on pause/resume;
/// `Running|Paused -> Stopping -> Idle` on stop; `Running -> Completed|Failed`
/// terminally. Mirrors spec §4.7's state machine exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub status: ScanStatus,
    pub records: Vec<DiscoveryRecord>,
    pub state: ScanState,
}

/// Engine-level knobs that sit outside the persisted data model (`ScanConfig`/
/// `ScanOptions` carry nothing about pacing baseline, auto-save cadence, or
/// progress-ticker frequency — those are CLI-recognized options per spec §6
/// that never get written into a checkpoint).
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub pacing: PacingConfig,
    pub auto_save_interval: Duration,
    pub progress_tick: Duration,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            auto_save_interval: Duration::from_secs(30),
            progress_tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineProgress {
    pub processed: u64,
    pub total: u64,
    pub accessible: u64,
    pub percent: f64,
    pub current_address: u16,
    pub current_function_code: Option<FunctionCode>,
}

impl From<&ScanState> for EngineProgress {
    fn from(state: &ScanState) -> Self {
        Self {
            processed: state.processed,
            total: state.total_units,
            accessible: state.accessible,
            percent: state.progress_percent(),
            current_address: state.current_address,
            current_function_code: state.current_function_code,
        }
    }
}

type ProgressFn = dyn Fn(EngineProgress) + Send + Sync;
type RecordFn = dyn Fn(&DiscoveryRecord) + Send + Sync;
type ErrorFn = dyn Fn(ChunkError) + Send + Sync;

/// The capability set injected fresh at `start()`/`resume_from_saved()`, per
/// spec §9's design note: callbacks are never part of persisted state.
#[derive(Default)]
pub struct EngineCallbacks {
    pub on_progress: Option<Box<ProgressFn>>,
    pub on_record: Option<Box<RecordFn>>,
    pub on_error: Option<Box<ErrorFn>>,
    /// The stream consumer the Memory Optimizer hands buffers to once it
    /// crosses the streaming threshold. `None` means flushed records are
    /// returned in the final `ScanOutcome` instead.
    pub stream_consumer: Option<mpsc::Sender<Vec<DiscoveryRecord>>>,
}

/// Arc-shared view of `EngineCallbacks` so the same observer can be wired
/// into a fresh `streaming_scanner::ScanCallbacks` for every function code
/// in the sweep without re-boxing the caller's closures each time.
#[derive(Clone, Default)]
struct SharedCallbacks {
    on_progress: Option<Arc<ProgressFn>>,
    on_record: Option<Arc<RecordFn>>,
    on_error: Option<Arc<ErrorFn>>,
}

impl SharedCallbacks {
    fn split(callbacks: EngineCallbacks) -> (Self, Option<mpsc::Sender<Vec<DiscoveryRecord>>>) {
        let shared = Self {
            on_progress: callbacks.on_progress.map(Arc::from),
            on_record: callbacks.on_record.map(Arc::from),
            on_error: callbacks.on_error.map(Arc::from),
        };
        (shared, callbacks.stream_consumer)
    }
}

/// Exponential reconnect backoff: base 2s, doubling per attempt, capped at
/// 60s (spec §7). A pure function so the policy is unit-testable without a
/// live connection.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    let ms = RECONNECT_BASE_MS.saturating_mul(factor);
    Duration::from_millis(ms.min(RECONNECT_MAX_MS))
}

async fn connect_with_backoff(config: &ScanConfig, retries: usize) -> Result<ModbusClient, ClientError> {
    let mut attempt = 0u32;
    loop {
        match ModbusClient::connect(&config.host, config.port).await {
            Ok(mut client) => {
                client.set_timeout(config.timeout_ms);
                client.set_slave(config.slave_id).await;
                return Ok(client);
            }
            Err(err) => {
                if attempt as usize >= retries {
                    warn!(error = %err, attempt, "exhausted reconnection attempts");
                    return Err(err);
                }
                let delay = backoff_delay(attempt);
                warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "connect failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn cap_for(config: &ScanConfig, fc: FunctionCode) -> u16 {
    fc.protocol_max_units().min(config.max_units_per_request)
}

fn is_transport_failure(record: &DiscoveryRecord) -> bool {
    record
        .error
        .as_ref()
        .map(|e| {
            matches!(
                e.kind,
                ReadErrorKind::Transport | ReadErrorKind::Timeout | ReadErrorKind::ConnectionRefused
            )
        })
        .unwrap_or(false)
}

/// Builds the ordered (function code, address range) plan for a sweep,
/// honoring a mid-scan resume point per spec §4.7: the function code the
/// checkpoint was in the middle of picks up one past its saved
/// `current_address`; every function code after it in scan-option order
/// starts fresh from the full range.
fn build_sweep_plan(
    options: &ScanOptions,
    resume: Option<(Option<FunctionCode>, u16)>,
) -> Vec<(FunctionCode, AddressRange)> {
    let full = options.address_range;
    let fresh_plan = || options.function_codes.iter().map(|&fc| (fc, full)).collect();

    let Some((Some(resume_fc), resume_addr)) = resume else {
        return fresh_plan();
    };
    let Some(fc_index) = options.function_codes.iter().position(|&fc| fc == resume_fc) else {
        return fresh_plan();
    };

    let mut plan = Vec::new();
    if let Some(start) = resume_addr.checked_add(1) {
        if start <= full.hi {
            plan.push((resume_fc, AddressRange::new(start, full.hi).expect("start <= hi")));
        }
    }
    for &fc in &options.function_codes[fc_index + 1..] {
        plan.push((fc, full));
    }
    plan
}

fn build_scan_callbacks(
    state: &Arc<StdMutex<ScanState>>,
    consecutive_failures: &Arc<AtomicUsize>,
    shared: &SharedCallbacks,
) -> ScanCallbacks {
    let progress_state = state.clone();
    let user_progress = shared.on_progress.clone();

    let record_state = state.clone();
    let record_failures = consecutive_failures.clone();
    let user_record = shared.on_record.clone();

    let error_state = state.clone();
    let user_error = shared.on_error.clone();

    ScanCallbacks {
        on_progress: Some(Box::new(move |_tick| {
            if let Some(user_progress) = &user_progress {
                let snapshot = progress_state.lock().unwrap().clone();
                user_progress(EngineProgress::from(&snapshot));
            }
        })),
        on_record: Some(Box::new(move |record: &DiscoveryRecord| {
            {
                let mut state = record_state.lock().unwrap();
                state.record_unit(record.address, record.function_code, record.accessible);
            }
            if is_transport_failure(record) {
                record_failures.fetch_add(1, Ordering::Relaxed);
            } else {
                record_failures.store(0, Ordering::Relaxed);
            }
            if let Some(user_record) = &user_record {
                user_record(record);
            }
        })),
        on_error: Some(Box::new(move |chunk_error: ChunkError| {
            {
                let mut state = error_state.lock().unwrap();
                state.collected_errors.push(CollectedError {
                    address: None,
                    function_code: Some(chunk_error.function_code),
                    error: chunk_error.error.clone(),
                    occurred_at: Utc::now(),
                });
            }
            if let Some(user_error) = &user_error {
                user_error(chunk_error);
            }
        })),
    }
}

/// Orchestrates one discovery sweep end to end. One `ScannerEngine` runs at
/// most one scan at a time — a second `start`/`resume_from_saved` call while
/// `Running`/`Paused`/`Stopping` fails with [`EngineError::AlreadyRunning`].
pub struct ScannerEngine {
    config: ScanConfig,
    options: ScanOptions,
    params: EngineParams,
    root_dir: PathBuf,
    state_manager: ScanStateManager,
    state: Arc<StdMutex<ScanState>>,
    phase: Arc<StdMutex<EngineState>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
}

impl ScannerEngine {
    pub fn new(
        config: ScanConfig,
        options: ScanOptions,
        root_dir: impl Into<PathBuf>,
        params: EngineParams,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        options.validate()?;
        let root_dir = root_dir.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (pause_tx, pause_rx) = watch::channel(false);
        Ok(Self {
            state: Arc::new(StdMutex::new(ScanState::new(options.total_units()))),
            phase: Arc::new(StdMutex::new(EngineState::Idle)),
            state_manager: ScanStateManager::new(root_dir.clone()),
            root_dir,
            config,
            options,
            params,
            stop_tx,
            stop_rx,
            pause_tx,
            pause_rx,
        })
    }

    pub fn state(&self) -> EngineState {
        *self.phase.lock().unwrap()
    }

    pub fn scan_state(&self) -> ScanState {
        self.state.lock().unwrap().clone()
    }

    /// `Running`/`Paused` -> `Stopping`. Observed between units/chunks, never
    /// mid-request.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let mut phase = self.phase.lock().unwrap();
        if matches!(*phase, EngineState::Running | EngineState::Paused) {
            *phase = EngineState::Stopping;
        }
    }

    /// `Running` -> `Paused`. Suspends further submissions; an in-flight
    /// request always finishes.
    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
        let mut phase = self.phase.lock().unwrap();
        if matches!(*phase, EngineState::Running) {
            *phase = EngineState::Paused;
        }
    }

    /// `Paused` -> `Running`.
    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
        let mut phase = self.phase.lock().unwrap();
        if matches!(*phase, EngineState::Paused) {
            *phase = EngineState::Running;
        }
    }

    fn begin(&self) -> Result<(), EngineError> {
        let mut phase = self.phase.lock().unwrap();
        if !matches!(*phase, EngineState::Idle) {
            return Err(EngineError::AlreadyRunning);
        }
        *phase = EngineState::Running;
        drop(phase);
        let _ = self.stop_tx.send(false);
        let _ = self.pause_tx.send(false);
        Ok(())
    }

    pub async fn start(&self, callbacks: EngineCallbacks) -> Result<ScanOutcome, EngineError> {
        self.begin()?;
        info!(host = %self.config.host, port = self.config.port, "scan starting");
        let result = self
            .run(self.config.clone(), self.options.clone(), ScanState::new(self.options.total_units()), Vec::new(), None, callbacks)
            .await;
        if let Err(err) = &result {
            *self.phase.lock().unwrap() = EngineState::Idle;
            warn!(error = %err, "scan failed to start");
        }
        result
    }

    /// Loads the saved checkpoint, validates it, and continues the scan it
    /// describes using its own config/options (spec §4.7: "restores state").
    pub async fn resume_from_saved(&self, callbacks: EngineCallbacks) -> Result<ScanOutcome, EngineError> {
        self.begin()?;

        let outcome = async {
            let report = self.state_manager.validate().await?;
            if !report.is_valid() {
                return Err(EngineError::InvalidCheckpoint(report.errors));
            }
            let checkpoint = self
                .state_manager
                .load()
                .await?
                .ok_or(EngineError::NoCheckpoint)?;
            let PersistentCheckpoint { config, options, state, records, .. } = checkpoint;
            let resume_position = Some((state.current_function_code, state.current_address));
            info!(
                processed = state.processed,
                total = state.total_units,
                "resuming scan from saved checkpoint"
            );
            self.run(config, options, state, records, resume_position, callbacks).await
        }
        .await;

        if outcome.is_err() {
            *self.phase.lock().unwrap() = EngineState::Idle;
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        config: ScanConfig,
        options: ScanOptions,
        seed_state: ScanState,
        seed_records: Vec<DiscoveryRecord>,
        resume_position: Option<(Option<FunctionCode>, u16)>,
        callbacks: EngineCallbacks,
    ) -> Result<ScanOutcome, EngineError> {
        if let Err(err) = config.validate() {
            return Err(err.into());
        }
        if let Err(err) = options.validate() {
            return Err(err.into());
        }

        let (shared, stream_consumer) = SharedCallbacks::split(callbacks);

        let state = self.state.clone();
        {
            let mut guard = state.lock().unwrap();
            *guard = seed_state;
            guard.running = true;
            guard.paused = false;
        }

        let final_records = Arc::new(StdMutex::new(seed_records));
        let consecutive_failures = Arc::new(AtomicUsize::new(0));

        let mem_threshold = if options.enable_memory_optimization {
            options.streaming_threshold
        } else {
            usize::MAX
        };
        let memory = Arc::new(MemoryOptimizer::new(
            MemoryOptimizerConfig {
                streaming_threshold: mem_threshold,
                ..Default::default()
            },
            stream_consumer,
        ));
        let network = if options.enable_network_optimization {
            Some(Arc::new(NetworkOptimizer::new(self.params.pacing.clone())))
        } else {
            None
        };

        let mut client = match connect_with_backoff(&config, config.retry_count).await {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "initial connect failed, scan failed");
                return Ok(self.finalize(ScanStatus::Failed, &config, &options, &state, &final_records).await);
            }
        };

        let (bg_shutdown_tx, bg_shutdown_rx) = watch::channel(false);
        self.spawn_background_tasks(&state, &memory, &final_records, &config, &options, &shared, bg_shutdown_rx);

        let control = ScanControl::new(self.stop_rx.clone(), self.pause_rx.clone());
        let mut control = control;
        let mut batch_optimizer = BatchOptimizer::new();

        let use_streaming = options.enable_streaming || options.total_units() > options.streaming_threshold as u64;
        let plan = build_sweep_plan(&options, resume_position);

        let mut status = ScanStatus::Completed;

        'plan: for (fc, range) in plan {
            control.wait_while_paused().await;
            if control.is_stopped() {
                status = ScanStatus::Stopped;
                break 'plan;
            }

            if consecutive_failures.load(Ordering::Relaxed) >= CONSECUTIVE_TRANSPORT_FAILURE_THRESHOLD {
                client.close().await;
                match connect_with_backoff(&config, config.retry_count).await {
                    Ok(reconnected) => {
                        client = reconnected;
                        consecutive_failures.store(0, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(error = %err, "reconnect exhausted mid-scan, scan failed");
                        status = ScanStatus::Failed;
                        break 'plan;
                    }
                }
            }

            let reader = RegisterReader::new(&client);
            let cap = cap_for(&config, fc);

            if use_streaming || options.enable_batching {
                let chunk_size = if use_streaming {
                    streaming_scanner::default_chunk_size(options.streaming_threshold)
                } else {
                    range.len() as usize
                };
                let streaming = StreamingScanner::new(StreamingConfig { chunk_size });
                let scan_callbacks = build_scan_callbacks(&state, &consecutive_failures, &shared);

                let outcome = streaming
                    .run(
                        &reader,
                        &mut batch_optimizer,
                        network.as_deref(),
                        &memory,
                        range,
                        std::slice::from_ref(&fc),
                        |_| cap,
                        0,
                        &mut control,
                        &scan_callbacks,
                    )
                    .await;

                final_records.lock().unwrap().extend(outcome.buffered_without_consumer);
                if outcome.stopped {
                    status = ScanStatus::Stopped;
                    break 'plan;
                }
            } else {
                for address in range.iter() {
                    control.wait_while_paused().await;
                    if control.is_stopped() {
                        status = ScanStatus::Stopped;
                        break 'plan;
                    }

                    let record = match &network {
                        Some(net) => {
                            match net
                                .gate(|| reader.read_one(address, fc), 0, 2, |r| {
                                    r.as_ref().map(|rec| rec.accessible).unwrap_or(false)
                                })
                                .await
                            {
                                Ok(Ok(record)) => record,
                                Ok(Err(_)) => {
                                    unreachable!("read_one(address, fc) never violates its count=1 precondition")
                                }
                                Err(_cancelled) => {
                                    status = ScanStatus::Stopped;
                                    break 'plan;
                                }
                            }
                        }
                        None => {
                            let record = reader
                                .read_one(address, fc)
                                .await
                                .expect("read_one(address, fc) never violates its count=1 precondition");
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            record
                        }
                    };

                    {
                        let mut guard = state.lock().unwrap();
                        guard.record_unit(record.address, record.function_code, record.accessible);
                    }
                    if is_transport_failure(&record) {
                        consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    } else {
                        consecutive_failures.store(0, Ordering::Relaxed);
                    }
                    if let Some(on_record) = &shared.on_record {
                        on_record(&record);
                    }

                    if let Some(FlushOutcome::Returned(records)) = memory.add(vec![record]).await {
                        final_records.lock().unwrap().extend(records);
                    }

                    if let Some(on_progress) = &shared.on_progress {
                        let snapshot = state.lock().unwrap().clone();
                        on_progress(EngineProgress::from(&snapshot));
                    }
                }
            }
        }

        client.close().await;
        let _ = bg_shutdown_tx.send(true);

        if let FlushOutcome::Returned(records) = memory.flush().await {
            final_records.lock().unwrap().extend(records);
        }

        Ok(self.finalize(status, &config, &options, &state, &final_records).await)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_background_tasks(
        &self,
        state: &Arc<StdMutex<ScanState>>,
        memory: &Arc<MemoryOptimizer>,
        final_records: &Arc<StdMutex<Vec<DiscoveryRecord>>>,
        config: &ScanConfig,
        options: &ScanOptions,
        shared: &SharedCallbacks,
        bg_shutdown_rx: watch::Receiver<bool>,
    ) {
        tokio::spawn({
            let memory = memory.clone();
            let shutdown = bg_shutdown_rx.clone();
            async move {
                memory.run_sampling_loop(shutdown).await;
            }
        });

        tokio::spawn({
            let state_manager = ScanStateManager::new(self.root_dir.clone());
            let config = config.clone();
            let options = options.clone();
            let state = state.clone();
            let final_records = final_records.clone();
            let memory = memory.clone();
            let interval = self.params.auto_save_interval;
            let shutdown = bg_shutdown_rx.clone();
            async move {
                let save_fn = || {
                    let state_manager = &state_manager;
                    let config = &config;
                    let options = &options;
                    let state = &state;
                    let final_records = &final_records;
                    let memory = &memory;
                    async move {
                        let snapshot_state = state.lock().unwrap().clone();
                        let mut records = final_records.lock().unwrap().clone();
                        records.extend(memory.snapshot().await);
                        state_manager.save(config, options, &snapshot_state, &records).await
                    }
                };
                state_manager.run_autosave_loop(interval, save_fn, shutdown).await;
            }
        });

        tokio::spawn({
            let state = state.clone();
            let phase = self.phase.clone();
            let mut shutdown = bg_shutdown_rx.clone();
            let user_progress = shared.on_progress.clone();
            let tick = self.params.progress_tick;
            async move {
                let mut interval = tokio::time::interval(tick);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if matches!(*phase.lock().unwrap(), EngineState::Running) {
                                if let Some(user_progress) = &user_progress {
                                    let snapshot = state.lock().unwrap().clone();
                                    user_progress(EngineProgress::from(&snapshot));
                                }
                            }
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    async fn finalize(
        &self,
        status: ScanStatus,
        config: &ScanConfig,
        options: &ScanOptions,
        state: &Arc<StdMutex<ScanState>>,
        final_records: &Arc<StdMutex<Vec<DiscoveryRecord>>>,
    ) -> ScanOutcome {
        {
            let mut guard = state.lock().unwrap();
            guard.running = false;
            guard.paused = false;
        }

        let processed = state.lock().unwrap().processed;
        match status {
            ScanStatus::Completed => {
                if let Err(err) = self.state_manager.clear().await {
                    warn!(error = %err, "failed to clear checkpoint on completion");
                }
            }
            ScanStatus::Stopped | ScanStatus::Failed => {
                if processed > 0 {
                    let snapshot_state = state.lock().unwrap().clone();
                    let records = final_records.lock().unwrap().clone();
                    if let Err(err) = self.state_manager.save(config, options, &snapshot_state, &records).await {
                        warn!(error = %err, "failed to persist checkpoint");
                    }
                }
            }
        }

        *self.phase.lock().unwrap() = match status {
            ScanStatus::Completed => EngineState::Completed,
            ScanStatus::Stopped => EngineState::Idle,
            ScanStatus::Failed => EngineState::Failed,
        };

        info!(?status, processed, "scan finished");

        ScanOutcome {
            status,
            records: final_records.lock().unwrap().clone(),
            state: state.lock().unwrap().clone(),
        }
    }
}
