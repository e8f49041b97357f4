#![allow(dead_code)]

//! The chunked driver used when a scan's planned unit count exceeds the
//! streaming threshold. Splits an address range into fixed-size chunks and,
//! for each function code in turn, walks the chunks in order: each chunk's
//! reads go through the Batch Optimizer (itself gated by the Network
//! Optimizer when one is installed), the resulting records are handed to the
//! Memory Optimizer, and a progress tick fires. Pause and stop are only
//! honored between chunks — a chunk in flight always finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use batch_optimizer::{BatchOptimizer, Cancelled};
use memory_optimizer::{FlushOutcome, MemoryOptimizer};
use network_optimizer::NetworkOptimizer;
use register_reader::RegisterReader;
use types::{AddressRange, DiscoveryError, DiscoveryRecord, FunctionCode};

/// `min(1000, threshold / 10)`, floored at 1 so a tiny threshold never
/// yields a zero-size chunk.
pub fn default_chunk_size(streaming_threshold: usize) -> usize {
    std::cmp::min(1000, (streaming_threshold / 10).max(1))
}

#[derive(Debug, Clone, Copy)]
pub struct StreamingConfig {
    pub chunk_size: usize,
}

impl StreamingConfig {
    pub fn for_threshold(streaming_threshold: usize) -> Self {
        Self {
            chunk_size: default_chunk_size(streaming_threshold),
        }
    }
}

/// Cooperative pause/stop shared between the streaming driver and whatever
/// owns it (the engine, for its own traditional-sweep loop too). Cloning is
/// cheap — each holder gets its own `watch::Receiver` cursor.
#[derive(Clone)]
pub struct ScanControl {
    stop: watch::Receiver<bool>,
    pause: watch::Receiver<bool>,
}

impl ScanControl {
    pub fn new(stop: watch::Receiver<bool>, pause: watch::Receiver<bool>) -> Self {
        Self { stop, pause }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    /// Blocks until either the pause flag clears or the stop flag is set.
    pub async fn wait_while_paused(&mut self) {
        while self.is_paused() && !self.is_stopped() {
            tokio::select! {
                _ = self.pause.changed() => {}
                _ = self.stop.changed() => {}
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressTick {
    pub function_code: FunctionCode,
    pub current_address: u16,
    pub processed: u64,
    pub total: u64,
    pub accessible: u64,
}

impl ProgressTick {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Every record in a chunk came back inaccessible with the same error kind —
/// surfaced distinctly from the ordinary per-record accounting since it
/// usually means the device (or the connection to it) is unreachable for
/// the whole chunk, not just one address.
#[derive(Debug, Clone)]
pub struct ChunkError {
    pub function_code: FunctionCode,
    pub start_address: u16,
    pub end_address: u16,
    pub error: DiscoveryError,
}

type ProgressFn = dyn Fn(ProgressTick) + Send + Sync;
type RecordFn = dyn Fn(&DiscoveryRecord) + Send + Sync;
type ErrorFn = dyn Fn(ChunkError) + Send + Sync;

/// The capability set a caller injects at scan start. All three are
/// optional; a scan run with none still works, it just has no observer.
#[derive(Default)]
pub struct ScanCallbacks {
    pub on_progress: Option<Box<ProgressFn>>,
    pub on_record: Option<Box<RecordFn>>,
    pub on_error: Option<Box<ErrorFn>>,
}

impl ScanCallbacks {
    fn progress(&self, tick: ProgressTick) {
        if let Some(f) = &self.on_progress {
            f(tick);
        }
    }

    fn record(&self, record: &DiscoveryRecord) {
        if let Some(f) = &self.on_record {
            f(record);
        }
    }

    fn error(&self, err: ChunkError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamingOutcome {
    pub processed: u64,
    pub accessible: u64,
    pub stopped: bool,
    /// Records flushed by the Memory Optimizer because no stream consumer
    /// was installed; the caller owns them from here (append to whatever it
    /// collects at the end of the scan, e.g. before a checkpoint save).
    pub buffered_without_consumer: Vec<DiscoveryRecord>,
}

pub struct StreamingScanner {
    config: StreamingConfig,
}

impl StreamingScanner {
    pub fn new(config: StreamingConfig) -> Self {
        Self { config }
    }

    /// Sweeps `range` for every function code in `function_codes`, in order,
    /// chunk by chunk. `cap_for` resolves the per-function-code batch cap
    /// (typically `min(fc.protocol_max_units(), configured max)`).
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        reader: &RegisterReader<'_>,
        batch_optimizer: &mut BatchOptimizer,
        network: Option<&NetworkOptimizer>,
        memory: &MemoryOptimizer,
        range: AddressRange,
        function_codes: &[FunctionCode],
        cap_for: impl Fn(FunctionCode) -> u16,
        priority: i32,
        control: &mut ScanControl,
        callbacks: &ScanCallbacks,
    ) -> StreamingOutcome {
        let total = u64::from(range.len()) * function_codes.len() as u64;
        let mut processed = 0u64;
        let mut accessible = 0u64;
        let mut buffered_without_consumer = Vec::new();
        let mut stopped = false;

        'outer: for &fc in function_codes {
            let cap = cap_for(fc);
            let hi = u32::from(range.hi);
            let mut chunk_start = u32::from(range.lo);

            loop {
                control.wait_while_paused().await;
                if control.is_stopped() {
                    stopped = true;
                    break 'outer;
                }

                let remaining = hi - chunk_start + 1;
                let chunk_len = (self.config.chunk_size as u32).min(remaining);
                let chunk_end = chunk_start + chunk_len - 1;
                let addresses: Vec<u16> = (chunk_start..=chunk_end).map(|a| a as u16).collect();

                debug!(?fc, chunk_start, chunk_end, "streaming chunk");

                let records = match batch_optimizer
                    .run(reader, network, fc, &addresses, cap, priority)
                    .await
                {
                    Ok(records) => records,
                    Err(Cancelled) => {
                        stopped = true;
                        break 'outer;
                    }
                };

                if let Some(chunk_error) = uniform_chunk_error(&records, fc, chunk_start as u16, chunk_end as u16) {
                    callbacks.error(chunk_error);
                }

                for record in &records {
                    processed += 1;
                    if record.accessible {
                        accessible += 1;
                    }
                    callbacks.record(record);
                }

                if let Some(outcome) = memory.add(records).await {
                    if let FlushOutcome::Returned(records) = outcome {
                        buffered_without_consumer.extend(records);
                    }
                }

                callbacks.progress(ProgressTick {
                    function_code: fc,
                    current_address: chunk_end as u16,
                    processed,
                    total,
                    accessible,
                });

                if chunk_end == hi {
                    break;
                }
                chunk_start = chunk_end + 1;
            }
        }

        StreamingOutcome {
            processed,
            accessible,
            stopped,
            buffered_without_consumer,
        }
    }
}

fn uniform_chunk_error(
    records: &[DiscoveryRecord],
    fc: FunctionCode,
    start_address: u16,
    end_address: u16,
) -> Option<ChunkError> {
    let first = records.first()?;
    if first.accessible {
        return None;
    }
    let first_kind = first.error.as_ref().map(|e| e.kind)?;
    let all_uniform = records
        .iter()
        .all(|r| !r.accessible && r.error.as_ref().map(|e| e.kind) == Some(first_kind));
    if !all_uniform {
        return None;
    }
    first.error.clone().map(|error| ChunkError {
        function_code: fc,
        start_address,
        end_address,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_size_caps_at_1000() {
        assert_eq!(default_chunk_size(100_000), 1000);
    }

    #[test]
    fn default_chunk_size_is_a_tenth_of_threshold() {
        assert_eq!(default_chunk_size(2_000), 200);
    }

    #[test]
    fn default_chunk_size_floors_at_one() {
        assert_eq!(default_chunk_size(0), 1);
        assert_eq!(default_chunk_size(5), 1);
    }

    #[tokio::test]
    async fn scan_control_unblocks_on_stop_while_paused() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (_pause_tx, pause_rx) = watch::channel(true);
        let mut control = ScanControl::new(stop_rx, pause_rx);

        let waiter = tokio::spawn(async move {
            control.wait_while_paused().await;
            control.is_stopped()
        });

        stop_tx.send(true).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn scan_control_unblocks_on_resume() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (pause_tx, pause_rx) = watch::channel(true);
        let mut control = ScanControl::new(stop_rx, pause_rx);

        let waiter = tokio::spawn(async move {
            control.wait_while_paused().await;
            control.is_paused()
        });

        pause_tx.send(false).unwrap();
        assert!(!waiter.await.unwrap());
    }

    fn record(address: u16, accessible: bool, kind: Option<types::ReadErrorKind>) -> DiscoveryRecord {
        if accessible {
            DiscoveryRecord::accessible(
                address,
                FunctionCode::HoldingRegisters,
                types::RegisterValue::U16(1),
            )
        } else {
            DiscoveryRecord::inaccessible(
                address,
                FunctionCode::HoldingRegisters,
                DiscoveryError::new(kind.unwrap(), "unreachable"),
            )
        }
    }

    #[test]
    fn uniform_chunk_error_detects_shared_failure_kind() {
        let records = vec![
            record(0, false, Some(types::ReadErrorKind::Timeout)),
            record(1, false, Some(types::ReadErrorKind::Timeout)),
        ];
        let chunk_error =
            uniform_chunk_error(&records, FunctionCode::HoldingRegisters, 0, 1).expect("uniform failure");
        assert_eq!(chunk_error.error.kind, types::ReadErrorKind::Timeout);
    }

    #[test]
    fn uniform_chunk_error_ignores_mixed_outcomes() {
        let records = vec![
            record(0, true, None),
            record(1, false, Some(types::ReadErrorKind::Timeout)),
        ];
        assert!(uniform_chunk_error(&records, FunctionCode::HoldingRegisters, 0, 1).is_none());
    }
}
