#![allow(dead_code)]

//! A bounded, in-process buffer of discovery records with a pluggable
//! streaming handoff. The buffer is how the scanner keeps memory flat on a
//! full 65,536-address sweep: once it reaches the streaming threshold it
//! flushes, either to a stream consumer (an mpsc channel, so a slow
//! consumer naturally backpressures the producer) or back to the caller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sysinfo::{Pid, System};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::warn;

use types::DiscoveryRecord;

const MAX_SAMPLES: usize = 100;
const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_HARD_CAP_BYTES: u64 = 500 * 1024 * 1024;
const DEFAULT_HEALTH_CAP_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub heap_in_use_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryOptimizerConfig {
    pub streaming_threshold: usize,
    pub sample_interval: Duration,
    pub hard_cap_bytes: u64,
    pub max_buffered: usize,
}

impl Default for MemoryOptimizerConfig {
    fn default() -> Self {
        Self {
            streaming_threshold: 1_000,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            hard_cap_bytes: DEFAULT_HARD_CAP_BYTES,
            max_buffered: 100_000,
        }
    }
}

/// What happened when the buffer was flushed: handed to the stream consumer,
/// or returned to the caller because no consumer is installed.
#[derive(Debug)]
pub enum FlushOutcome {
    Streamed,
    Returned(Vec<DiscoveryRecord>),
}

pub struct MemoryOptimizer {
    config: MemoryOptimizerConfig,
    buffer: Mutex<Vec<DiscoveryRecord>>,
    consumer: Option<mpsc::Sender<Vec<DiscoveryRecord>>>,
    total_added: AtomicUsize,
    samples: Mutex<VecDeque<MemorySample>>,
}

impl MemoryOptimizer {
    pub fn new(config: MemoryOptimizerConfig, consumer: Option<mpsc::Sender<Vec<DiscoveryRecord>>>) -> Self {
        Self {
            config,
            buffer: Mutex::new(Vec::new()),
            consumer,
            total_added: AtomicUsize::new(0),
            samples: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
        }
    }

    /// Appends `records` to the buffer. If the buffer has reached the
    /// streaming threshold, flushes immediately and returns the outcome.
    pub async fn add(&self, records: Vec<DiscoveryRecord>) -> Option<FlushOutcome> {
        let added = records.len();
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.extend(records);
            buffer.len() >= self.config.streaming_threshold
        };
        self.total_added.fetch_add(added, Ordering::Relaxed);

        if should_flush {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Moves the buffer's contents to the stream consumer (awaiting its
    /// acknowledgment, which is how a slow consumer applies backpressure)
    /// or returns them to the caller when no consumer is installed. The
    /// buffer is always empty immediately after this returns.
    pub async fn flush(&self) -> FlushOutcome {
        let records = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };

        if records.is_empty() {
            return FlushOutcome::Returned(records);
        }

        match &self.consumer {
            Some(consumer) => match consumer.send(records).await {
                Ok(()) => FlushOutcome::Streamed,
                Err(mpsc::error::SendError(records)) => {
                    warn!("stream consumer dropped; returning records to caller");
                    FlushOutcome::Returned(records)
                }
            },
            None => FlushOutcome::Returned(records),
        }
    }

    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Copies the buffer's current contents without flushing it. Used by a
    /// checkpoint save that wants "what's accumulated so far" without
    /// disturbing the streaming handoff in progress.
    pub async fn snapshot(&self) -> Vec<DiscoveryRecord> {
        self.buffer.lock().await.clone()
    }

    pub fn total_added(&self) -> usize {
        self.total_added.load(Ordering::Relaxed)
    }

    /// Samples this process's resident memory via `sysinfo`, retaining at
    /// most the last 100 samples. When the sample exceeds the hard cap, the
    /// buffer is force-flushed as a GC hint.
    pub async fn sample_once(&self) -> MemorySample {
        let mut sys = System::new();
        let pid = Pid::from_u32(std::process::id());
        sys.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            true,
            sysinfo::ProcessRefreshKind::new().with_memory(),
        );
        let heap_in_use_bytes = sys.process(pid).map(|p| p.memory()).unwrap_or(0);

        let sample = MemorySample {
            timestamp: Utc::now(),
            heap_in_use_bytes,
        };

        {
            let mut samples = self.samples.lock().await;
            samples.push_back(sample);
            while samples.len() > MAX_SAMPLES {
                samples.pop_front();
            }
        }

        if heap_in_use_bytes > self.config.hard_cap_bytes {
            warn!(
                heap_in_use_bytes,
                hard_cap_bytes = self.config.hard_cap_bytes,
                "heap usage over hard cap, forcing a flush"
            );
            let _ = self.flush().await;
        }

        sample
    }

    pub async fn latest_sample(&self) -> Option<MemorySample> {
        self.samples.lock().await.back().copied()
    }

    pub async fn samples(&self) -> Vec<MemorySample> {
        self.samples.lock().await.iter().copied().collect()
    }

    /// `heap-in-use < 1GB AND buffered count <= configured max`.
    pub async fn is_healthy(&self) -> bool {
        let memory_ok = self
            .latest_sample()
            .await
            .map(|sample| sample.heap_in_use_bytes < DEFAULT_HEALTH_CAP_BYTES)
            .unwrap_or(true);
        let buffer_ok = self.buffered_len().await <= self.config.max_buffered;
        memory_ok && buffer_ok
    }

    /// Samples on `config.sample_interval` until `shutdown` is set to `true`.
    pub async fn run_sampling_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.sample_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sample_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FunctionCode, RegisterValue};

    fn record(address: u16) -> DiscoveryRecord {
        DiscoveryRecord::accessible(address, FunctionCode::HoldingRegisters, RegisterValue::U16(1))
    }

    #[tokio::test]
    async fn add_below_threshold_does_not_flush() {
        let optimizer = MemoryOptimizer::new(
            MemoryOptimizerConfig {
                streaming_threshold: 10,
                ..Default::default()
            },
            None,
        );
        let outcome = optimizer.add(vec![record(0), record(1)]).await;
        assert!(outcome.is_none());
        assert_eq!(optimizer.buffered_len().await, 2);
        assert_eq!(optimizer.total_added(), 2);
    }

    #[tokio::test]
    async fn add_at_threshold_flushes_and_empties_buffer() {
        let optimizer = MemoryOptimizer::new(
            MemoryOptimizerConfig {
                streaming_threshold: 2,
                ..Default::default()
            },
            None,
        );
        let outcome = optimizer.add(vec![record(0), record(1)]).await;
        match outcome {
            Some(FlushOutcome::Returned(records)) => assert_eq!(records.len(), 2),
            other => panic!("expected Returned, got {other:?}"),
        }
        assert_eq!(optimizer.buffered_len().await, 0);
    }

    #[tokio::test]
    async fn snapshot_does_not_drain_the_buffer() {
        let optimizer = MemoryOptimizer::new(
            MemoryOptimizerConfig {
                streaming_threshold: 10,
                ..Default::default()
            },
            None,
        );
        optimizer.add(vec![record(0)]).await;
        let snapshot = optimizer.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(optimizer.buffered_len().await, 1);
    }

    #[tokio::test]
    async fn flush_streams_to_consumer_when_installed() {
        let (tx, mut rx) = mpsc::channel(4);
        let optimizer = MemoryOptimizer::new(
            MemoryOptimizerConfig {
                streaming_threshold: 1,
                ..Default::default()
            },
            Some(tx),
        );
        optimizer.add(vec![record(0)]).await;
        let received = rx.recv().await.expect("consumer receives records");
        assert_eq!(received.len(), 1);
    }
}
