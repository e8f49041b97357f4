#![allow(dead_code)]

//! A single-producer, single-consumer request gate: a priority-ordered FIFO
//! queue in front of the Modbus connection, with an inter-request delay that
//! adapts to observed latency and error rate. Modbus/TCP cannot safely
//! multiplex on one client connection, so `max_concurrent` defaults to 1.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::time::sleep;
use tracing::debug;

use types::RequestTimingRecord;

const RING_CAPACITY: usize = 1000;
const DEFAULT_WINDOW: usize = 20;
const DEFAULT_MAX_DELAY_MS: u64 = 1_000;
const HIGH_ERROR_RATE: f64 = 0.10;
const LOW_ERROR_RATE: f64 = 0.05;
const HIGH_MEAN_DURATION_MS: f64 = 1_000.0;
const LOW_MEAN_DURATION_MS: f64 = 200.0;
const GROWTH_FACTOR: f64 = 1.2;
const DECAY_FACTOR: f64 = 0.9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError<E> {
    #[error("request was cancelled before it ran")]
    Cancelled,
    #[error(transparent)]
    Thunk(E),
}

#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub baseline_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_concurrent: usize,
    pub window: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            baseline_delay_ms: 0,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_concurrent: 1,
            window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
struct Ticket {
    priority: i32,
    seq: u64,
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; FIFO (lower seq first) within a priority.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    current_delay_ms: u64,
    timings: VecDeque<RequestTimingRecord>,
    queue: BinaryHeap<Ticket>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

/// The adaptive request gate. Cloning is not provided; share via `Arc`.
pub struct NetworkOptimizer {
    config: PacingConfig,
    inner: Mutex<Inner>,
    notify: Notify,
    semaphore: Semaphore,
}

impl NetworkOptimizer {
    pub fn new(config: PacingConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            inner: Mutex::new(Inner {
                current_delay_ms: config.baseline_delay_ms,
                timings: VecDeque::with_capacity(RING_CAPACITY),
                queue: BinaryHeap::new(),
                cancelled: HashSet::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
            config,
        }
    }

    pub async fn current_delay_ms(&self) -> u64 {
        self.inner.lock().await.current_delay_ms
    }

    pub async fn recent_timings(&self) -> Vec<RequestTimingRecord> {
        self.inner.lock().await.timings.iter().cloned().collect()
    }

    /// Enqueues `thunk`, waits its turn (priority, then FIFO), applies the
    /// current inter-request delay, then runs it and records its timing.
    /// Success/failure for the adaptive pacer is taken from `Result::is_ok`;
    /// use [`NetworkOptimizer::gate`] when the caller's notion of failure
    /// isn't a Rust `Err` (e.g. a device exception folded into `Ok`).
    pub async fn submit<F, Fut, T, E>(
        &self,
        thunk: F,
        priority: i32,
        estimated_bytes: usize,
    ) -> Result<T, SubmitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = self.acquire_turn(priority).await?;
        let start = Utc::now();
        let result = thunk().await;
        let end = Utc::now();
        self.record_timing(result.is_ok(), start, end, estimated_bytes)
            .await;
        result.map_err(SubmitError::Thunk)
    }

    /// Same queueing and delay as [`NetworkOptimizer::submit`], but the
    /// thunk returns a plain value and `success` inspects it to classify the
    /// attempt for the adaptive pacer. This is how register reads are gated:
    /// a read that completes but comes back as a device exception or a
    /// transport timeout must still count as a failure for pacing purposes,
    /// even though it's surfaced to the caller as `Ok(inaccessible records)`.
    pub async fn gate<F, Fut, T>(
        &self,
        thunk: F,
        priority: i32,
        estimated_bytes: usize,
        success: impl FnOnce(&T) -> bool,
    ) -> Result<T, SubmitError<std::convert::Infallible>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire_turn(priority).await?;
        let start = Utc::now();
        let value = thunk().await;
        let end = Utc::now();
        let ok = success(&value);
        self.record_timing(ok, start, end, estimated_bytes).await;
        Ok(value)
    }

    async fn acquire_turn<E>(
        &self,
        priority: i32,
    ) -> Result<tokio::sync::SemaphorePermit<'_>, SubmitError<E>> {
        let seq = self.enqueue(priority).await;
        self.wait_for_turn(seq).await?;

        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        let delay_ms = self.current_delay_ms().await;
        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
        Ok(permit)
    }

    /// Runs `thunks` in fixed-size chunks; within a chunk each thunk is
    /// awaited in submission order, with the current delay separating
    /// chunks. Drains every thunk before surfacing the first error seen.
    pub async fn submit_batch<F, Fut, T, E>(
        &self,
        thunks: Vec<F>,
        chunk_size: usize,
    ) -> Result<Vec<T>, SubmitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let chunk_size = chunk_size.max(1);
        let mut results = Vec::with_capacity(thunks.len());
        let mut first_error = None;

        let mut chunks = thunks.into_iter().peekable();
        while chunks.peek().is_some() {
            let chunk: Vec<F> = (&mut chunks).take(chunk_size).collect();
            for thunk in chunk {
                match thunk().await {
                    Ok(value) => results.push(value),
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
            if chunks.peek().is_some() {
                let delay_ms = self.current_delay_ms().await;
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        match first_error {
            Some(err) => Err(SubmitError::Thunk(err)),
            None => Ok(results),
        }
    }

    /// Rejects every queued (not yet running) request with `Cancelled`.
    /// In-flight requests already past the queue are left to drain.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        for ticket in inner.queue.drain() {
            inner.cancelled.insert(ticket.seq);
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    async fn enqueue(&self, priority: i32) -> u64 {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(Ticket { priority, seq });
        drop(inner);
        self.notify.notify_waiters();
        seq
    }

    async fn wait_for_turn<E>(&self, seq: u64) -> Result<(), SubmitError<E>> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.cancelled.remove(&seq) {
                    return Err(SubmitError::Cancelled);
                }
                if inner.queue.peek().map(|t| t.seq) == Some(seq) {
                    inner.queue.pop();
                    return Ok(());
                }
            }
            self.notify.notified().await;
        }
    }

    async fn record_timing(
        &self,
        success: bool,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        estimated_bytes: usize,
    ) {
        let mut inner = self.inner.lock().await;
        let timing = if success {
            RequestTimingRecord::success(start, end, estimated_bytes)
        } else {
            RequestTimingRecord::failure(start, end, estimated_bytes, "request failed")
        };
        inner.timings.push_back(timing);
        while inner.timings.len() > RING_CAPACITY {
            inner.timings.pop_front();
        }
        recompute_delay(&mut inner, &self.config);
        debug!(delay_ms = inner.current_delay_ms, "adaptive delay updated");
    }
}

fn recompute_delay(inner: &mut Inner, config: &PacingConfig) {
    let window = config.window.max(1);
    let sample: Vec<&RequestTimingRecord> = inner.timings.iter().rev().take(window).collect();
    if sample.is_empty() {
        return;
    }

    let errors = sample.iter().filter(|t| !t.success).count();
    let error_rate = errors as f64 / sample.len() as f64;
    let mean_duration_ms = sample
        .iter()
        .map(|t| t.duration.as_millis() as f64)
        .sum::<f64>()
        / sample.len() as f64;

    if error_rate > HIGH_ERROR_RATE || mean_duration_ms > HIGH_MEAN_DURATION_MS {
        let base = inner.current_delay_ms.max(1);
        inner.current_delay_ms = ((base as f64 * GROWTH_FACTOR) as u64).min(config.max_delay_ms);
    } else if error_rate < LOW_ERROR_RATE && mean_duration_ms < LOW_MEAN_DURATION_MS {
        let candidate = (inner.current_delay_ms as f64 * DECAY_FACTOR) as u64;
        inner.current_delay_ms = candidate.max(config.baseline_delay_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submits_run_and_record_success() {
        let optimizer = NetworkOptimizer::new(PacingConfig::default());
        let result: Result<u32, ()> = optimizer.submit(|| async { Ok(42) }, 0, 16).await;
        assert_eq!(result, Ok(42));
        assert_eq!(optimizer.recent_timings().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_cancels_only_queued_items() {
        let optimizer = NetworkOptimizer::new(PacingConfig::default());
        optimizer.clear().await;
        let result: Result<u32, ()> = optimizer.submit(|| async { Ok(1) }, 0, 0).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn pacing_slows_down_after_errors() {
        let optimizer = NetworkOptimizer::new(PacingConfig::default());
        for _ in 0..20 {
            let _: Result<(), ()> = optimizer.submit(|| async { Ok(()) }, 0, 0).await;
        }
        let after_success = optimizer.current_delay_ms().await;

        for _ in 0..10 {
            let _: Result<(), &str> = optimizer.submit(|| async { Err("boom") }, 0, 0).await;
        }
        let after_errors = optimizer.current_delay_ms().await;

        assert!(after_errors > after_success);
        assert!(after_errors <= PacingConfig::default().max_delay_ms);
    }

    #[tokio::test]
    async fn gate_classifies_success_from_the_returned_value_not_result() {
        let optimizer = NetworkOptimizer::new(PacingConfig::default());
        for _ in 0..20 {
            optimizer
                .gate(|| async { true }, 0, 0, |ok| *ok)
                .await
                .unwrap();
        }
        let after_success = optimizer.current_delay_ms().await;

        for _ in 0..10 {
            optimizer
                .gate(|| async { false }, 0, 0, |ok| *ok)
                .await
                .unwrap();
        }
        let after_failures = optimizer.current_delay_ms().await;

        assert!(after_failures > after_success);
        let timings = optimizer.recent_timings().await;
        assert!(timings.iter().rev().take(10).all(|t| !t.success));
    }

    #[tokio::test]
    async fn submit_batch_drains_and_surfaces_first_error() {
        type Thunk = fn() -> std::pin::Pin<Box<dyn Future<Output = Result<i32, &'static str>> + Send>>;
        let optimizer = NetworkOptimizer::new(PacingConfig::default());
        let thunks: Vec<Thunk> = vec![
            || Box::pin(async { Ok(1) }),
            || Box::pin(async { Err("bad") }),
            || Box::pin(async { Ok(3) }),
        ];
        let result = optimizer.submit_batch(thunks, 2).await;
        assert_eq!(result, Err(SubmitError::Thunk("bad")));
    }
}
