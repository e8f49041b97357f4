#![allow(dead_code)]

//! Turns a sorted address sequence into the minimum number of contiguous
//! batch reads bounded by a per-function-code cap, with fallback to
//! individual reads when a batch comes back classified as a decode,
//! timeout, or busy-device failure. Stateless between scans: a fresh
//! `BatchOptimizer` holds no network resources, only the running
//! statistics a caller can read for progress reporting.

use std::collections::HashMap;

use tracing::debug;

use network_optimizer::NetworkOptimizer;
use register_reader::{ReaderError, RegisterReader};
use types::{DiscoveryRecord, FunctionCode, ReadErrorKind};

/// The batch (or the fallback singles that replaced it) was cancelled by a
/// [`NetworkOptimizer::clear`] while still queued — the caller stopped the
/// scan before this request ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Running counters over the batches a `BatchOptimizer` has attempted.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub attempts: u64,
    pub successes: u64,
    pub fallbacks: u64,
    pub size_histogram: HashMap<u16, u64>,
}

impl BatchStats {
    /// successful batch reads / attempted batch reads; `0.0` before any attempt.
    pub fn efficiency(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchOptimizer {
    stats: BatchStats,
}

impl BatchOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Reads every address in `addresses` for `fc`, batching contiguous runs
    /// up to `cap` units and falling back to singles on the errors the
    /// batch-planning policy calls for. `addresses` must already be sorted
    /// ascending; the caller (the engine) guarantees this since it always
    /// walks an `AddressRange` in order.
    ///
    /// When `network` is installed, each device read (batch or single) runs
    /// under its gate: the request is paced and its outcome — accessible or
    /// not, not just `Result::is_ok` — feeds the adaptive delay. `priority`
    /// is forwarded to the gate unchanged.
    pub async fn run(
        &mut self,
        reader: &RegisterReader<'_>,
        network: Option<&NetworkOptimizer>,
        fc: FunctionCode,
        addresses: &[u16],
        cap: u16,
        priority: i32,
    ) -> Result<Vec<DiscoveryRecord>, Cancelled> {
        let mut out = Vec::with_capacity(addresses.len());
        for (lo, hi) in plan_batches(addresses, cap) {
            out.extend(self.run_batch(reader, network, fc, lo, hi, priority).await?);
        }
        Ok(out)
    }

    async fn run_batch(
        &mut self,
        reader: &RegisterReader<'_>,
        network: Option<&NetworkOptimizer>,
        fc: FunctionCode,
        lo: u16,
        hi: u16,
        priority: i32,
    ) -> Result<Vec<DiscoveryRecord>, Cancelled> {
        let count = hi - lo + 1;
        self.stats.attempts += 1;

        let records = self.gated_read(reader, network, fc, lo, count, priority).await?;

        if records.iter().all(|record| record.accessible) {
            self.stats.successes += 1;
            *self.stats.size_histogram.entry(count).or_insert(0) += 1;
            return Ok(records);
        }

        let kind = records.first().and_then(|r| r.error.as_ref()).map(|e| e.kind);
        match kind {
            Some(ReadErrorKind::Decode)
            | Some(ReadErrorKind::Timeout)
            | Some(ReadErrorKind::SlaveDeviceBusy)
                if count > 1 =>
            {
                debug!(?fc, lo, hi, ?kind, "batch fallback to singles");
                self.stats.fallbacks += 1;
                let mut out = Vec::with_capacity(count as usize);
                for address in lo..=hi {
                    let single = self.gated_read(reader, network, fc, address, 1, priority).await?;
                    out.extend(single);
                }
                Ok(out)
            }
            // IllegalDataAddress (and everything else): the device has
            // declared the range unsupported or failed outright; propagate
            // the classified error to every address without per-address
            // probing.
            _ => Ok(records),
        }
    }

    async fn gated_read(
        &self,
        reader: &RegisterReader<'_>,
        network: Option<&NetworkOptimizer>,
        fc: FunctionCode,
        address: u16,
        count: u16,
        priority: i32,
    ) -> Result<Vec<DiscoveryRecord>, Cancelled> {
        let estimated_bytes = count as usize * 2;
        let outcome = match network {
            Some(net) => net
                .gate(
                    || reader.read(address, count, fc),
                    priority,
                    estimated_bytes,
                    batch_succeeded,
                )
                .await
                .map_err(|_| Cancelled)?,
            None => reader.read(address, count, fc).await,
        };
        Ok(outcome.unwrap_or_else(|_| unreachable_read_error(address, count, fc)))
    }
}

fn batch_succeeded(result: &Result<Vec<DiscoveryRecord>, ReaderError>) -> bool {
    result
        .as_ref()
        .map(|records| records.iter().all(|r| r.accessible))
        .unwrap_or(false)
}

/// Splits `addresses` into the minimum number of contiguous runs bounded by
/// `cap`. Exposed standalone so planning can be tested without a reader.
pub fn plan_batches(addresses: &[u16], cap: u16) -> Vec<(u16, u16)> {
    let cap = cap.max(1);
    let mut batches = Vec::new();
    let mut i = 0;
    while i < addresses.len() {
        let lo = addresses[i];
        let mut hi = lo;
        let mut len: u16 = 1;
        let mut j = i + 1;
        while j < addresses.len() && len < cap && addresses[j] == hi.wrapping_add(1) {
            hi = addresses[j];
            len += 1;
            j += 1;
        }
        batches.push((lo, hi));
        i = j;
    }
    batches
}

fn unreachable_read_error(address: u16, count: u16, fc: FunctionCode) -> Vec<DiscoveryRecord> {
    // register_reader::read only rejects zero/over-cap counts; the batch
    // optimizer always requests counts in [1, cap] where cap <= fc's
    // protocol maximum, so this path is never taken in practice.
    (0..count)
        .map(|offset| {
            DiscoveryRecord::inaccessible(
                address.wrapping_add(offset),
                fc,
                types::DiscoveryError::new(ReadErrorKind::Unknown, "unreachable read precondition"),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_one_contiguous_run_into_ceil_k_over_c_batches() {
        let addresses: Vec<u16> = (0..10).collect();
        let batches = plan_batches(&addresses, 3);
        assert_eq!(batches.len(), 4); // ceil(10/3)
        assert_eq!(batches[0], (0, 2));
        assert_eq!(batches[3], (9, 9));
    }

    #[test]
    fn cap_larger_than_run_yields_one_batch() {
        let addresses: Vec<u16> = (0..10).collect();
        let batches = plan_batches(&addresses, 125);
        assert_eq!(batches, vec![(0, 9)]);
    }

    #[test]
    fn splits_on_gaps_even_under_cap() {
        let addresses = vec![0, 1, 2, 10, 11];
        let batches = plan_batches(&addresses, 125);
        assert_eq!(batches, vec![(0, 2), (10, 11)]);
    }

    #[test]
    fn single_address_is_its_own_batch() {
        let addresses = vec![5];
        let batches = plan_batches(&addresses, 125);
        assert_eq!(batches, vec![(5, 5)]);
    }
}
