// SPDX-License-Identifier: MIT

//! The most recent contents of each report.
//!
//! One [ReportBuffer] per Report ID, sized from the descriptor. A buffer is
//! served from the cache while younger than the caller's `max_age`, otherwise
//! it is refilled from the device. A zero `max_age` always refills.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::{ItemKind, ReportDescriptor, TransportError};

/// How long a report stays fresh unless configured otherwise.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ReportBuffer {
    bytes: Vec<u8>,
    /// The number of bytes the last fill provided
    valid: usize,
    timestamp: Option<Instant>,
}

impl ReportBuffer {
    fn new(capacity: usize) -> Self {
        ReportBuffer {
            bytes: vec![0; capacity],
            valid: 0,
            timestamp: None,
        }
    }

    /// The bytes of the last fill, Report ID byte included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.valid]
    }

    /// The size declared by the descriptor.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// When the buffer was last filled, `None` if never.
    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    fn is_fresh(&self, max_age: Duration, now: Instant) -> bool {
        match self.timestamp {
            Some(ts) => !max_age.is_zero() && now.saturating_duration_since(ts) < max_age,
            None => false,
        }
    }

    /// Replace the contents. Data beyond the capacity is dropped.
    fn fill(&mut self, data: &[u8], now: Instant) {
        let n = data.len().min(self.bytes.len());
        self.bytes[..n].copy_from_slice(&data[..n]);
        self.bytes[n..].fill(0);
        self.valid = n;
        self.timestamp = Some(now);
    }
}

#[derive(Debug, Default)]
pub struct ReportCache {
    buffers: HashMap<u8, ReportBuffer>,
}

impl ReportCache {
    /// One empty buffer for every report the descriptor declares.
    pub fn new(descriptor: &ReportDescriptor) -> Self {
        let buffers = descriptor
            .report_ids()
            .into_iter()
            .filter_map(|id| descriptor.report_len(id).map(|len| (id, ReportBuffer::new(len))))
            .collect();
        ReportCache { buffers }
    }

    /// Return the report bytes, refilling them with `refill` first unless the
    /// cached copy is younger than `max_age`. On error the buffer keeps its
    /// previous contents.
    pub fn get_or_refill<F>(
        &mut self,
        report_id: u8,
        kind: ItemKind,
        max_age: Duration,
        refill: F,
    ) -> Result<&[u8], TransportError>
    where
        F: FnOnce(u8, ItemKind) -> Result<Vec<u8>, TransportError>,
    {
        let now = Instant::now();
        let fresh = self
            .buffers
            .get(&report_id)
            .is_some_and(|buf| buf.is_fresh(max_age, now));
        if !fresh {
            let data = refill(report_id, kind)?;
            self.fill(report_id, &data, Instant::now());
        }
        Ok(self.buffers.get(&report_id).map(|buf| buf.bytes()).unwrap_or(&[]))
    }

    /// The cached bytes regardless of age, `None` if never filled.
    pub fn get(&self, report_id: u8) -> Option<&[u8]> {
        self.buffers
            .get(&report_id)
            .filter(|buf| buf.timestamp.is_some())
            .map(|buf| buf.bytes())
    }

    pub fn buffer(&self, report_id: u8) -> Option<&ReportBuffer> {
        self.buffers.get(&report_id)
    }

    /// Replace the cached bytes, e.g. with an interrupt report or a
    /// report that was just written.
    pub fn store(&mut self, report_id: u8, data: &[u8]) {
        self.fill(report_id, data, Instant::now());
    }

    /// A zeroed buffer of the declared size for building a report from
    /// scratch, with the Report ID byte set. At least `min_len` bytes.
    pub fn blank(&self, report_id: u8, min_len: usize) -> Vec<u8> {
        let capacity = self.buffers.get(&report_id).map(|b| b.capacity()).unwrap_or(0);
        let mut bytes = vec![0; capacity.max(min_len)];
        if report_id != 0 {
            if let Some(first) = bytes.first_mut() {
                *first = report_id;
            }
        }
        bytes
    }

    /// Mark a report stale so the next access refills it.
    pub fn invalidate(&mut self, report_id: u8) {
        if let Some(buf) = self.buffers.get_mut(&report_id) {
            buf.timestamp = None;
        }
    }

    pub fn invalidate_all(&mut self) {
        self.buffers.values_mut().for_each(|buf| buf.timestamp = None);
    }

    fn fill(&mut self, report_id: u8, data: &[u8], now: Instant) {
        self.buffers
            .entry(report_id)
            .or_insert_with(|| ReportBuffer::new(data.len()))
            .fill(data, now);
    }
}
