// SPDX-License-Identifier: MIT

//! A parsed descriptor bound to a device.
//!
//! A [Session] owns the [ReportDescriptor], its [PathIndex], the [ReportCache]
//! and the [Transport], and exposes the path based reads and writes of the
//! [access] module with the [Config]ured cache age and timeout.
//!
//! Sessions are not shared between threads, the cache is not synchronized.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::access::{self, AccessError, AccessResult};
use crate::path::PathIndex;
use crate::report::ReportCache;
use crate::usage::UsageTables;
use crate::{
    Config, DataItem, ItemKind, ParserError, ReportDescriptor, Transport, TransportError,
};

pub struct Session<T> {
    descriptor: ReportDescriptor,
    index: PathIndex,
    cache: ReportCache,
    transport: T,
    config: Config,
}

impl<T: Transport> Session<T> {
    /// Parse `raw` and prepare the index and cache.
    pub fn open(
        raw: &[u8],
        tables: &UsageTables,
        transport: T,
        config: Config,
    ) -> Result<Self, ParserError> {
        let descriptor = ReportDescriptor::parse(raw, tables)?;
        Ok(Self::with_descriptor(descriptor, transport, config))
    }

    /// Like [Session::open] but let `fixup` patch the descriptor bytes first,
    /// also returns whether it changed anything.
    pub fn open_with_fixup<F>(
        raw: &[u8],
        tables: &UsageTables,
        fixup: F,
        transport: T,
        config: Config,
    ) -> Result<(Self, bool), ParserError>
    where
        F: FnOnce(&mut [u8]) -> bool,
    {
        let (descriptor, changed) = ReportDescriptor::parse_with_fixup(raw, tables, fixup)?;
        Ok((Self::with_descriptor(descriptor, transport, config), changed))
    }

    pub fn with_descriptor(descriptor: ReportDescriptor, transport: T, config: Config) -> Self {
        let index = PathIndex::build(descriptor.items());
        let cache = ReportCache::new(&descriptor);
        Session {
            descriptor,
            index,
            cache,
            transport,
            config,
        }
    }

    pub fn descriptor(&self) -> &ReportDescriptor {
        &self.descriptor
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Whether `path` names an item, without touching the device.
    pub fn contains(&self, path: &str) -> bool {
        self.index.lookup(path, None).is_some()
    }

    pub fn lookup(&self, path: &str, preference: Option<ItemKind>) -> Option<&Arc<DataItem>> {
        self.index.lookup(path, preference)
    }

    /// Read `path`, see [PathIndex::lookup] for `preference`.
    pub fn get(
        &mut self,
        path: &str,
        preference: Option<ItemKind>,
    ) -> Result<AccessResult, AccessError> {
        let timeout = self.config.transport_timeout;
        access::get(
            &self.index,
            &mut self.cache,
            path,
            preference,
            self.config.max_age,
            |id, kind| self.transport.get_report(id, kind, timeout),
        )
    }

    /// Read `path` even if the cached report is fresh.
    pub fn get_fresh(
        &mut self,
        path: &str,
        preference: Option<ItemKind>,
    ) -> Result<AccessResult, AccessError> {
        let timeout = self.config.transport_timeout;
        access::get(
            &self.index,
            &mut self.cache,
            path,
            preference,
            Duration::ZERO,
            |id, kind| self.transport.get_report(id, kind, timeout),
        )
    }

    pub fn get_value(&mut self, path: &str) -> Result<f64, AccessError> {
        self.get(path, None).map(|r| r.value)
    }

    pub fn set_value(&mut self, path: &str, value: f64) -> Result<(), AccessError> {
        let timeout = self.config.transport_timeout;
        let transport = RefCell::new(&mut self.transport);
        access::set_value(
            &self.index,
            &mut self.cache,
            path,
            None,
            value,
            |id, kind| transport.borrow_mut().get_report(id, kind, timeout),
            |id, bytes| transport.borrow_mut().set_report(id, bytes),
        )
    }

    /// Write one item, see [access::set_value].
    pub fn write_item(&mut self, item: &DataItem, value: f64) -> Result<(), AccessError> {
        let timeout = self.config.transport_timeout;
        let transport = RefCell::new(&mut self.transport);
        access::write_item(
            item,
            &mut self.cache,
            value,
            |id, kind| transport.borrow_mut().get_report(id, kind, timeout),
            |id, bytes| transport.borrow_mut().set_report(id, bytes),
        )
    }

    /// Read one item, refilling its report if stale.
    pub fn read_item(&mut self, item: &DataItem) -> Result<AccessResult, AccessError> {
        let timeout = self.config.transport_timeout;
        access::read_item(item, &mut self.cache, self.config.max_age, |id, kind| {
            self.transport.get_report(id, kind, timeout)
        })
    }

    /// Store an input report received on the interrupt pipe and decode every
    /// item of that report. Items that do not fit the received bytes are skipped.
    pub fn handle_interrupt(&mut self, bytes: &[u8]) -> Vec<(Arc<DataItem>, AccessResult)> {
        let report_id = match (self.descriptor.is_numbered(), bytes.first()) {
            (true, Some(id)) => *id,
            _ => 0,
        };
        self.cache.store(report_id, bytes);
        self.descriptor
            .items_in_report(report_id, ItemKind::Input)
            .filter_map(|item| {
                access::read_cached(item, &self.cache).map(|result| (Arc::clone(item), result))
            })
            .collect()
    }

    /// Wait for one interrupt report and handle it. A timeout is not an error
    /// and yields no events.
    pub fn poll_interrupt(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<(Arc<DataItem>, AccessResult)>, TransportError> {
        match self.transport.read_interrupt(timeout) {
            Ok(bytes) if bytes.is_empty() => Ok(vec![]),
            Ok(bytes) => Ok(self.handle_interrupt(&bytes)),
            Err(TransportError::Timeout) => Ok(vec![]),
            Err(e) => Err(e),
        }
    }

    /// Every item with its current value.
    pub fn dump(&mut self) -> Vec<(Arc<DataItem>, Result<AccessResult, AccessError>)> {
        let items: Vec<Arc<DataItem>> = self.descriptor.items().to_vec();
        items
            .into_iter()
            .map(|item| {
                let result = self.read_item(&item);
                (item, result)
            })
            .collect()
    }

    pub fn invalidate(&mut self, report_id: u8) {
        self.cache.invalidate(report_id)
    }

    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all()
    }

    /// Fetch a string descriptor, e.g. for items like `iProduct`.
    pub fn get_string(&mut self, index: u8) -> Result<String, TransportError> {
        self.transport.get_string(index)
    }
}
