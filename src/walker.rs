// SPDX-License-Identifier: MIT

//! The table walker that turns a subdriver's [HidInfo] rows into driver
//! variables, status words, alarms and instant commands.
//!
//! A [Driver] is opened on a raw report descriptor and a [Transport]. The
//! init walk resolves every row against the descriptor once, later walks only
//! read what their [WalkMode] asks for. [Driver::update] is one poll cycle:
//! interrupt reports first, then a quick or full walk, then the status is
//! committed to the [DataStore].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, trace, warn};
use thiserror::Error;

use crate::access::{AccessError, AccessResult};
use crate::convert::{format_value, Conversion};
use crate::status::StatusFlags;
use crate::subdriver::{
    select_subdriver, DeviceDescriptor, HidFlags, HidInfo, InfoFlags, Subdriver, Target,
};
use crate::{Config, DataItem, ItemKind, ParserError, Session, Transport, TransportError};

/// Template rows are tried for at most this many indexes.
const MAX_TEMPLATE_INDEX: u32 = 64;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("No subdriver for device {vendor_id:04x}:{product_id:04x}")]
    NoSubdriver { vendor_id: u16, product_id: u16 },
    #[error("Lost the device, reconnect needed")]
    Reconnect,
    #[error("Unknown variable {0}")]
    UnknownVariable(String),
    #[error("Unknown command {0}")]
    UnknownCommand(String),
    #[error("Variable {0} is not writable")]
    NotWritable(String),
    #[error("Invalid value {value:?} for {name}")]
    InvalidValue { name: String, value: String },
}

type Result<T> = std::result::Result<T, DriverError>;

/// A published variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variable {
    pub value: String,
    pub flags: InfoFlags,
    /// Maximum length of string variables
    pub aux: usize,
    /// Allowed values of writable enumerations
    pub enums: Vec<String>,
}

/// The variables and commands a driver publishes.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    vars: BTreeMap<String, Variable>,
    commands: BTreeSet<String>,
}

impl DataStore {
    pub fn get_info(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.value.as_str())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_info(&mut self, name: &str, value: impl Into<String>) {
        self.vars.entry(name.to_string()).or_default().value = value.into();
    }

    pub fn del_info(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    pub fn set_flags(&mut self, name: &str, flags: InfoFlags) {
        if let Some(var) = self.vars.get_mut(name) {
            var.flags = flags;
        }
    }

    pub fn set_aux(&mut self, name: &str, aux: usize) {
        if let Some(var) = self.vars.get_mut(name) {
            var.aux = aux;
        }
    }

    pub fn add_enum(&mut self, name: &str, value: &str) {
        if let Some(var) = self.vars.get_mut(name) {
            if !var.enums.iter().any(|e| e == value) {
                var.enums.push(value.to_string());
            }
        }
    }

    pub fn add_cmd(&mut self, name: &str) {
        self.commands.insert(name.to_string());
    }

    pub fn has_cmd(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.get_info("ups.status")
    }

    fn commit_status(&mut self, status: StatusFlags, alarms: &[String]) {
        match status.transfer_reason() {
            Some(reason) => self.set_info("input.transfer.reason", reason),
            None => {
                self.del_info("input.transfer.reason");
            }
        }
        let mut words = vec![];
        if !alarms.is_empty() {
            words.push("ALARM");
        }
        words.extend(status.status_tokens());
        self.set_info("ups.status", words.join(" "));
    }

    fn commit_alarms(&mut self, alarms: &[String]) {
        if alarms.is_empty() {
            self.del_info("ups.alarm");
        } else {
            self.set_info("ups.alarm", alarms.join(" "));
        }
    }
}

/// Which rows a walk reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Resolve paths, publish defaults and commands, read everything once
    Init,
    /// Only rows flagged [HidFlags::QUICK_POLL]
    QuickUpdate,
    /// Everything that is not static
    FullUpdate,
}

/// A [HidInfo] with its template index applied and its path resolved.
#[derive(Debug, Clone)]
struct Row {
    info: HidInfo,
    name: String,
    path: Option<String>,
    item: Option<Arc<DataItem>>,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoUpdate {
    Variable,
    Status,
    Failed,
}

pub struct Driver<T> {
    session: Session<T>,
    subdriver: Box<dyn Subdriver>,
    rows: Vec<Row>,
    status: StatusFlags,
    alarms: Vec<String>,
    data_has_changed: bool,
    last_full_update: Option<Instant>,
    store: DataStore,
}

impl<T: Transport> Driver<T> {
    /// Pick the subdriver for `device`, parse `raw` with its usage tables and
    /// fix-ups, and run the init walk.
    pub fn open(
        raw: &[u8],
        device: DeviceDescriptor,
        subdrivers: Vec<Box<dyn Subdriver>>,
        transport: T,
        config: Config,
    ) -> Result<Self> {
        let subdriver =
            select_subdriver(subdrivers, &device).ok_or(DriverError::NoSubdriver {
                vendor_id: device.vendor_id,
                product_id: device.product_id,
            })?;
        let tables = subdriver.usage_tables();
        let (session, fixed) = Session::open_with_fixup(
            raw,
            &tables,
            |rdesc| subdriver.fix_report_desc(&device, rdesc),
            transport,
            config,
        )?;
        if fixed {
            debug!("Report descriptor fixed up by {}", subdriver.name());
        }
        debug!(
            "Report descriptor: {} items, report ids {:?}",
            session.descriptor().items().len(),
            session.descriptor().report_ids()
        );

        let rows = expand_rows(&session, subdriver.hid2nut());
        let mut driver = Driver {
            session,
            subdriver,
            rows,
            status: StatusFlags::empty(),
            alarms: vec![],
            data_has_changed: false,
            last_full_update: None,
            store: DataStore::default(),
        };
        driver.publish_device(&device);
        driver.walk(WalkMode::Init)?;
        driver.last_full_update = Some(Instant::now());
        Ok(driver)
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    pub fn subdriver(&self) -> &dyn Subdriver {
        self.subdriver.as_ref()
    }

    pub fn status(&self) -> StatusFlags {
        self.status
    }

    fn publish_device(&mut self, device: &DeviceDescriptor) {
        let s = &self.subdriver;
        let values = [
            ("driver.version.data", Some(s.name().to_string())),
            (
                "driver.parameter.pollfreq",
                Some(self.session.config().pollfreq.as_secs().to_string()),
            ),
            ("ups.vendorid", Some(format!("{:04x}", device.vendor_id))),
            ("ups.productid", Some(format!("{:04x}", device.product_id))),
            ("ups.mfr", s.format_mfr(device)),
            ("ups.model", s.format_model(device)),
            ("ups.serial", s.format_serial(device)),
        ];
        for (name, value) in values {
            if let Some(value) = value {
                self.store.set_info(name, value.trim());
            }
        }
    }

    /// Walk the rows for `mode`. A fatal transport error stops the walk with
    /// [DriverError::Reconnect], other read errors skip the row.
    pub fn walk(&mut self, mode: WalkMode) -> Result<()> {
        let interrupt_only = self.session.config().interrupt_only;
        for i in 0..self.rows.len() {
            let flags = self.rows[i].info.hidflags;
            match mode {
                WalkMode::Init => {
                    if !self.rows[i].active && !self.activate(i) {
                        continue;
                    }
                    if flags.contains(HidFlags::ABSENT) {
                        continue;
                    }
                }
                WalkMode::QuickUpdate => {
                    if !flags.contains(HidFlags::QUICK_POLL) {
                        continue;
                    }
                }
                WalkMode::FullUpdate => {
                    if flags.intersects(HidFlags::ABSENT | HidFlags::STATIC)
                        || self.rows[i].info.is_command()
                    {
                        continue;
                    }
                    if flags.contains(HidFlags::SEMI_STATIC) && !self.data_has_changed {
                        continue;
                    }
                }
            }

            let row = self.rows[i].clone();
            let Some(item) = row.item.clone().filter(|_| row.active) else {
                continue;
            };
            if interrupt_only && mode != WalkMode::Init && item.kind == ItemKind::Input {
                continue;
            }

            let value = match self.session.read_item(&item) {
                Ok(result) => result.value,
                Err(AccessError::Transport(e)) if e.is_fatal() => {
                    error!("Lost the device while reading {}: {e}", item.path);
                    return Err(DriverError::Reconnect);
                }
                Err(e) => {
                    debug!("Can't read {}: {e}", item.path);
                    continue;
                }
            };
            trace!(
                "Path: {}, Type: {}, ReportID: 0x{:02x}, Offset: {}, Size: {}, Value: {}",
                item.path,
                item.kind,
                item.report_id,
                item.offset,
                item.size,
                value
            );

            if row.info.is_command() {
                trace!("Adding command {} using path {}", row.name, item.path);
                self.store.add_cmd(&row.name);
                continue;
            }

            if self.infoval_set(&row.info, &row.name, value) != InfoUpdate::Variable {
                continue;
            }

            if mode == WalkMode::Init {
                self.publish_flags(&row);
            }
        }
        Ok(())
    }

    /// Resolve row `i` for the init walk. Returns whether the row is read.
    fn activate(&mut self, i: usize) -> bool {
        let (info, name, path) = {
            let row = &self.rows[i];
            (row.info, row.name.clone(), row.path.clone())
        };
        let item = match &path {
            Some(path) => match self.session.lookup(path, None) {
                Some(item) => Some(Arc::clone(item)),
                None => {
                    trace!("{name}: path {path} not found");
                    return false;
                }
            },
            None => None,
        };

        if info.is_server_side() {
            self.rows[i].item = item;
            self.rows[i].active = true;
            if self.store.get_info(&name).is_none() {
                self.store.set_info(&name, info.dfl.unwrap_or_default());
                self.store.set_flags(&name, info.info_flags);
                if info.info_flags.contains(InfoFlags::STRING) {
                    self.store.set_aux(&name, info.info_len);
                }
            }
            return false;
        }

        let Some(item) = item else {
            return false;
        };
        if matches!(info.target, Target::Variable(_)) && self.store.get_info(&name).is_some() {
            debug!("{name} is already provided, not using {}", item.path);
            return false;
        }
        self.rows[i].item = Some(item);
        self.rows[i].active = true;
        true
    }

    fn publish_flags(&mut self, row: &Row) {
        let info = &row.info;
        self.store.set_flags(&row.name, info.info_flags);
        if info.info_flags.contains(InfoFlags::STRING) {
            self.store.set_aux(&row.name, info.info_len);
        }
        if !info.hidflags.contains(HidFlags::ENUM) || !info.info_flags.contains(InfoFlags::RW) {
            return;
        }
        if let Some(table) = info.conversion.lookup() {
            for (value, text) in table.entries() {
                if info.conversion.apply(*value as f64, "").is_some() {
                    self.store.add_enum(&row.name, text);
                }
            }
        }
    }

    /// Convert `value` and apply it to the row's target.
    fn infoval_set(&mut self, info: &HidInfo, name: &str, value: f64) -> InfoUpdate {
        let text = match info.conversion {
            Conversion::Identity => Some(format_value(info.dfl.unwrap_or("%.0f"), value)),
            Conversion::StringDescriptor => self.string_descriptor(value),
            conversion => conversion.apply(value, ""),
        };
        let Some(text) = text else {
            trace!("Lookup [{value}] failed for {name}");
            return InfoUpdate::Failed;
        };
        match info.target {
            Target::Status => {
                self.status.process_boolean_info(&text);
                InfoUpdate::Status
            }
            Target::Alarm => {
                if !self.alarms.contains(&text) {
                    self.alarms.push(text);
                }
                InfoUpdate::Status
            }
            Target::Variable(_) | Target::Command(_) => {
                self.store.set_info(name, text);
                InfoUpdate::Variable
            }
        }
    }

    fn string_descriptor(&mut self, value: f64) -> Option<String> {
        let index = value as u8;
        if index == 0 {
            return None;
        }
        match self.session.get_string(index) {
            Ok(s) => Some(s.trim().to_string()),
            Err(e) => {
                debug!("Can't read string descriptor {index}: {e}");
                None
            }
        }
    }

    /// One poll cycle.
    pub fn update(&mut self) -> Result<()> {
        let now = Instant::now();
        let config = *self.session.config();

        if config.use_interrupt_pipe {
            let events = match self.session.poll_interrupt(config.interrupt_timeout) {
                Ok(events) => events,
                Err(e) if e.is_fatal() => {
                    error!("Lost the device on the interrupt pipe: {e}");
                    return Err(DriverError::Reconnect);
                }
                Err(e) => {
                    debug!("Interrupt pipe: {e}");
                    vec![]
                }
            };
            debug!("Got {} HID objects", events.len());
            self.process_events(events, config.interrupt_only);
        }

        let full = self.data_has_changed
            || self
                .last_full_update
                .map_or(true, |last| now.duration_since(last) >= config.pollfreq);
        if full {
            debug!("Full update");
            self.alarms.clear();
            self.walk(WalkMode::FullUpdate)?;
            self.last_full_update = Some(now);
            self.data_has_changed = false;
            for alarm in self.status.alarms() {
                if !self.alarms.iter().any(|a| a == alarm) {
                    self.alarms.push(alarm.to_string());
                }
            }
            self.store.commit_alarms(&self.alarms);
        } else {
            debug!("Quick update");
            self.walk(WalkMode::QuickUpdate)?;
        }

        self.store.commit_status(self.status, &self.alarms);
        Ok(())
    }

    fn process_events(&mut self, events: Vec<(Arc<DataItem>, AccessResult)>, interrupt_only: bool) {
        let kind = if interrupt_only {
            ItemKind::Input
        } else {
            ItemKind::Feature
        };
        for (item, result) in events {
            trace!(
                "Event: {}, ReportID: 0x{:02x}, Value: {}",
                item.path,
                item.report_id,
                result.value
            );
            let path = item.path.to_string();
            let Some(found) = self.session.lookup(&path, Some(kind)).cloned() else {
                continue;
            };
            let row = self
                .rows
                .iter()
                .find(|row| {
                    row.active
                        && !row.info.is_server_side()
                        && !row.info.is_command()
                        && row.item.as_ref().is_some_and(|i| Arc::ptr_eq(i, &found))
                })
                .cloned();
            match row {
                Some(row) => {
                    self.infoval_set(&row.info, &row.name, result.value);
                }
                None => trace!("{path} is not used"),
            }
        }
    }

    fn find_row(&self, name: &str) -> Option<Row> {
        let row = self
            .rows
            .iter()
            .find(|row| row.active && row.name.eq_ignore_ascii_case(name))
            .cloned();
        if row.is_none() {
            debug!("Unknown info type {name}");
        }
        row
    }

    fn write(&mut self, item: &DataItem, value: f64) -> Result<()> {
        match self.session.write_item(item, value) {
            Ok(()) => {
                self.data_has_changed = true;
                Ok(())
            }
            Err(AccessError::Transport(e)) if e.is_fatal() => {
                error!("Lost the device while writing {}: {e}", item.path);
                Err(DriverError::Reconnect)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Set the writable variable `name` to `value`.
    pub fn setvar(&mut self, name: &str, value: &str) -> Result<()> {
        debug!("setvar({name}, {value})");
        let row = self
            .find_row(name)
            .ok_or_else(|| DriverError::UnknownVariable(name.to_string()))?;
        if !row.info.info_flags.contains(InfoFlags::RW) {
            return Err(DriverError::NotWritable(name.to_string()));
        }
        if row.info.is_server_side() {
            debug!("Setting server side variable {name}");
            self.store.set_info(&row.name, value);
            return Ok(());
        }
        let item = row
            .item
            .ok_or_else(|| DriverError::UnknownVariable(name.to_string()))?;
        let hid_value = row
            .info
            .conversion
            .reverse(value)
            .ok_or_else(|| DriverError::InvalidValue {
                name: name.to_string(),
                value: value.to_string(),
            })?;
        self.write(&item, hid_value)
    }

    /// Run the instant command `name`, with `extra` instead of the row's
    /// default value if given.
    pub fn instcmd(&mut self, name: &str, extra: Option<&str>) -> Result<()> {
        if name.eq_ignore_ascii_case("beeper.off") {
            warn!("The 'beeper.off' command has been renamed to 'beeper.disable'");
            return self.instcmd("beeper.disable", None);
        }
        if name.eq_ignore_ascii_case("beeper.on") {
            warn!("The 'beeper.on' command has been renamed to 'beeper.enable'");
            return self.instcmd("beeper.enable", None);
        }
        debug!("instcmd({name}, {extra:?})");

        let Some(row) = self.find_row(name) else {
            return self.instcmd_fallback(name);
        };
        let item = match (&row.item, row.info.is_command()) {
            (Some(item), true) => Arc::clone(item),
            _ => {
                debug!("{name} is not an instant command");
                return Err(DriverError::UnknownCommand(name.to_string()));
            }
        };
        let value = extra.or(row.info.dfl).unwrap_or_default();
        let hid_value =
            row.info
                .conversion
                .reverse(value)
                .ok_or_else(|| DriverError::InvalidValue {
                    name: name.to_string(),
                    value: value.to_string(),
                })?;
        self.write(&item, hid_value)
    }

    /// Commands composed of other commands, for devices without a row.
    fn instcmd_fallback(&mut self, name: &str) -> Result<()> {
        match name.to_ascii_lowercase().as_str() {
            "load.on" => self.instcmd("load.on.delay", Some("0")),
            "load.off" => self.instcmd("load.off.delay", Some("0")),
            "shutdown.return" => self.shutdown_with("yes", None),
            "shutdown.stayoff" => self.shutdown_with("no", Some("-1")),
            _ => {
                debug!("Instant command {name} unavailable");
                Err(DriverError::UnknownCommand(name.to_string()))
            }
        }
    }

    fn shutdown_with(&mut self, start_auto: &str, ondelay: Option<&str>) -> Result<()> {
        if self.store.get_info("ups.start.auto").is_some() {
            if let Err(e) = self.setvar("ups.start.auto", start_auto) {
                debug!("Can't set ups.start.auto: {e}");
            }
        }
        let ondelay = match ondelay {
            Some(delay) => Some(delay.to_string()),
            None => self.store.get_info("ups.delay.start").map(String::from),
        };
        self.instcmd("load.on.delay", ondelay.as_deref())?;
        let offdelay = self.store.get_info("ups.delay.shutdown").map(String::from);
        self.instcmd("load.off.delay", offdelay.as_deref())
    }

    /// Shut the load down and have it return with the power, trying the
    /// usual commands in turn.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut result = Ok(());
        for command in ["shutdown.return", "shutdown.reboot", "load.off.delay"] {
            result = self.instcmd(command, None);
            match &result {
                Ok(()) => return Ok(()),
                Err(DriverError::Reconnect) => break,
                Err(e) => debug!("{command} failed: {e}"),
            }
        }
        result
    }
}

/// Instantiate template rows for every index whose path exists.
fn expand_rows<T: Transport>(session: &Session<T>, infos: Vec<HidInfo>) -> Vec<Row> {
    let mut rows = vec![];
    for info in infos {
        let name = info.target.name();
        match info.hidpath {
            Some(path) if info.is_template() => {
                for i in 1..=MAX_TEMPLATE_INDEX {
                    let index = i.to_string();
                    let path = path.replace("%i", &index);
                    if !session.contains(&path) {
                        break;
                    }
                    rows.push(Row {
                        info,
                        name: name.replace("%i", &index),
                        path: Some(path),
                        item: None,
                        active: false,
                    });
                }
            }
            path => rows.push(Row {
                info,
                name: name.to_string(),
                path: path.map(String::from),
                item: None,
                active: false,
            }),
        }
    }
    rows
}
