// SPDX-License-Identifier: MIT

//! The device side of a [Session](crate::Session).
//!
//! A [Transport] moves whole reports. Buffers always start with the Report ID
//! byte when the report is numbered, in both directions.

use std::time::Duration;
use thiserror::Error;

use crate::ItemKind;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device or resource busy")]
    Busy,
    #[error("No such device")]
    NoDevice,
    #[error("Timed out")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Fatal errors mean the device is gone or unusable and the driver
    /// should reconnect. Everything else may succeed on the next attempt.
    pub fn is_fatal(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            TransportError::Busy | TransportError::NoDevice => true,
            TransportError::Timeout => false,
            TransportError::Io(e) => match e.kind() {
                ErrorKind::PermissionDenied
                | ErrorKind::NotFound
                | ErrorKind::NotConnected
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted => true,
                // EIO, ENXIO
                _ => matches!(e.raw_os_error(), Some(5) | Some(6)),
            },
        }
    }
}

/// Report level access to a device.
pub trait Transport {
    /// Fetch the current contents of a report.
    fn get_report(
        &mut self,
        report_id: u8,
        kind: ItemKind,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Send a report, `bytes` is the complete report buffer.
    fn set_report(&mut self, report_id: u8, bytes: &[u8]) -> Result<(), TransportError>;

    /// Wait for an input report on the interrupt pipe.
    fn read_interrupt(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Timeout)
    }

    /// Fetch a string descriptor.
    fn get_string(&mut self, _index: u8) -> Result<String, TransportError> {
        Err(TransportError::Io(std::io::Error::from(
            std::io::ErrorKind::Unsupported,
        )))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn get_report(
        &mut self,
        report_id: u8,
        kind: ItemKind,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).get_report(report_id, kind, timeout)
    }

    fn set_report(&mut self, report_id: u8, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).set_report(report_id, bytes)
    }

    fn read_interrupt(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_interrupt(timeout)
    }

    fn get_string(&mut self, index: u8) -> Result<String, TransportError> {
        (**self).get_string(index)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get_report(
        &mut self,
        report_id: u8,
        kind: ItemKind,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).get_report(report_id, kind, timeout)
    }

    fn set_report(&mut self, report_id: u8, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).set_report(report_id, bytes)
    }

    fn read_interrupt(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_interrupt(timeout)
    }

    fn get_string(&mut self, index: u8) -> Result<String, TransportError> {
        (**self).get_string(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn fatal_errors() {
        assert!(TransportError::NoDevice.is_fatal());
        assert!(TransportError::Busy.is_fatal());
        assert!(!TransportError::Timeout.is_fatal());
        assert!(TransportError::from(Error::from(ErrorKind::PermissionDenied)).is_fatal());
        assert!(TransportError::from(Error::from_raw_os_error(5)).is_fatal());
        assert!(!TransportError::from(Error::from(ErrorKind::BrokenPipe)).is_fatal());
        assert!(!TransportError::from(Error::from(ErrorKind::Interrupted)).is_fatal());
    }
}
