// SPDX-License-Identifier: MIT

//! Tunables of a [Session](crate::Session) and of the driver loop.
//!
//! ```
//! # use std::time::Duration;
//! # use hidups::Config;
//! let config = Config::default()
//!     .with_pollfreq(Duration::from_secs(60))
//!     .with_interrupt_only(true);
//! assert_eq!(config.max_age, Duration::from_secs(2));
//! assert!(config.interrupt_only);
//! ```

use std::time::Duration;

use crate::report::DEFAULT_MAX_AGE;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Reports younger than this are served from the cache
    pub max_age: Duration,
    /// Timeout for a single report transfer
    pub transport_timeout: Duration,
    /// Interval between full updates
    pub pollfreq: Duration,
    /// How long one update waits for an interrupt report
    pub interrupt_timeout: Duration,
    /// Listen for input reports on the interrupt pipe
    pub use_interrupt_pipe: bool,
    /// Only update from the interrupt pipe, never poll input reports
    pub interrupt_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_age: DEFAULT_MAX_AGE,
            transport_timeout: Duration::from_secs(5),
            pollfreq: Duration::from_secs(30),
            interrupt_timeout: Duration::from_millis(250),
            use_interrupt_pipe: true,
            interrupt_only: false,
        }
    }
}

impl Config {
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    pub fn with_pollfreq(mut self, pollfreq: Duration) -> Self {
        self.pollfreq = pollfreq;
        self
    }

    pub fn with_interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = timeout;
        self
    }

    pub fn with_interrupt_pipe(mut self, enabled: bool) -> Self {
        self.use_interrupt_pipe = enabled;
        self
    }

    /// Implies [Config::with_interrupt_pipe].
    pub fn with_interrupt_only(mut self, enabled: bool) -> Self {
        self.interrupt_only = enabled;
        if enabled {
            self.use_interrupt_pipe = true;
        }
        self
    }
}
