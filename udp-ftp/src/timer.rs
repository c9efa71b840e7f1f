//! Retransmission timing.
//!
//! Stop-and-wait needs exactly one timer: the interval after which an
//! unanswered packet is sent again.  This module provides:
//! - [`TimerConfig`]: the fixed retransmission interval (RTT), an optional
//!   retry budget and the receiver linger time.
//! - [`RetransmitTimer`]: counts attempts for one packet in flight and
//!   decides when to give up.
//!
//! There is no RTT estimation and no back-off: every wait lasts one RTT.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Error;

/// Default retransmission interval.
pub const DEFAULT_RTT: Duration = Duration::from_millis(100);

/// Adjustable timeout parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Time to wait for a reply before sending the same packet again.
    pub rtt: Duration,
    /// Retransmissions allowed per packet; `None` retries forever.
    pub max_retries: Option<u32>,
    /// How long a receiver that has sent its final response keeps answering
    /// retransmissions before returning.
    pub linger: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::with_rtt(DEFAULT_RTT)
    }
}

impl TimerConfig {
    /// Retry forever, linger for three intervals.
    pub fn with_rtt(rtt: Duration) -> Self {
        Self {
            rtt,
            max_retries: None,
            linger: rtt * 3,
        }
    }

    /// Longest silence a receiving side accepts before giving up, or `None`
    /// to wait forever.
    pub fn idle_limit(&self) -> Option<Duration> {
        self.max_retries
            .map(|retries| self.rtt.saturating_mul(retries.saturating_add(1)))
    }
}

/// Attempt counter for the packet currently in flight.
#[derive(Debug)]
pub struct RetransmitTimer {
    config: TimerConfig,
    /// Transmissions of the current packet (1 = first send).
    attempts: u32,
    /// Transmissions of every packet since the timer was created.
    total: u64,
}

impl RetransmitTimer {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            attempts: 0,
            total: 0,
        }
    }

    /// Interval to wait after each transmission.
    pub fn rtt(&self) -> Duration {
        self.config.rtt
    }

    /// Record a fresh packet being put in flight.
    pub fn start(&mut self) {
        self.attempts = 1;
        self.total += 1;
    }

    /// Record a timeout.
    ///
    /// Returns an error once the retry budget is spent; otherwise the caller
    /// must send the same packet again.
    pub fn on_timeout(&mut self, peer: SocketAddr) -> Result<(), Error> {
        if let Some(max) = self.config.max_retries {
            if self.attempts > max {
                return Err(Error::TransportFailure {
                    peer,
                    attempts: self.attempts,
                });
            }
        }
        self.attempts += 1;
        self.total += 1;
        Ok(())
    }

    /// Transmissions of the current packet so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Transmissions of all packets so far, retransmissions included.
    pub fn transmissions(&self) -> u64 {
        self.total
    }
}
