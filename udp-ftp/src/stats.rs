//! Per-transfer statistics.

use std::fmt;
use std::time::Duration;

/// Percentage of `part` out of `total`, rounded down; an empty total counts
/// as finished.
pub fn progress(part: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        part.min(total) * 100 / total
    }
}

/// Counters for one file transfer, as seen by one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// File length in bytes.
    pub bytes: u64,
    /// Fragments the file needs at minimum.
    pub optimal_packets: u64,
    /// Packets actually sent (sender) or fragments received (receiver),
    /// retransmissions included.
    pub packets: u64,
    /// Duplicate packets seen and ignored.
    pub duplicates: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    pub fn retransmissions(&self) -> u64 {
        self.packets.saturating_sub(self.optimal_packets)
    }

    /// Mean time spent per packet.
    pub fn per_packet(&self) -> Duration {
        match u32::try_from(self.packets) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.elapsed / n,
            Err(_) => Duration::from_secs_f64(self.elapsed.as_secs_f64() / self.packets as f64),
        }
    }

    /// Time the transfer would have taken without any retransmission.
    pub fn optimal_time(&self) -> Duration {
        self.per_packet()
            .saturating_mul(u32::try_from(self.optimal_packets).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {} ms: {} packets for an optimum of {} ({} retransmitted, {} duplicates), \
             {:.1} ms per packet, optimally {} ms",
            self.bytes,
            self.elapsed.as_millis(),
            self.packets,
            self.optimal_packets,
            self.retransmissions(),
            self.duplicates,
            self.per_packet().as_secs_f64() * 1000.0,
            self.optimal_time().as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_a_floored_percentage() {
        assert_eq!(progress(0, 3), 0);
        assert_eq!(progress(1, 3), 33);
        assert_eq!(progress(3, 3), 100);
        assert_eq!(progress(5, 3), 100);
        assert_eq!(progress(0, 0), 100);
    }

    #[test]
    fn derived_figures() {
        let stats = TransferStats {
            bytes: 3000,
            optimal_packets: 3,
            packets: 5,
            duplicates: 1,
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(stats.retransmissions(), 2);
        assert_eq!(stats.per_packet(), Duration::from_millis(100));
        assert_eq!(stats.optimal_time(), Duration::from_millis(300));
        let text = stats.to_string();
        assert!(text.contains("5 packets for an optimum of 3"));
        assert!(text.contains("2 retransmitted"));
    }

    #[test]
    fn empty_stats_do_not_divide_by_zero() {
        let stats = TransferStats::default();
        assert_eq!(stats.per_packet(), Duration::ZERO);
        assert_eq!(stats.retransmissions(), 0);
    }
}
