//! Network simulator for deterministic testing.
//!
//! Real networks drop, duplicate and damage packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps any [`Transport`] and intercepts outgoing datagrams,
//! applying a configurable fault model:
//!
//! | Fault              | Description                                         |
//! |--------------------|-----------------------------------------------------|
//! | Packet loss        | Drop a datagram with probability `loss_rate`.       |
//! | Duplication        | Deliver a datagram twice.                           |
//! | Header corruption  | Flip one bit in the header fields.                  |
//! | Payload corruption | Flip one bit in the payload (header left intact).   |
//!
//! Random faults draw from a seeded RNG so failures are reproducible.  The
//! `*_sends` lists add scripted faults by send index (0-based, counting every
//! call to `send_to`), which is how tests target one specific packet.
//!
//! Receives pass straight through.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::{HEADER_LEN, OFF_CHECKSUM};
use crate::socket::Transport;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is sent twice.
    pub duplicate_rate: f64,
    /// Probability that one header bit is flipped.
    pub corrupt_rate: f64,
    /// RNG seed.
    pub seed: u64,
    /// Send indices that are always dropped.
    pub drop_sends: Vec<usize>,
    /// Send indices that are always duplicated.
    pub duplicate_sends: Vec<usize>,
    /// Send indices whose header is always corrupted.
    pub corrupt_sends: Vec<usize>,
    /// Send indices whose payload is always corrupted.
    pub corrupt_payload_sends: Vec<usize>,
}

impl SimulatorConfig {
    /// Pass-through with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// What happens to one outgoing datagram.
#[derive(Debug, Default, PartialEq, Eq)]
struct Fate {
    drop: bool,
    duplicate: bool,
    /// Bit index into the header fields.
    corrupt_header: Option<usize>,
    /// Bit index into the payload.
    corrupt_payload: Option<usize>,
}

/// A fault-injecting wrapper around the socket layer.
#[derive(Debug)]
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: Mutex<StdRng>,
    sends: AtomicUsize,
}

impl<T> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = Mutex::new(StdRng::seed_from_u64(config.seed));
        Self {
            inner,
            config,
            rng,
            sends: AtomicUsize::new(0),
        }
    }

    /// Number of `send_to` calls so far, dropped ones included.
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn decide(&self, index: usize, len: usize) -> Fate {
        let c = &self.config;
        // A poisoned lock only means another send panicked mid-draw.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut fate = Fate {
            drop: c.drop_sends.contains(&index) || roll(&mut rng, c.loss_rate),
            duplicate: c.duplicate_sends.contains(&index) || roll(&mut rng, c.duplicate_rate),
            ..Fate::default()
        };
        let header_bits = OFF_CHECKSUM.min(len) * 8;
        if header_bits > 0 && (c.corrupt_sends.contains(&index) || roll(&mut rng, c.corrupt_rate)) {
            fate.corrupt_header = Some(rng.gen_range(0..header_bits));
        }
        let payload_bits = len.saturating_sub(HEADER_LEN) * 8;
        if payload_bits > 0 && c.corrupt_payload_sends.contains(&index) {
            fate.corrupt_payload = Some(HEADER_LEN * 8 + rng.gen_range(0..payload_bits));
        }
        fate
    }
}

fn roll(rng: &mut StdRng, rate: f64) -> bool {
    rate > 0.0 && rng.gen_bool(rate.min(1.0))
}

fn flip_bit(datagram: &mut [u8], bit: usize) {
    datagram[bit / 8] ^= 1 << (bit % 8);
}

impl<T: Transport> Transport for Simulator<T> {
    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        let fate = self.decide(index, datagram.len());
        if fate.drop {
            log::debug!("[sim] dropping send #{index} ({} bytes) to {dest}", datagram.len());
            return Ok(());
        }

        let mut bytes = datagram.to_vec();
        for bit in [fate.corrupt_header, fate.corrupt_payload].into_iter().flatten() {
            log::debug!("[sim] flipping bit {bit} of send #{index}");
            flip_bit(&mut bytes, bit);
        }

        self.inner.send_to(&bytes, dest).await?;
        if fate.duplicate {
            log::debug!("[sim] duplicating send #{index}");
            self.inner.send_to(&bytes, dest).await?;
        }
        Ok(())
    }

    async fn recv_from(&self, capacity: usize) -> io::Result<(Vec<u8>, SocketAddr)> {
        self.inner.recv_from(capacity).await
    }
}
