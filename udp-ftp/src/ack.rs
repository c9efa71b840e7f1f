//! Acknowledgement engine: the single retry primitive every exchange uses.
//!
//! # Sending side
//!
//! [`AckEngine::send_and_await_ack`] transmits a datagram and waits one RTT
//! for a reply from the peer.  On silence it resends the *identical* bytes
//! and waits again, forever unless [`TimerConfig::max_retries`] says
//! otherwise.  Every reply is classified as it arrives:
//!
//! - *corrupt*: header checksum mismatch.  The packet is resent at once,
//!   which spends one retry like a timeout does.
//! - *duplicate*: an `ACK` whose acknowledgement number equals the last one
//!   accepted, i.e. a retransmitted copy of an earlier reply.
//! - otherwise fresh; an `ACK` is cached as the last accepted reply.
//!
//! [`AckEngine::exchange`] wraps this into "send until the peer acknowledges
//! this exact sequence number".
//!
//! # Receiving side
//!
//! [`Responder`] sends replies and remembers the last one.  When the peer
//! retransmits the packet that reply answered, the cached bytes are sent
//! again verbatim.
//!
//! # Numbering
//!
//! A reply to `(seq = s, ack = a)` carries `ack = s` and `seq = a + 1`, see
//! [`response_to`].  Replies to a retransmitted packet are byte-identical.

use std::net::SocketAddr;

use tokio::time::Instant;

use crate::error::Result;
use crate::integrity;
use crate::packet::{header_bytes, sequence_number, Flags, Header, Packet, MAX_PACKET_SIZE};
use crate::socket::Transport;
use crate::timer::{RetransmitTimer, TimerConfig};

/// Build the reply to `request` following the numbering rule.
pub fn response_to(request: &Header, total_file_size: u32, flags: Flags, payload: Vec<u8>) -> Packet {
    Packet::new(
        total_file_size,
        request.ack.wrapping_add(1),
        request.seq,
        flags,
        payload,
    )
}

/// Wait for the next datagram from `peer`, ignoring everyone else.
///
/// Returns `None` once `deadline` passes; `None` as deadline waits forever.
pub async fn recv_from_peer<T: Transport>(
    transport: &T,
    peer: SocketAddr,
    capacity: usize,
    deadline: Option<Instant>,
) -> Result<Option<Vec<u8>>> {
    loop {
        let recv = transport.recv_from(capacity);
        let (bytes, from) = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, recv).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            },
            None => recv.await?,
        };
        if from != peer {
            log::debug!("[ack] ignoring {} bytes from {from} (peer is {peer})", bytes.len());
            continue;
        }
        return Ok(Some(bytes));
    }
}

/// A reply as seen by [`AckEngine`].
#[derive(Debug, Clone)]
pub struct Reply {
    pub packet: Packet,
    /// Header checksum verified.
    pub intact: bool,
    /// Retransmitted copy of an already accepted reply.
    pub duplicate: bool,
}

impl Reply {
    /// `true` if this is a fresh, intact `ACK` of sequence number `seq`.
    pub fn acknowledges(&self, seq: u32) -> bool {
        let h = &self.packet.header;
        self.intact && !self.duplicate && h.flags.contains(Flags::ACK) && h.ack == seq
    }
}

/// Send-side retry state for one peer.
///
/// Owned by the caller for the duration of one command.  The only state
/// that may outlive a command is the [`Responder`] passed to
/// [`AckEngine::with_responder`].
pub struct AckEngine<'a, T> {
    transport: &'a T,
    peer: SocketAddr,
    timer: RetransmitTimer,
    /// Retransmission deadline of the packet in flight.
    deadline: Instant,
    last_reply: Option<Header>,
    duplicates: u64,
    responder: Option<&'a Responder>,
}

impl<'a, T: Transport> AckEngine<'a, T> {
    pub fn new(transport: &'a T, peer: SocketAddr, config: TimerConfig) -> Self {
        Self {
            transport,
            peer,
            timer: RetransmitTimer::new(config),
            deadline: Instant::now(),
            last_reply: None,
            duplicates: 0,
            responder: None,
        }
    }

    /// Answer retransmissions of the packet `responder` last replied to
    /// while waiting.
    ///
    /// A peer that missed our final reply of the previous command keeps
    /// resending its last packet; replaying the reply lets it finish and
    /// listen for our next request.
    pub fn with_responder(mut self, responder: &'a Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn transport(&self) -> &'a T {
        self.transport
    }

    /// Header of the last fresh, intact `ACK`.
    pub fn last_reply(&self) -> Option<&Header> {
        self.last_reply.as_ref()
    }

    /// Datagrams sent so far, retransmissions included.
    pub fn transmissions(&self) -> u64 {
        self.timer.transmissions()
    }

    /// Duplicate replies discarded so far.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Send `datagram`, then wait for any reply, resending on every timeout.
    pub async fn send_and_await_ack(&mut self, datagram: &[u8], capacity: usize) -> Result<Reply> {
        self.timer.start();
        self.transmit(datagram).await?;
        self.await_ack(datagram, capacity).await
    }

    /// Keep waiting for a reply to the `datagram` already in flight.
    ///
    /// The current deadline is kept, so stray replies do not postpone the
    /// next retransmission.
    pub async fn await_ack(&mut self, datagram: &[u8], capacity: usize) -> Result<Reply> {
        // A retransmitted fragment must arrive whole to be recognised.
        let capacity = if self.responder.is_some() {
            capacity.max(MAX_PACKET_SIZE)
        } else {
            capacity
        };
        loop {
            match recv_from_peer(self.transport, self.peer, capacity, Some(self.deadline)).await? {
                Some(bytes) => {
                    if self.replay_if_retransmission(&bytes).await? {
                        continue;
                    }
                    if let Some(reply) = self.classify(&bytes) {
                        return Ok(reply);
                    }
                }
                None => self.retransmit(datagram, "timeout").await?,
            }
        }
    }

    /// Send `packet` until the peer acknowledges its sequence number, and
    /// return that acknowledgement.
    pub async fn exchange(&mut self, packet: &Packet, capacity: usize) -> Result<Packet> {
        let seq = packet.header.seq;
        let datagram = packet.encode()?;
        let mut reply = self.send_and_await_ack(&datagram, capacity).await?;
        loop {
            if reply.acknowledges(seq) {
                return Ok(reply.packet);
            }
            if reply.intact {
                // A duplicate or stale reply does not trigger a resend: the
                // wait continues until the current deadline, so one late
                // ack cannot set off a resend per duplicate.
                log::debug!(
                    "[ack] ignoring {} reply ack={} flags={:?} while waiting for ack={seq}",
                    if reply.duplicate { "duplicate" } else { "stale" },
                    reply.packet.header.ack,
                    reply.packet.header.flags
                );
                reply = self.await_ack(&datagram, capacity).await?;
            } else {
                self.retransmit(&datagram, "corrupt reply").await?;
                reply = self.await_ack(&datagram, capacity).await?;
            }
        }
    }

    /// Send the packet in flight again, spending one retry.
    async fn retransmit(&mut self, datagram: &[u8], reason: &str) -> Result<()> {
        self.timer.on_timeout(self.peer)?;
        log::debug!(
            "[ack] {reason}; retransmitting {} bytes to {} (attempt {})",
            datagram.len(),
            self.peer,
            self.timer.attempts()
        );
        self.transmit(datagram).await
    }

    async fn replay_if_retransmission(&self, bytes: &[u8]) -> Result<bool> {
        let Some(responder) = self.responder else {
            return Ok(false);
        };
        if !integrity::is_intact(bytes) {
            return Ok(false);
        }
        let Ok(header) = header_bytes(bytes) else {
            return Ok(false);
        };
        responder
            .replay_if_retransmission(self.transport, self.peer, sequence_number(header))
            .await
    }

    async fn transmit(&mut self, datagram: &[u8]) -> Result<()> {
        self.transport.send_to(datagram, self.peer).await?;
        self.deadline = Instant::now() + self.timer.rtt();
        Ok(())
    }

    fn classify(&mut self, bytes: &[u8]) -> Option<Reply> {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("[ack] dropping reply: {e}");
                return None;
            }
        };
        let intact = integrity::is_intact(bytes);
        let is_ack = intact && packet.header.flags.contains(Flags::ACK);
        let duplicate = is_ack && self.last_reply.is_some_and(|last| last.ack == packet.header.ack);
        if duplicate {
            self.duplicates += 1;
        } else if is_ack {
            self.last_reply = Some(packet.header);
        }
        log::trace!(
            "[ack] <- seq={} ack={} flags={:?} intact={intact} duplicate={duplicate}",
            packet.header.seq,
            packet.header.ack,
            packet.header.flags
        );
        Some(Reply {
            packet,
            intact,
            duplicate,
        })
    }
}

#[derive(Debug)]
struct CachedResponse {
    peer: SocketAddr,
    /// Sequence number of the packet this response answered.
    answers: u32,
    datagram: Vec<u8>,
}

/// Receive-side reply cache.
#[derive(Debug, Default)]
pub struct Responder {
    last: Option<CachedResponse>,
}

impl Responder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `response` to `peer` and remember it.
    pub async fn respond<T: Transport>(&mut self, transport: &T, peer: SocketAddr, response: &Packet) -> Result<()> {
        let datagram = response.encode()?;
        transport.send_to(&datagram, peer).await?;
        log::trace!(
            "[ack] -> {peer} seq={} ack={} flags={:?}",
            response.header.seq,
            response.header.ack,
            response.header.flags
        );
        self.last = Some(CachedResponse {
            peer,
            answers: response.header.ack,
            datagram,
        });
        Ok(())
    }

    /// If `seq` from `peer` is the packet the cached response answered, the
    /// peer missed that response: send it again and return `true`.
    pub async fn replay_if_retransmission<T: Transport>(
        &self,
        transport: &T,
        peer: SocketAddr,
        seq: u32,
    ) -> Result<bool> {
        match &self.last {
            Some(cached) if cached.peer == peer && cached.answers == seq => {
                log::debug!("[ack] retransmission of seq={seq} from {peer}; replaying response");
                transport.send_to(&cached.datagram, peer).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
