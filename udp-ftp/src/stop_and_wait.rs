//! Async drivers for stop-and-wait file transfer.
//!
//! ```text
//!  sender                                   receiver
//!    │ ── fragment seq=s, MORE_FRAGMENTS ──▶  │  append, respond
//!    │ ◀────────────── ACK ack=s ──────────── │
//!    │          ... one fragment in flight ...│
//!    │ ── fragment seq=s+n, LAST ───────────▶ │  complete
//!    │ ◀────────────── ACK ack=s+n ────────── │
//!    │ ── CHECK seq=s+n+1, file checksum ───▶ │  verify
//!    │ ◀─────── ACK | ACK+INCORRECT ───────── │
//! ```
//!
//! The sending half drives a [`FragmentSender`] through an [`AckEngine`];
//! the receiving half feeds a [`Reassembly`] and answers through a
//! [`Responder`].  Corrupt fragments are dropped without a reply, which
//! leaves recovery to the sender's retransmission timer.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::ack::{recv_from_peer, response_to, AckEngine, Responder};
use crate::error::{Error, Result};
use crate::integrity;
use crate::packet::{Flags, Header, Packet, ACK_BUFFER_SIZE, MAX_PACKET_SIZE, MESSAGE_BUFFER_SIZE};
use crate::receiver::Reassembly;
use crate::sender::{fragment_count, Cursor, FragmentSender};
use crate::socket::Transport;
use crate::state::ReceiveState;
use crate::stats::{progress, TransferStats};
use crate::timer::TimerConfig;

/// Send `data` fragment by fragment; the first fragment follows `cursor`.
///
/// Returns the transfer statistics and the cursor after the `LAST` fragment
/// was acknowledged.
pub async fn send_file<T: Transport>(
    engine: &mut AckEngine<'_, T>,
    data: &[u8],
    cursor: Cursor,
) -> Result<(TransferStats, Cursor)> {
    let started = Instant::now();
    let sent_before = engine.transmissions();
    let duplicates_before = engine.duplicates();
    let mut sender = FragmentSender::new(data, cursor)?;
    let count = sender.fragment_count();

    while let Some(packet) = sender.prepare() {
        log::trace!(
            "[saw] {} fragment {}/{count} seq={} len={}",
            sender.state(),
            sender.acknowledged() + 1,
            packet.header.seq,
            packet.payload.len()
        );
        let reply = engine.exchange(&packet, ACK_BUFFER_SIZE).await?;
        if sender.on_ack(&reply.header) {
            log::debug!(
                "[saw] fragment {}/{count} acknowledged ({}%)",
                sender.acknowledged(),
                progress(sender.acknowledged() as u64, count as u64)
            );
        }
    }

    let stats = TransferStats {
        bytes: data.len() as u64,
        optimal_packets: count as u64,
        packets: engine.transmissions() - sent_before,
        duplicates: engine.duplicates() - duplicates_before,
        elapsed: started.elapsed(),
    };
    log::info!("[saw] sent {stats}");
    Ok((stats, sender.cursor()))
}

/// Send the whole-file checksum of `data` and return the peer's verdict.
pub async fn send_checksum<T: Transport>(
    engine: &mut AckEngine<'_, T>,
    data: &[u8],
    mut cursor: Cursor,
) -> Result<(Packet, Cursor)> {
    let checksum = integrity::file_checksum(data);
    // `send_file` already refused anything wider than the size field.
    let total = u32::try_from(data.len()).unwrap_or(u32::MAX);
    let check = cursor.next_packet(total, Flags::CHECK, integrity::encode_check_payload(checksum));
    log::debug!("[saw] -> CHECK seq={} checksum={checksum:#06x}", check.header.seq);
    let reply = engine.exchange(&check, MESSAGE_BUFFER_SIZE).await?;
    cursor.advance(&reply.header);
    Ok((reply, cursor))
}

/// A reassembled file.
#[derive(Debug)]
pub struct Received {
    pub data: Vec<u8>,
    pub stats: TransferStats,
    /// Sequence number of the `LAST` fragment.
    pub last_seq: u32,
}

/// Receive `total` bytes from `peer`, starting with the packet after
/// `last_seq`.
///
/// `responder` must hold the reply to the packet numbered `last_seq`, so a
/// peer that missed it gets it again.
pub async fn receive_file<T: Transport>(
    transport: &T,
    peer: SocketAddr,
    total: u32,
    last_seq: u32,
    responder: &mut Responder,
    config: &TimerConfig,
) -> Result<Received> {
    let started = Instant::now();
    let mut reassembly = Reassembly::new(total, last_seq);
    let mut stats = TransferStats {
        bytes: u64::from(total),
        optimal_packets: fragment_count(total as usize) as u64,
        ..TransferStats::default()
    };
    let mut deadline = idle_deadline(config);

    while !reassembly.is_complete() {
        let Some(bytes) = recv_from_peer(transport, peer, MAX_PACKET_SIZE, deadline).await? else {
            return Err(silence(config, peer));
        };
        let Some(packet) = intact_packet(&bytes) else {
            continue;
        };
        stats.packets += 1;
        if responder.replay_if_retransmission(transport, peer, packet.header.seq).await? {
            stats.duplicates += 1;
            continue;
        }
        match reassembly.offer(&packet.header, &packet.payload) {
            ReceiveState::Append => {
                let ack = response_to(&packet.header, 0, Flags::ACK, Vec::new());
                responder.respond(transport, peer, &ack).await?;
                deadline = idle_deadline(config);
                log::debug!(
                    "[saw] <- fragment seq={} len={} ({}% of {total} bytes)",
                    packet.header.seq,
                    packet.payload.len(),
                    progress(reassembly.offset() as u64, u64::from(total))
                );
            }
            state => log::debug!(
                "[saw] {state}: seq={} flags={:?} len={}, expecting seq={}",
                packet.header.seq,
                packet.header.flags,
                packet.payload.len(),
                reassembly.last_seq().wrapping_add(1)
            ),
        }
    }

    stats.elapsed = started.elapsed();
    log::info!("[saw] received {stats}");
    let last_seq = reassembly.last_seq();
    Ok(Received {
        data: reassembly.finish(),
        stats,
        last_seq,
    })
}

/// Wait for the `CHECK` packet following `last_seq` and return its header
/// and the checksum it carries.
pub async fn await_checksum<T: Transport>(
    transport: &T,
    peer: SocketAddr,
    last_seq: u32,
    responder: &Responder,
    config: &TimerConfig,
) -> Result<(Header, u16)> {
    let deadline = idle_deadline(config);
    loop {
        let Some(bytes) = recv_from_peer(transport, peer, MAX_PACKET_SIZE, deadline).await? else {
            return Err(silence(config, peer));
        };
        let Some(packet) = intact_packet(&bytes) else {
            continue;
        };
        let h = packet.header;
        if responder.replay_if_retransmission(transport, peer, h.seq).await? {
            continue;
        }
        if !h.flags.contains(Flags::CHECK) || h.seq != last_seq.wrapping_add(1) {
            log::debug!("[saw] ignoring seq={} flags={:?} while waiting for CHECK", h.seq, h.flags);
            continue;
        }
        match integrity::decode_check_payload(&packet.payload) {
            Some(checksum) => return Ok((h, checksum)),
            None => log::warn!("[saw] CHECK with {} byte payload ignored", packet.payload.len()),
        }
    }
}

/// Keep answering retransmissions from `peer` for `duration`.
pub async fn linger<T: Transport>(
    transport: &T,
    peer: SocketAddr,
    responder: &Responder,
    duration: Duration,
) -> Result<()> {
    let deadline = Instant::now() + duration;
    while let Some(bytes) = recv_from_peer(transport, peer, MAX_PACKET_SIZE, Some(deadline)).await? {
        if let Some(packet) = intact_packet(&bytes) {
            responder
                .replay_if_retransmission(transport, peer, packet.header.seq)
                .await?;
        }
    }
    Ok(())
}

fn intact_packet(bytes: &[u8]) -> Option<Packet> {
    if !integrity::is_intact(bytes) {
        log::debug!("[saw] dropping corrupt datagram ({} bytes)", bytes.len());
        return None;
    }
    Packet::decode(bytes).ok()
}

fn idle_deadline(config: &TimerConfig) -> Option<Instant> {
    config.idle_limit().map(|limit| Instant::now() + limit)
}

fn silence(config: &TimerConfig, peer: SocketAddr) -> Error {
    log::warn!("[saw] nothing from {peer} for {:?}; giving up", config.idle_limit());
    Error::TransportFailure {
        peer,
        attempts: config.max_retries.map_or(0, |n| n.saturating_add(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{Simulator, SimulatorConfig};
    use crate::socket::Socket;

    async fn bind() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    fn config() -> TimerConfig {
        TimerConfig::with_rtt(Duration::from_millis(100))
    }

    /// Run a full fragment + checksum transfer from `a` to `b`.
    async fn transfer<A: Transport + 'static>(a: A, b: Socket, data: Vec<u8>) -> (Vec<u8>, TransferStats, Packet) {
        let (a_addr, b_addr) = (a.local_addr(), b.local_addr());
        let total = data.len() as u32;
        let receiver = tokio::spawn(async move {
            let mut responder = Responder::new();
            let received = receive_file(&b, a_addr, total, 99, &mut responder, &config())
                .await
                .unwrap();
            let (check, checksum) = await_checksum(&b, a_addr, received.last_seq, &responder, &config())
                .await
                .unwrap();
            let flags = if checksum == integrity::file_checksum(&received.data) {
                Flags::ACK
            } else {
                Flags::ACK | Flags::INCORRECT
            };
            responder
                .respond(&b, a_addr, &response_to(&check, 0, flags, Vec::new()))
                .await
                .unwrap();
            linger(&b, a_addr, &responder, Duration::from_millis(300)).await.unwrap();
            received.data
        });

        let mut engine = AckEngine::new(&a, b_addr, config());
        let (stats, cursor) = send_file(&mut engine, &data, Cursor::new(99, 7)).await.unwrap();
        let (verdict, _) = send_checksum(&mut engine, &data, cursor).await.unwrap();
        (receiver.await.unwrap(), stats, verdict)
    }

    #[tokio::test]
    async fn clean_transfer_reproduces_the_file() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
        let (got, stats, verdict) = transfer(bind().await, bind().await, data.clone()).await;
        assert_eq!(got, data);
        assert_eq!(stats.optimal_packets, 3);
        assert_eq!(stats.packets, 3);
        assert_eq!(verdict.header.flags, Flags::ACK);
    }

    #[tokio::test]
    async fn empty_file_transfers() {
        let (got, stats, verdict) = transfer(bind().await, bind().await, Vec::new()).await;
        assert!(got.is_empty());
        assert_eq!(stats.packets, 1);
        assert!(!verdict.header.flags.contains(Flags::INCORRECT));
    }

    #[tokio::test]
    async fn corrupted_fragment_is_retransmitted() {
        let data = vec![0xabu8; 3000];
        let sim = Simulator::new(
            bind().await,
            SimulatorConfig {
                corrupt_sends: vec![1],
                ..SimulatorConfig::default()
            },
        );
        let (got, stats, _) = transfer(sim, bind().await, data.clone()).await;
        assert_eq!(got, data);
        assert_eq!(stats.retransmissions(), 1);
    }

    #[tokio::test]
    async fn payload_damage_is_caught_by_file_checksum() {
        let data = vec![0x11u8; 2000];
        let sim = Simulator::new(
            bind().await,
            SimulatorConfig {
                corrupt_payload_sends: vec![0],
                ..SimulatorConfig::default()
            },
        );
        let (got, _, verdict) = transfer(sim, bind().await, data.clone()).await;
        assert_ne!(got, data);
        assert!(verdict.header.flags.contains(Flags::INCORRECT));
    }

    #[tokio::test]
    async fn silent_sender_fails_a_bounded_receiver() {
        let (a, b) = (bind().await, bind().await);
        let config = TimerConfig {
            max_retries: Some(1),
            ..TimerConfig::with_rtt(Duration::from_millis(20))
        };
        let mut responder = Responder::new();
        let result = receive_file(&b, a.local_addr(), 10, 0, &mut responder, &config).await;
        assert!(matches!(result, Err(Error::TransportFailure { attempts: 2, .. })));
    }
}
