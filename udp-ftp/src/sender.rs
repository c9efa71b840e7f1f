//! Outbound fragment state for stop-and-wait file transfer.
//!
//! [`FragmentSender`] splits a file buffer into fragments and tracks the
//! read offset and sequence numbering.  It does **not** touch the socket;
//! [`crate::stop_and_wait::send_file`] calls these methods and owns the
//! actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** fragment is in flight at any moment.
//! - The offset only moves on a valid acknowledgement of that fragment.
//! - Sequence numbers grow by one per packet and wrap at `u32::MAX`.

use crate::packet::{Flags, Header, Packet, PacketError, MAX_PAYLOAD};
use crate::state::SendState;

/// Number of fragments a file of `len` bytes is sent in.
///
/// An empty file still takes one (empty, `LAST`) fragment.
pub fn fragment_count(len: usize) -> usize {
    len.div_ceil(MAX_PAYLOAD).max(1)
}

/// Fragment slices of `data` in order, each with its fragment flag.
pub fn fragments(data: &[u8]) -> impl Iterator<Item = (&[u8], Flags)> + '_ {
    let count = fragment_count(data.len());
    (0..count).map(move |i| fragment(data, i, count))
}

fn fragment(data: &[u8], index: usize, count: usize) -> (&[u8], Flags) {
    let start = (index * MAX_PAYLOAD).min(data.len());
    let end = (start + MAX_PAYLOAD).min(data.len());
    let flag = if index + 1 == count {
        Flags::LAST
    } else {
        Flags::MORE_FRAGMENTS
    };
    (&data[start..end], flag)
}

/// The two numbers an endpoint threads through an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Sequence number of the last packet this side sent.
    pub seq: u32,
    /// Sequence number of the last packet validly received from the peer.
    pub ack: u32,
}

impl Cursor {
    pub fn new(seq: u32, ack: u32) -> Self {
        Self { seq, ack }
    }

    /// Build the next packet in this side's sequence space.
    pub fn next_packet(&self, total_file_size: u32, flags: Flags, payload: Vec<u8>) -> Packet {
        Packet::new(total_file_size, self.seq.wrapping_add(1), self.ack, flags, payload)
    }

    /// Move on after `reply` acknowledged our packet.
    pub fn advance(&mut self, reply: &Header) {
        self.seq = reply.ack;
        self.ack = reply.seq;
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u32,
    len: usize,
    last: bool,
}

/// Stop-and-wait send-side state for one file.
#[derive(Debug)]
pub struct FragmentSender<'a> {
    data: &'a [u8],
    total: u32,
    offset: usize,
    index: usize,
    count: usize,
    cursor: Cursor,
    state: SendState,
    in_flight: Option<InFlight>,
}

impl<'a> FragmentSender<'a> {
    /// Start sending `data`; the first fragment follows `cursor`.
    pub fn new(data: &'a [u8], cursor: Cursor) -> Result<Self, PacketError> {
        let total = u32::try_from(data.len()).map_err(|_| PacketError::FieldOverflow {
            field: "total file size",
            value: data.len() as u64,
        })?;
        Ok(Self {
            data,
            total,
            offset: 0,
            index: 0,
            count: fragment_count(data.len()),
            cursor,
            state: SendState::PrepareFragment,
            in_flight: None,
        })
    }

    /// Build the next fragment, or `None` once the transfer is done.
    ///
    /// While a fragment is in flight the same packet is rebuilt.
    pub fn prepare(&mut self) -> Option<Packet> {
        if self.state == SendState::Done {
            return None;
        }
        let (bytes, flag) = fragment(self.data, self.index, self.count);
        let packet = self.cursor.next_packet(self.total, flag, bytes.to_vec());
        self.in_flight = Some(InFlight {
            seq: packet.header.seq,
            len: bytes.len(),
            last: flag == Flags::LAST,
        });
        self.state = SendState::SendAndWait;
        Some(packet)
    }

    /// Apply an acknowledgement; returns `true` if it moved the transfer on.
    ///
    /// Anything but an `ACK` of the fragment in flight is ignored, so a
    /// duplicated acknowledgement advances the offset only once.
    pub fn on_ack(&mut self, reply: &Header) -> bool {
        let Some(in_flight) = self.in_flight else {
            return false;
        };
        if self.state != SendState::SendAndWait
            || !reply.flags.contains(Flags::ACK)
            || reply.ack != in_flight.seq
        {
            return false;
        }
        self.state = SendState::Advance;
        self.offset += in_flight.len;
        self.index += 1;
        self.cursor.advance(reply);
        self.in_flight = None;
        self.state = if in_flight.last {
            SendState::Done
        } else {
            SendState::PrepareFragment
        };
        true
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SendState::Done
    }

    /// Bytes acknowledged so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Fragments acknowledged so far.
    pub fn acknowledged(&self) -> usize {
        self.index
    }

    pub fn fragment_count(&self) -> usize {
        self.count
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }
}
