//! Inbound fragment reassembly.
//!
//! [`Reassembly`] is responsible for everything that happens *after* a
//! fragment has passed the header checksum and *before* the whole file is
//! handed back for whole-file checksum verification:
//! - Checking that the fragment is the next one in the peer's sequence.
//! - Checking that its payload fits the room left in the buffer.
//! - Copying it in at the current write offset.
//!
//! It sends nothing; [`crate::stop_and_wait::receive_file`] acknowledges
//! the fragments it appends.

use crate::packet::{Flags, Header};
use crate::state::ReceiveState;

/// Destination buffer and write offset for one incoming file.
#[derive(Debug)]
pub struct Reassembly {
    buffer: Vec<u8>,
    offset: usize,
    /// Sequence number of the last packet accepted from the peer.
    last_seq: u32,
    fragments: u32,
    state: ReceiveState,
}

impl Reassembly {
    /// Expect `total` bytes, starting with the packet after `last_seq`.
    pub fn new(total: u32, last_seq: u32) -> Self {
        Self {
            buffer: vec![0u8; total as usize],
            offset: 0,
            last_seq,
            fragments: 0,
            state: ReceiveState::AwaitFragment,
        }
    }

    /// Validate one fragment and append it when acceptable.
    ///
    /// Returns [`ReceiveState::Append`] when the fragment was copied in (the
    /// caller must acknowledge it), [`ReceiveState::Reject`] otherwise.
    pub fn offer(&mut self, header: &Header, payload: &[u8]) -> ReceiveState {
        if self.state == ReceiveState::Complete {
            return ReceiveState::Reject;
        }
        self.state = ReceiveState::Validate;
        let verdict = if self.acceptable(header, payload) {
            self.buffer[self.offset..self.offset + payload.len()].copy_from_slice(payload);
            self.offset += payload.len();
            self.last_seq = header.seq;
            self.fragments += 1;
            ReceiveState::Append
        } else {
            ReceiveState::Reject
        };
        self.state = if verdict == ReceiveState::Append && header.flags.contains(Flags::LAST) {
            ReceiveState::Complete
        } else {
            ReceiveState::AwaitFragment
        };
        verdict
    }

    fn acceptable(&self, header: &Header, payload: &[u8]) -> bool {
        if !header.flags.is_fragment() || header.seq != self.last_seq.wrapping_add(1) {
            return false;
        }
        let room = self.remaining();
        if header.flags.contains(Flags::LAST) {
            payload.len() == room
        } else {
            payload.len() <= room
        }
    }

    /// Bytes still missing.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn total(&self) -> usize {
        self.buffer.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn fragments(&self) -> u32 {
        self.fragments
    }

    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ReceiveState::Complete
    }

    /// The reassembled file.
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}
