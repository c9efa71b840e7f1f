//! Wire-format definitions for protocol datagrams.
//!
//! Every datagram exchanged between client and server is a [`Packet`]: a
//! fixed 16-byte header followed by a variable-length payload (a file name,
//! a status message, a file fragment, or nothing).  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Encoding header fields and assembling them with a payload.
//! - Extracting individual fields from a raw datagram.
//!
//! No I/O happens here and nothing is validated on decode: whether a header
//! is intact is decided by [`crate::integrity`].
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Total File Size                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgement Number                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Flags             |            Checksum           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 16 bytes.

use thiserror::Error;

use crate::integrity;

bitflags::bitflags! {
    /// Control bits carried in the `flags` header field.
    ///
    /// A request carries exactly one command bit; a response carries `ACK`
    /// plus at most one status bit; a fragment carries exactly one of
    /// `MORE_FRAGMENTS` / `LAST`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        const CLOSE = 1 << 0;
        const LIST = 1 << 1;
        const REPLACE = 1 << 2;
        const REMOVE = 1 << 3;
        const DOWNLOAD = 1 << 4;
        const UPLOAD = 1 << 5;
        const ACK = 1 << 6;
        const DOES_NOT_EXIST = 1 << 7;
        const DOES_ALREADY_EXIST = 1 << 8;
        const MORE_FRAGMENTS = 1 << 9;
        const LAST = 1 << 10;
        const CHECK = 1 << 11;
        const INCORRECT = 1 << 12;
    }
}

impl Flags {
    /// Every bit that names a command.
    pub const COMMANDS: Flags = Flags::UPLOAD
        .union(Flags::DOWNLOAD)
        .union(Flags::REMOVE)
        .union(Flags::REPLACE)
        .union(Flags::LIST)
        .union(Flags::CLOSE);

    /// `true` for a file fragment (`MORE_FRAGMENTS` or `LAST`).
    pub fn is_fragment(self) -> bool {
        self.intersects(Flags::MORE_FRAGMENTS | Flags::LAST)
    }
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

/// Largest datagram either side sends (path MTU assumption).
pub const MAX_PACKET_SIZE: usize = 1500;

/// Largest fragment payload: one packet minus its header.
pub const MAX_PAYLOAD: usize = MAX_PACKET_SIZE - HEADER_LEN;

/// Receive buffer for replies that carry a human-readable message.
pub const MESSAGE_BUFFER_SIZE: usize = 256;

/// Receive buffer while waiting for an acknowledgement.
///
/// Bare acks are header-only, but a replayed reply to the request that
/// opened the command carries its message, and a truncated datagram would
/// fail its checksum.
pub const ACK_BUFFER_SIZE: usize = MESSAGE_BUFFER_SIZE;

// Byte offsets of each field within the serialised header.
const OFF_TOTAL_SIZE: usize = 0;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_FLAGS: usize = 12;
pub(crate) const OFF_CHECKSUM: usize = 14;

/// Fixed-size protocol header, fields in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Length of the whole file being announced or transferred.
    pub total_file_size: u32,
    /// Sequence number of this packet in the sender's sequence space.
    pub seq: u32,
    /// Sequence number of the last packet validly received from the peer.
    pub ack: u32,
    pub flags: Flags,
    /// One's-complement header checksum.
    ///
    /// Ignored on encode (recomputed); on decode this is the value read from
    /// the wire, unverified.
    pub checksum: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet; the checksum is filled in by [`Packet::encode`].
    pub fn new(total_file_size: u32, seq: u32, ack: u32, flags: Flags, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                total_file_size,
                seq,
                ack,
                flags,
                checksum: 0,
            },
            payload,
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let h = &self.header;
        let header = encode_header(h.total_file_size, h.seq, h.ack, h.flags, self.payload.len())?;
        Ok(assemble(&header, &self.payload))
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Only the length is checked; the checksum is reported, not verified.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let header = header_bytes(buf)?;
        Ok(Packet {
            header: Header {
                total_file_size: total_file_size(header),
                seq: sequence_number(header),
                ack: acknowledgement_number(header),
                flags: flags(header),
                checksum: checksum(header),
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when building or parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    /// A value does not fit the width of its header field.
    #[error("{field} value {value} does not fit its header field")]
    FieldOverflow { field: &'static str, value: u64 },
}

/// Encode every header field and compute the checksum last.
///
/// `payload_length` takes part in the checksum, so it must be known up
/// front; it is rejected rather than truncated when wider than 32 bits.
pub fn encode_header(
    total_file_size: u32,
    seq: u32,
    ack: u32,
    flags: Flags,
    payload_length: usize,
) -> Result<[u8; HEADER_LEN], PacketError> {
    let payload_length = u32::try_from(payload_length).map_err(|_| PacketError::FieldOverflow {
        field: "payload length",
        value: payload_length as u64,
    })?;

    let mut buf = [0u8; HEADER_LEN];
    buf[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 4].copy_from_slice(&total_file_size.to_be_bytes());
    buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&seq.to_be_bytes());
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&ack.to_be_bytes());
    buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&flags.bits().to_be_bytes());

    let csum = integrity::header_checksum(&buf, payload_length);
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
    Ok(buf)
}

/// Header bytes followed by payload bytes.
pub fn assemble(header: &[u8; HEADER_LEN], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(header);
    out.extend_from_slice(payload);
    out
}

/// Borrow the fixed header of a raw datagram.
pub fn header_bytes(buf: &[u8]) -> Result<&[u8; HEADER_LEN], PacketError> {
    buf.get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(PacketError::BufferTooShort(buf.len()))
}

pub fn total_file_size(header: &[u8; HEADER_LEN]) -> u32 {
    read_u32(header, OFF_TOTAL_SIZE)
}

pub fn sequence_number(header: &[u8; HEADER_LEN]) -> u32 {
    read_u32(header, OFF_SEQ)
}

pub fn acknowledgement_number(header: &[u8; HEADER_LEN]) -> u32 {
    read_u32(header, OFF_ACK)
}

/// Unknown bits are retained so that a corrupted flag field still differs
/// from the original.
pub fn flags(header: &[u8; HEADER_LEN]) -> Flags {
    Flags::from_bits_retain(read_u16(header, OFF_FLAGS))
}

pub fn checksum(header: &[u8; HEADER_LEN]) -> u16 {
    read_u16(header, OFF_CHECKSUM)
}

fn read_u32(header: &[u8; HEADER_LEN], off: usize) -> u32 {
    u32::from_be_bytes([header[off], header[off + 1], header[off + 2], header[off + 3]])
}

fn read_u16(header: &[u8; HEADER_LEN], off: usize) -> u16 {
    u16::from_be_bytes([header[off], header[off + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::new(100, 12_345_678, 87_654_321, Flags::ACK, b"Hello".to_vec());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded.header.total_file_size, 100);
        assert_eq!(decoded.header.seq, 12_345_678);
        assert_eq!(decoded.header.ack, 87_654_321);
        assert_eq!(decoded.header.flags, Flags::ACK);
        assert_eq!(decoded.payload, b"Hello");
    }

    #[test]
    fn roundtrip_at_field_extremes() {
        for &(size, seq, ack) in &[(0, 0, 0), (u32::MAX, u32::MAX, u32::MAX), (1, u32::MAX, 0)] {
            let f = Flags::ACK | Flags::DOES_NOT_EXIST;
            let header = encode_header(size, seq, ack, f, 0).unwrap();
            assert_eq!(total_file_size(&header), size);
            assert_eq!(sequence_number(&header), seq);
            assert_eq!(acknowledgement_number(&header), ack);
            assert_eq!(flags(&header), f);
        }
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort(HEADER_LEN - 1))
        );
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
    }

    #[test]
    fn decode_does_not_validate_checksum() {
        let mut bytes = Packet::new(0, 1, 2, Flags::LAST, b"x".to_vec()).encode().unwrap();
        bytes[OFF_CHECKSUM] ^= 0xff;
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.header.seq, 1);
    }

    #[test]
    fn fields_are_big_endian_on_wire() {
        let bytes = Packet::new(0x0a0b_0c0d, 0x0102_0304, 0x0506_0708, Flags::CHECK, vec![])
            .encode()
            .unwrap();
        assert_eq!(&bytes[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 4], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[OFF_FLAGS..OFF_FLAGS + 2], &Flags::CHECK.bits().to_be_bytes());
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let payload = b"exactly twelve!";
        let bytes = Packet::new(0, 0, 0, Flags::MORE_FRAGMENTS, payload.to_vec())
            .encode()
            .unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + payload.len());
    }

    #[test]
    fn composed_flags_survive_roundtrip() {
        let f = Flags::ACK | Flags::DOES_ALREADY_EXIST;
        let bytes = Packet::new(0, 1, 2, f, vec![]).encode().unwrap();
        let header = header_bytes(&bytes).unwrap();
        assert_eq!(flags(header), f);
        assert!(flags(header).contains(Flags::ACK));
        assert!(!flags(header).is_fragment());
    }

    #[test]
    fn unknown_flag_bits_are_retained() {
        let mut bytes = Packet::new(0, 0, 0, Flags::ACK, vec![]).encode().unwrap();
        bytes[OFF_FLAGS] |= 0x80;
        let header = header_bytes(&bytes).unwrap();
        assert_ne!(flags(header), Flags::ACK);
    }

    #[test]
    fn fragment_capacity_constants() {
        assert_eq!(HEADER_LEN, 16);
        assert_eq!(MAX_PAYLOAD, 1484);
    }
}
