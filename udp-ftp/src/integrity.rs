//! Header checksum and whole-file checksum.
//!
//! Two independent one's-complement checks protect different things:
//!
//! - The **header checksum** covers the header fields (everything except the
//!   checksum itself) plus a pseudo-trailer of `(payload_length, HEADER_LEN)`.
//!   Payload bytes are *not* covered: a fragment whose payload is damaged in
//!   transit is still acknowledged.
//! - The **whole-file checksum** covers every byte of a reassembled file and
//!   is exchanged once, in a `CHECK` packet, after the last fragment.  It is
//!   the only end-to-end defence against payload corruption.

use crate::packet::{self, HEADER_LEN, OFF_CHECKSUM};

/// Sum consecutive 16-bit big-endian words into `sum`.
///
/// An odd trailing byte is padded with a zero byte on the right.
fn add_words(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum = fold(sum + u32::from(u16::from_be_bytes([pair[0], pair[1]])));
    }
    if let [last] = chunks.remainder() {
        sum = fold(sum + (u32::from(*last) << 8));
    }
    sum
}

/// Fold any carry out of bit 16 back into bit 0.
fn fold(mut sum: u32) -> u32 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum
}

/// Compute the header checksum for `header` carrying `payload_length` bytes.
///
/// The checksum field inside `header` is ignored, so this works on both a
/// header under construction and one read off the wire.
pub fn header_checksum(header: &[u8; HEADER_LEN], payload_length: u32) -> u16 {
    let mut sum = add_words(0, &header[..OFF_CHECKSUM]);
    sum = fold(sum + (payload_length >> 16));
    sum = fold(sum + (payload_length & 0xffff));
    sum = fold(sum + HEADER_LEN as u32);
    !(sum as u16)
}

/// Recompute the header checksum of `datagram` and compare it with the
/// stored one for exact equality.
///
/// Returns `false` for a datagram too short to hold a header.
pub fn is_checksum_correct(datagram: &[u8], payload_length: usize) -> bool {
    let Ok(header) = packet::header_bytes(datagram) else {
        return false;
    };
    let Ok(payload_length) = u32::try_from(payload_length) else {
        return false;
    };
    header_checksum(header, payload_length) == packet::checksum(header)
}

/// Convenience form of [`is_checksum_correct`] for a whole received datagram.
pub fn is_intact(datagram: &[u8]) -> bool {
    datagram.len() >= HEADER_LEN && is_checksum_correct(datagram, datagram.len() - HEADER_LEN)
}

/// One's-complement checksum over a whole file buffer.
pub fn file_checksum(data: &[u8]) -> u16 {
    !(add_words(0, data) as u16)
}

/// Payload of a `CHECK` packet carrying `checksum`.
pub fn encode_check_payload(checksum: u16) -> Vec<u8> {
    checksum.to_be_bytes().to_vec()
}

/// Read the checksum out of a `CHECK` payload.
pub fn decode_check_payload(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}
