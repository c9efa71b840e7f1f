use std::net::SocketAddr;

use thiserror::Error;

use crate::packet::PacketError;

/// Errors surfaced by the transfer and command layers.
///
/// Application-level rejections (`DOES_NOT_EXIST`, `DOES_ALREADY_EXIST`) and
/// whole-file checksum mismatches are ordinary [`crate::command::Outcome`]s,
/// not errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// The configured retry budget ran out while waiting for `peer`.
    #[error("no response from {peer} after {attempts} attempts")]
    TransportFailure { peer: SocketAddr, attempts: u32 },

    #[error("file `{name}` is {size} bytes, more than the 32-bit size field allows")]
    FileTooLarge { name: String, size: u64 },

    #[error("invalid file name `{0}`")]
    InvalidFileName(String),

    #[error("local file `{0}` does not exist")]
    LocalFileMissing(String),

    #[error("local file `{0}` already exists; remove it first")]
    LocalFileExists(String),

    #[error("request payload of {0} bytes does not fit in one packet")]
    RequestTooLarge(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
