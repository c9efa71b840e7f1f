//! Command requests and their outcomes.
//!
//! A request is one packet carrying exactly one command flag; its payload
//! holds zero, one or two file names separated by a space.  Replies carry
//! `ACK`, at most one status flag and a short human-readable message.

use std::fmt;

use crate::error::{Error, Result};
use crate::packet::{Flags, Packet, HEADER_LEN, MESSAGE_BUFFER_SIZE};
use crate::stats::TransferStats;

/// Longest message that fits a reply in the message buffer.
pub const MAX_MESSAGE_LEN: usize = MESSAGE_BUFFER_SIZE - HEADER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Upload,
    Download,
    Remove,
    Replace,
    List,
    Close,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Upload,
        Command::Download,
        Command::Remove,
        Command::Replace,
        Command::List,
        Command::Close,
    ];

    pub fn flag(self) -> Flags {
        match self {
            Command::Upload => Flags::UPLOAD,
            Command::Download => Flags::DOWNLOAD,
            Command::Remove => Flags::REMOVE,
            Command::Replace => Flags::REPLACE,
            Command::List => Flags::LIST,
            Command::Close => Flags::CLOSE,
        }
    }

    /// The command named by `flags`, if exactly one command bit is set.
    pub fn from_flags(flags: Flags) -> Option<Self> {
        let commands = flags & Flags::COMMANDS;
        Self::ALL.into_iter().find(|c| c.flag() == commands)
    }

    /// Number of file names the command takes.
    pub fn arity(self) -> usize {
        match self {
            Command::Upload | Command::Download | Command::Remove => 1,
            Command::Replace => 2,
            Command::List | Command::Close => 0,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Upload => "upload",
            Command::Download => "download",
            Command::Remove => "remove",
            Command::Replace => "replace",
            Command::List => "list",
            Command::Close => "close",
        })
    }
}

/// A command plus its file-name arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    pub command: Command,
    pub names: Vec<String>,
}

impl Request {
    pub fn new(command: Command, names: Vec<String>) -> Self {
        Self { command, names }
    }

    /// Read a request out of a received packet.
    ///
    /// Returns `None` when the flags do not name exactly one command.  The
    /// names are not checked here.
    pub fn parse(packet: &Packet) -> Option<Self> {
        let command = Command::from_flags(packet.header.flags)?;
        let names = String::from_utf8_lossy(&packet.payload)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Some(Self { command, names })
    }

    /// `true` if the number of names matches the command.
    pub fn is_well_formed(&self) -> bool {
        self.names.len() == self.command.arity()
    }

    /// First name argument, or `""`.
    pub fn name(&self) -> &str {
        self.names.first().map_or("", String::as_str)
    }

    pub fn payload(&self) -> Vec<u8> {
        self.names.join(" ").into_bytes()
    }

    /// Build the request packet.
    pub fn to_packet(&self, total_file_size: u32, seq: u32, ack: u32) -> Result<Packet> {
        let payload = self.payload();
        if payload.len() > MAX_MESSAGE_LEN {
            return Err(Error::RequestTooLarge(payload.len()));
        }
        Ok(Packet::new(total_file_size, seq, ack, self.command.flag(), payload))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for name in &self.names {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

/// Encode `message`, cut on a character boundary to fit the message buffer.
pub fn message_payload(message: &str) -> Vec<u8> {
    let mut end = message.len().min(MAX_MESSAGE_LEN);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.as_bytes()[..end].to_vec()
}

pub fn message_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// How a command ended, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Completed; transfers include their statistics.
    Done {
        message: String,
        stats: Option<TransferStats>,
    },
    /// The peer answered with `DOES_NOT_EXIST` or `DOES_ALREADY_EXIST`.
    Rejected { status: Flags, message: String },
    /// Whole-file checksum mismatch; the received copy was deleted.
    Incorrect { message: String },
    Listing {
        names: Vec<String>,
        stats: TransferStats,
    },
    Closed { message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Done { .. } | Outcome::Listing { .. } | Outcome::Closed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done { message, stats } => {
                f.write_str(message)?;
                if let Some(stats) = stats {
                    write!(f, "\n   {stats}")?;
                }
                Ok(())
            }
            Outcome::Rejected { message, .. } | Outcome::Incorrect { message } | Outcome::Closed { message } => {
                f.write_str(message)
            }
            Outcome::Listing { names, .. } => {
                f.write_str("The following files are stored on the server:")?;
                for name in names {
                    write!(f, "\n   {name}")?;
                }
                Ok(())
            }
        }
    }
}
