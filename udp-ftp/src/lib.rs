//! `udp-ftp`: a point-to-point file-transfer service over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐    requests     ┌──────────┐
//!  │  Client  │────────────────▶│  Server  │
//!  └────┬─────┘                 └────┬─────┘
//!       │     command choreography   │
//!  ┌────▼────────────────────────────▼─────┐
//!  │            Stop-and-Wait              │
//!  │  (fragmenting sender, reassembly)     │
//!  └────┬──────────────────────────────────┘
//!       │ one packet in flight
//!  ┌────▼──────────────────────────────────┐
//!  │       Acknowledgement engine          │
//!  │  (send-and-wait, retry, replay)       │
//!  └────┬──────────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │ Transport │  (tokio UdpSocket, or the fault simulator in tests)
//!  └───────────┘
//! ```
//!
//! Data flows strictly downward.  Each module has a single responsibility:
//! - [`packet`]        wire format (header layout, flags, encode / decode)
//! - [`integrity`]     header checksum and whole-file checksum
//! - [`error`]         crate-wide error type
//! - [`timer`]         retransmission interval and retry budget
//! - [`socket`]        async UDP socket abstraction
//! - [`simulator`]     lossy / corrupting network layer for testing
//! - [`ack`]           send-and-wait-with-retry, duplicate filter, replies
//! - [`state`]         stop-and-wait state machine types
//! - [`sender`]        outbound fragmenting state
//! - [`receiver`]      inbound reassembly state
//! - [`stop_and_wait`] async file send / receive drivers
//! - [`stats`]         per-transfer statistics
//! - [`storage`]       files under a root directory
//! - [`command`]       requests, replies and outcomes
//! - [`server`]        server main loop and command handlers
//! - [`client`]        client command choreographies
//! - [`prompt`]        interactive command-line parser

pub mod ack;
pub mod client;
pub mod command;
pub mod error;
pub mod integrity;
pub mod packet;
pub mod prompt;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stats;
pub mod stop_and_wait;
pub mod storage;
pub mod timer;

pub use error::{Error, Result};
