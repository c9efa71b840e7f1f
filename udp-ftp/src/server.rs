//! File server: one request at a time, start to finish.
//!
//! The main loop blocks on the socket, answers retransmissions from its
//! [`Responder`] cache, and hands every new request to the matching
//! handler, which runs the whole choreography before the loop listens
//! again.
//!
//! | Request  | Success                                      | Failure              |
//! |----------|----------------------------------------------|----------------------|
//! | Upload   | `ACK`, receive fragments, verify `CHECK`     | `ACK\|DOES_ALREADY_EXIST` |
//! | Download | `ACK` + size, send fragments, send `CHECK`   | `ACK\|DOES_NOT_EXIST`     |
//! | Replace  | delete old, `ACK`, receive new, verify       | `ACK\|DOES_NOT_EXIST`     |
//! | Remove   | delete, `ACK`                                | `ACK\|DOES_NOT_EXIST`     |
//! | List     | `ACK` + size, send listing                   | `ACK\|DOES_NOT_EXIST`     |
//! | Close    | `ACK`                                        |                      |

use std::net::SocketAddr;

use crate::ack::{response_to, AckEngine, Responder};
use crate::command::{message_payload, message_text, Command, Request};
use crate::error::Result;
use crate::integrity;
use crate::packet::{Flags, Header, Packet, ACK_BUFFER_SIZE, MAX_PACKET_SIZE};
use crate::sender::Cursor;
use crate::socket::Transport;
use crate::stop_and_wait::{await_checksum, receive_file, send_checksum, send_file};
use crate::storage::{validate_name, FileStore};
use crate::timer::TimerConfig;

/// Identity of an executed request; a retransmitted copy has the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestKey {
    peer: SocketAddr,
    seq: u32,
    request: Request,
}

pub struct Server<T> {
    transport: T,
    store: FileStore,
    config: TimerConfig,
    responder: Responder,
    last_request: Option<RequestKey>,
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, store: FileStore, config: TimerConfig) -> Self {
        Self {
            transport,
            store,
            config,
            responder: Responder::new(),
            last_request: None,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Serve requests until the socket fails.
    pub async fn run(&mut self) -> Result<()> {
        log::info!(
            "[server] listening on {}, serving {}",
            self.local_addr(),
            self.store.root().display()
        );
        loop {
            self.serve_one().await?;
        }
    }

    /// Handle one incoming datagram.
    ///
    /// Returns the command executed, or `None` if the datagram was dropped,
    /// replayed to or ignored.  Only socket errors are returned; a failing
    /// command is logged and the server carries on.
    pub async fn serve_one(&mut self) -> Result<Option<Command>> {
        let (bytes, peer) = self.transport.recv_from(MAX_PACKET_SIZE).await?;
        if !integrity::is_intact(&bytes) {
            log::debug!("[server] dropping corrupt datagram from {peer}");
            return Ok(None);
        }
        let packet = Packet::decode(&bytes)?;
        let header = packet.header;
        if self
            .responder
            .replay_if_retransmission(&self.transport, peer, header.seq)
            .await?
        {
            return Ok(None);
        }
        let Some(request) = Request::parse(&packet) else {
            log::debug!(
                "[server] ignoring stray seq={} flags={:?} from {peer}",
                header.seq,
                header.flags
            );
            return Ok(None);
        };

        let key = RequestKey {
            peer,
            seq: header.seq,
            request: request.clone(),
        };
        if self.last_request.as_ref() == Some(&key) {
            log::debug!("[server] ignoring repeated request `{request}` seq={}", header.seq);
            return Ok(None);
        }
        self.last_request = Some(key);

        log::info!("[server] {peer} requested `{request}`");
        if let Err(e) = self.dispatch(peer, &header, &request).await {
            log::error!("[server] `{request}` from {peer} failed: {e}");
        }
        Ok(Some(request.command))
    }

    async fn dispatch(&mut self, peer: SocketAddr, header: &Header, request: &Request) -> Result<()> {
        if !request.is_well_formed() {
            return self
                .reject(peer, header, Flags::DOES_NOT_EXIST, "Malformed request".into())
                .await;
        }
        match request.command {
            Command::Upload => self.upload(peer, header, request.name()).await,
            Command::Download => self.download(peer, header, request.name()).await,
            Command::Remove => self.remove(peer, header, request.name()).await,
            Command::Replace => self.replace(peer, header, &request.names[0], &request.names[1]).await,
            Command::List => self.list(peer, header).await,
            Command::Close => {
                log::info!("[server] {peer} closed its session");
                self.reply(peer, header, Flags::ACK, "Goodbye").await
            }
        }
    }

    async fn upload(&mut self, peer: SocketAddr, header: &Header, name: &str) -> Result<()> {
        if validate_name(name).is_err() {
            let message = format!("Invalid file name {name}");
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        }
        if self.store.file_exists(name).await {
            let message = format!("The file {name} already exists on the server");
            return self.reject(peer, header, Flags::DOES_ALREADY_EXIST, message).await;
        }
        self.reply(peer, header, Flags::ACK, &format!("Ready to receive {name}"))
            .await?;
        self.receive_and_store(peer, header, name).await
    }

    async fn replace(&mut self, peer: SocketAddr, header: &Header, old: &str, new: &str) -> Result<()> {
        if !self.store.file_exists(old).await {
            let message = format!("The file {old} does not exist on the server");
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        }
        if validate_name(new).is_err() {
            let message = format!("Invalid file name {new}");
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        }
        self.store.remove(old).await?;
        log::info!("[server] removed {old}, replacing it by {new}");
        self.reply(peer, header, Flags::ACK, &format!("Replacing {old} by {new}"))
            .await?;
        self.receive_and_store(peer, header, new).await
    }

    /// Receive a file announced by `request`, store it and answer the
    /// whole-file checksum.
    async fn receive_and_store(&mut self, peer: SocketAddr, request: &Header, name: &str) -> Result<()> {
        let received = receive_file(
            &self.transport,
            peer,
            request.total_file_size,
            request.seq,
            &mut self.responder,
            &self.config,
        )
        .await?;
        let (check, expected) =
            await_checksum(&self.transport, peer, received.last_seq, &self.responder, &self.config).await?;

        self.store.write(name, &received.data).await?;
        let (flags, message) = if integrity::file_checksum(&received.data) == expected {
            log::info!("[server] stored {name} ({} bytes)", received.data.len());
            (
                Flags::ACK,
                format!("The file {name} was stored successfully ({} bytes)", received.data.len()),
            )
        } else {
            self.store.remove(name).await?;
            log::warn!("[server] checksum mismatch for {name}; file deleted");
            (
                Flags::ACK | Flags::INCORRECT,
                format!("The file {name} was corrupted in transit and has been deleted"),
            )
        };
        self.reply(peer, &check, flags, &message).await
    }

    async fn download(&mut self, peer: SocketAddr, header: &Header, name: &str) -> Result<()> {
        if !self.store.file_exists(name).await {
            let message = format!("The file {name} does not exist on the server");
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        }
        let data = self.store.read(name).await?;
        let Ok(total) = u32::try_from(data.len()) else {
            let message = format!("The file {name} is too large to send");
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        };
        self.send_to_client(peer, header, &data, total, &format!("Sending {name}"), true)
            .await
    }

    async fn list(&mut self, peer: SocketAddr, header: &Header) -> Result<()> {
        let names = self.store.list_file_names().await?;
        if names.is_empty() {
            let message = "No files are stored on the server".to_string();
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        }
        let listing = names.join("\n").into_bytes();
        let total = u32::try_from(listing.len()).unwrap_or(u32::MAX);
        let message = format!("{} files stored", names.len());
        self.send_to_client(peer, header, &listing, total, &message, false)
            .await
    }

    /// Announce `data`, wait for the client to confirm, then send it.
    async fn send_to_client(
        &mut self,
        peer: SocketAddr,
        request: &Header,
        data: &[u8],
        total: u32,
        message: &str,
        with_checksum: bool,
    ) -> Result<()> {
        let mut engine = AckEngine::new(&self.transport, peer, self.config.clone());
        let announce = response_to(request, total, Flags::ACK, message_payload(message));
        let confirm = engine.exchange(&announce, ACK_BUFFER_SIZE).await?;
        let cursor = Cursor::new(announce.header.seq, confirm.header.seq);
        let (_, cursor) = send_file(&mut engine, data, cursor).await?;
        if with_checksum {
            let (verdict, _) = send_checksum(&mut engine, data, cursor).await?;
            if verdict.header.flags.contains(Flags::INCORRECT) {
                log::warn!(
                    "[server] client reports a corrupted copy: {}",
                    message_text(&verdict.payload)
                );
            }
        }
        Ok(())
    }

    async fn remove(&mut self, peer: SocketAddr, header: &Header, name: &str) -> Result<()> {
        if validate_name(name).is_err() || !self.store.remove(name).await? {
            let message = format!("The file {name} does not exist on the server");
            return self.reject(peer, header, Flags::DOES_NOT_EXIST, message).await;
        }
        log::info!("[server] removed {name}");
        self.reply(peer, header, Flags::ACK, &format!("The file {name} was removed"))
            .await
    }

    async fn reject(&mut self, peer: SocketAddr, header: &Header, status: Flags, message: String) -> Result<()> {
        log::info!("[server] rejecting: {message}");
        self.reply(peer, header, Flags::ACK | status, &message).await
    }

    async fn reply(&mut self, peer: SocketAddr, header: &Header, flags: Flags, message: &str) -> Result<()> {
        let response = response_to(header, 0, flags, message_payload(message));
        self.responder.respond(&self.transport, peer, &response).await
    }
}
