//! Client side of the command protocol.
//!
//! Every command opens with a request numbered from fresh random sequence
//! numbers and an [`AckEngine::exchange`] for the server's first reply.  A
//! reply carrying `DOES_NOT_EXIST` or `DOES_ALREADY_EXIST` ends the command
//! there; otherwise the transfer phase follows.
//!
//! The client's last reply to the server outlives the command that sent it.
//! If it is lost after the linger time, the server is still resending its
//! last packet when the next command starts, and that command replays the
//! reply while it waits.

use std::net::SocketAddr;

use tokio::sync::Mutex;

use crate::ack::{response_to, AckEngine, Responder};
use crate::command::{message_payload, message_text, Command, Outcome, Request};
use crate::error::{Error, Result};
use crate::integrity;
use crate::packet::{Flags, Packet, MESSAGE_BUFFER_SIZE};
use crate::sender::Cursor;
use crate::socket::Transport;
use crate::stop_and_wait::{await_checksum, linger, receive_file, send_checksum, send_file, Received};
use crate::storage::{validate_name, FileStore};
use crate::timer::TimerConfig;

pub struct Client<T> {
    transport: T,
    server: SocketAddr,
    store: FileStore,
    config: TimerConfig,
    /// Held for the whole of each command.
    responder: Mutex<Responder>,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, server: SocketAddr, store: FileStore, config: TimerConfig) -> Self {
        Self {
            transport,
            server,
            store,
            config,
            responder: Mutex::new(Responder::new()),
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `request` to completion.
    pub async fn execute(&self, request: &Request) -> Result<Outcome> {
        if !request.is_well_formed() {
            return Err(Error::InvalidFileName(request.names.join(" ")));
        }
        let names = &request.names;
        match request.command {
            Command::Upload => self.upload(&names[0]).await,
            Command::Download => self.download(&names[0]).await,
            Command::Remove => self.remove(&names[0]).await,
            Command::Replace => self.replace(&names[0], &names[1]).await,
            Command::List => self.list().await,
            Command::Close => self.close().await,
        }
    }

    pub async fn upload(&self, name: &str) -> Result<Outcome> {
        let data = self.read_local(name).await?;
        let request = Request::new(Command::Upload, vec![name.to_string()]);
        self.send_request_then_file(&request, &data).await
    }

    pub async fn replace(&self, old: &str, new: &str) -> Result<Outcome> {
        validate_name(old)?;
        let data = self.read_local(new).await?;
        let request = Request::new(Command::Replace, vec![old.to_string(), new.to_string()]);
        self.send_request_then_file(&request, &data).await
    }

    pub async fn download(&self, name: &str) -> Result<Outcome> {
        validate_name(name)?;
        if self.store.file_exists(name).await {
            return Err(Error::LocalFileExists(name.to_string()));
        }
        let mut responder = self.responder.lock().await;
        let request = Request::new(Command::Download, vec![name.to_string()]);
        let (_, reply) = self.open(&mut self.engine(&responder), &request, 0).await?;
        if let Some(rejected) = rejection(&reply) {
            return Ok(rejected);
        }

        let received = self.receive(&reply, &mut responder).await?;
        let (check, expected) = await_checksum(
            &self.transport,
            self.server,
            received.last_seq,
            &responder,
            &self.config,
        )
        .await?;

        self.store.write(name, &received.data).await?;
        let intact = integrity::file_checksum(&received.data) == expected;
        let (flags, message) = if intact {
            (Flags::ACK, format!("The file {name} was downloaded successfully"))
        } else {
            self.store.remove(name).await?;
            log::warn!("[client] checksum mismatch for {name}; local copy deleted");
            (
                Flags::ACK | Flags::INCORRECT,
                format!("The file {name} was corrupted in transit and has been deleted"),
            )
        };
        let verdict = response_to(&check, 0, flags, message_payload(&message));
        responder.respond(&self.transport, self.server, &verdict).await?;
        linger(&self.transport, self.server, &responder, self.config.linger).await?;

        Ok(if intact {
            Outcome::Done {
                message,
                stats: Some(received.stats),
            }
        } else {
            Outcome::Incorrect { message }
        })
    }

    pub async fn remove(&self, name: &str) -> Result<Outcome> {
        validate_name(name)?;
        let request = Request::new(Command::Remove, vec![name.to_string()]);
        let responder = self.responder.lock().await;
        let (_, reply) = self.open(&mut self.engine(&responder), &request, 0).await?;
        Ok(rejection(&reply).unwrap_or_else(|| Outcome::Done {
            message: message_text(&reply.payload),
            stats: None,
        }))
    }

    pub async fn list(&self) -> Result<Outcome> {
        let request = Request::new(Command::List, Vec::new());
        let mut responder = self.responder.lock().await;
        let (_, reply) = self.open(&mut self.engine(&responder), &request, 0).await?;
        if let Some(rejected) = rejection(&reply) {
            return Ok(rejected);
        }
        let received = self.receive(&reply, &mut responder).await?;
        linger(&self.transport, self.server, &responder, self.config.linger).await?;
        let names = String::from_utf8_lossy(&received.data)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(Outcome::Listing {
            names,
            stats: received.stats,
        })
    }

    pub async fn close(&self) -> Result<Outcome> {
        let request = Request::new(Command::Close, Vec::new());
        let responder = self.responder.lock().await;
        let (_, reply) = self.open(&mut self.engine(&responder), &request, 0).await?;
        Ok(Outcome::Closed {
            message: message_text(&reply.payload),
        })
    }

    fn engine<'a>(&'a self, responder: &'a Responder) -> AckEngine<'a, T> {
        AckEngine::new(&self.transport, self.server, self.config.clone()).with_responder(responder)
    }

    async fn read_local(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        if !self.store.file_exists(name).await {
            return Err(Error::LocalFileMissing(name.to_string()));
        }
        let data = self.store.read(name).await?;
        if u32::try_from(data.len()).is_err() {
            return Err(Error::FileTooLarge {
                name: name.to_string(),
                size: data.len() as u64,
            });
        }
        Ok(data)
    }

    /// Send `request` from fresh random sequence numbers; returns the
    /// request's sequence number and the server's first reply.
    async fn open(&self, engine: &mut AckEngine<'_, T>, request: &Request, total: u32) -> Result<(u32, Packet)> {
        let packet = request.to_packet(total, rand::random(), rand::random())?;
        log::info!("[client] -> `{request}` seq={} size={total}", packet.header.seq);
        let reply = engine.exchange(&packet, MESSAGE_BUFFER_SIZE).await?;
        log::debug!(
            "[client] <- {:?} size={} `{}`",
            reply.header.flags,
            reply.header.total_file_size,
            message_text(&reply.payload)
        );
        Ok((packet.header.seq, reply))
    }

    /// Upload or replace: request, then fragments, then the checksum.
    async fn send_request_then_file(&self, request: &Request, data: &[u8]) -> Result<Outcome> {
        let responder = self.responder.lock().await;
        let mut engine = self.engine(&responder);
        // `read_local` already checked the size fits.
        let total = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let (seq, reply) = self.open(&mut engine, request, total).await?;
        if let Some(rejected) = rejection(&reply) {
            return Ok(rejected);
        }

        let cursor = Cursor::new(seq, reply.header.seq);
        let (stats, cursor) = send_file(&mut engine, data, cursor).await?;
        let (verdict, _) = send_checksum(&mut engine, data, cursor).await?;
        let message = message_text(&verdict.payload);
        if verdict.header.flags.contains(Flags::INCORRECT) {
            log::warn!("[client] server reports a corrupted upload: {message}");
            return Ok(Outcome::Incorrect { message });
        }
        Ok(Outcome::Done {
            message,
            stats: Some(stats),
        })
    }

    /// Confirm the server's announcement and receive what it announced.
    async fn receive(&self, announce: &Packet, responder: &mut Responder) -> Result<Received> {
        let confirm = response_to(&announce.header, 0, Flags::ACK, Vec::new());
        responder.respond(&self.transport, self.server, &confirm).await?;
        receive_file(
            &self.transport,
            self.server,
            announce.header.total_file_size,
            announce.header.seq,
            responder,
            &self.config,
        )
        .await
    }
}

/// The outcome for a reply carrying a status flag, if any.
fn rejection(reply: &Packet) -> Option<Outcome> {
    let status = reply.header.flags & (Flags::DOES_NOT_EXIST | Flags::DOES_ALREADY_EXIST);
    (!status.is_empty()).then(|| Outcome::Rejected {
        status,
        message: message_text(&reply.payload),
    })
}
