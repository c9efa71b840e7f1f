//! Shared fixtures: a server task and a client, each with its own root
//! directory, talking over loopback.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use udp_ftp::{
    client::Client,
    command::Outcome,
    simulator::{Simulator, SimulatorConfig},
    socket::{Socket, Transport},
    server::Server,
    stats::TransferStats,
    storage::FileStore,
    timer::TimerConfig,
};

pub fn config() -> TimerConfig {
    TimerConfig::with_rtt(Duration::from_millis(200))
}

/// Bind a socket to an OS-assigned port on loopback.
pub async fn ephemeral() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed")
}

pub async fn faulty(config: SimulatorConfig) -> Simulator<Socket> {
    Simulator::new(ephemeral().await, config)
}

/// Start a server on `transport` in a background task.
///
/// Returns its address and root directory; files can be placed in the root
/// at any time.
pub async fn spawn_server<T: Transport + 'static>(transport: T, config: TimerConfig) -> (SocketAddr, TempDir) {
    let dir = tempfile::tempdir().expect("server dir");
    let store = FileStore::open(dir.path()).await.expect("server store");
    let mut server = Server::new(transport, store, config);
    let addr = server.local_addr();
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            panic!("server failed: {e}");
        }
    });
    (addr, dir)
}

pub async fn client<T: Transport>(transport: T, server: SocketAddr, config: TimerConfig) -> (Client<T>, TempDir) {
    let dir = tempfile::tempdir().expect("client dir");
    let store = FileStore::open(dir.path()).await.expect("client store");
    (Client::new(transport, server, store, config), dir)
}

/// Fail the test instead of hanging when a transfer never completes.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(30), fut)
        .await
        .expect("command timed out")
}

pub fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn put(dir: &TempDir, name: &str, data: &[u8]) {
    std::fs::write(dir.path().join(name), data).expect("write fixture");
}

pub fn get(dir: &TempDir, name: &str) -> Option<Vec<u8>> {
    std::fs::read(dir.path().join(name)).ok()
}

pub fn exists(dir: &TempDir, name: &str) -> bool {
    Path::new(&dir.path().join(name)).is_file()
}

/// Statistics of a completed transfer, panicking on any other outcome.
pub fn done_stats(outcome: Outcome) -> TransferStats {
    match outcome {
        Outcome::Done { stats: Some(stats), .. } => stats,
        other => panic!("expected a completed transfer, got {other:?}"),
    }
}
