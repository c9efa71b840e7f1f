//! Entry point for `udp-ftp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing) and the prompt.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use udp_ftp::client::Client;
use udp_ftp::command::Command;
use udp_ftp::prompt::{self, Input};
use udp_ftp::server::Server;
use udp_ftp::socket::Socket;
use udp_ftp::storage::FileStore;
use udp_ftp::timer::TimerConfig;

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run as a server, storing files under a root directory.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9090")]
        bind: SocketAddr,
        /// Directory holding the server's files.
        #[arg(short, long, default_value = "server-files")]
        root: PathBuf,
        #[command(flatten)]
        timing: Timing,
    },
    /// Run the interactive client against a server.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9090).
        #[arg(short, long, default_value = "127.0.0.1:9090")]
        server: String,
        /// Directory holding the client's files.
        #[arg(short, long, default_value = "client-files")]
        root: PathBuf,
        #[command(flatten)]
        timing: Timing,
    },
}

#[derive(Args)]
struct Timing {
    /// Retransmission interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    rtt_ms: u64,
    /// Give up after this many retransmissions of one packet (default: never).
    #[arg(long)]
    max_retries: Option<u32>,
    /// How long a finished receiver keeps answering retransmissions
    /// (default: three retransmission intervals).
    #[arg(long)]
    linger_ms: Option<u64>,
}

impl Timing {
    fn config(&self) -> TimerConfig {
        let mut config = TimerConfig::with_rtt(Duration::from_millis(self.rtt_ms));
        config.max_retries = self.max_retries;
        if let Some(linger) = self.linger_ms {
            config.linger = Duration::from_millis(linger);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { bind, root, timing } => {
            let store = FileStore::open(&root)
                .await
                .with_context(|| format!("cannot open server root {}", root.display()))?;
            let socket = Socket::bind(bind)
                .await
                .with_context(|| format!("cannot bind {bind}"))?;
            let mut server = Server::new(socket, store, timing.config());
            tokio::select! {
                result = server.run() => result.context("server stopped")?,
                _ = tokio::signal::ctrl_c() => log::info!("[server] interrupted; shutting down"),
            }
        }
        Mode::Client { server, root, timing } => {
            let addr = tokio::net::lookup_host(&server)
                .await
                .with_context(|| format!("cannot resolve {server}"))?
                .next()
                .with_context(|| format!("{server} resolved to no address"))?;
            let store = FileStore::open(&root)
                .await
                .with_context(|| format!("cannot open client root {}", root.display()))?;
            let local: SocketAddr = if addr.is_ipv4() {
                "0.0.0.0:0".parse()?
            } else {
                "[::]:0".parse()?
            };
            let socket = Socket::bind(local).await.context("cannot bind client socket")?;
            let client = Client::new(socket, addr, store, timing.config());
            tokio::select! {
                result = run_prompt(&client) => result?,
                _ = tokio::signal::ctrl_c() => println!("Application is closing"),
            }
        }
    }
    Ok(())
}

async fn run_prompt(client: &Client<Socket>) -> Result<()> {
    println!("Client ready for {}.\nType OPTIONS to get an overview of the commands.", client.server());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("Type your command: ");
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let request = match prompt::parse_line(&line) {
            Ok(Input::Run(request)) => request,
            Ok(Input::Options) => {
                println!("{}", prompt::OPTIONS);
                continue;
            }
            Ok(Input::Blank) => continue,
            Err(e) => {
                println!("The input is not correct ({e}). Use the following format:\n{}", prompt::OPTIONS);
                continue;
            }
        };
        match client.execute(&request).await {
            Ok(outcome) => println!("{outcome}"),
            // Local problems (missing file, bad name) leave the session usable.
            Err(e) => println!("Could not {}: {e}", request.command),
        }
        if request.command == Command::Close {
            println!("Application is closing");
            return Ok(());
        }
    }
}
