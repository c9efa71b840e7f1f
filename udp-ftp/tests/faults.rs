//! Commands over a faulty network.
//!
//! The [`Simulator`] wraps the client or the server socket and drops,
//! duplicates or damages chosen outgoing datagrams.  Send indices count
//! every datagram the wrapped endpoint emits, starting at 0 with its first
//! packet of the test.

mod common;

use std::time::Duration;

use common::*;
use udp_ftp::{
    command::Outcome,
    simulator::{Simulator, SimulatorConfig},
    timer::TimerConfig,
};

fn scripted(f: impl FnOnce(&mut SimulatorConfig)) -> SimulatorConfig {
    let mut config = SimulatorConfig::default();
    f(&mut config);
    config
}

// ---------------------------------------------------------------------------
// Header corruption and loss
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupted_fragment_costs_one_retransmission() {
    let (server_addr, server_dir) = spawn_server(ephemeral().await, config()).await;
    // Sends: 0 request, 1 first fragment, 2 second fragment.
    let sim = faulty(scripted(|c| c.corrupt_sends = vec![2])).await;
    let (client, client_dir) = client(sim, server_addr, config()).await;
    let data = sample(3000);
    put(&client_dir, "a.txt", &data);

    let stats = done_stats(within(client.upload("a.txt")).await.unwrap());

    assert_eq!(stats.optimal_packets, 3);
    assert_eq!(stats.packets, 4);
    assert_eq!(stats.retransmissions(), 1);
    assert_eq!(get(&server_dir, "a.txt"), Some(data));
}

#[tokio::test]
async fn lost_reply_to_request_is_replayed() {
    let server = Simulator::new(ephemeral().await, scripted(|c| c.drop_sends = vec![0]));
    let (server_addr, server_dir) = spawn_server(server, config()).await;
    let (client, client_dir) = client(ephemeral().await, server_addr, config()).await;
    let data = sample(2500);
    put(&client_dir, "a.txt", &data);

    done_stats(within(client.upload("a.txt")).await.unwrap());

    assert_eq!(get(&server_dir, "a.txt"), Some(data));
}

#[tokio::test]
async fn lost_fragment_ack_is_replayed() {
    // Server sends: 0 request reply, 1 ack of the first fragment.
    let server = Simulator::new(ephemeral().await, scripted(|c| c.drop_sends = vec![1]));
    let (server_addr, server_dir) = spawn_server(server, config()).await;
    let (client, client_dir) = client(ephemeral().await, server_addr, config()).await;
    let data = sample(2500);
    put(&client_dir, "a.txt", &data);

    let stats = done_stats(within(client.upload("a.txt")).await.unwrap());

    assert_eq!(stats.retransmissions(), 1);
    // One fragment was stored once, not twice.
    assert_eq!(get(&server_dir, "a.txt"), Some(data));
}

#[tokio::test]
async fn lost_remove_reply_is_replayed_not_reexecuted() {
    let server = Simulator::new(ephemeral().await, scripted(|c| c.drop_sends = vec![0]));
    let (server_addr, server_dir) = spawn_server(server, config()).await;
    let (client, _client_dir) = client(ephemeral().await, server_addr, config()).await;
    put(&server_dir, "gone.txt", b"bye");

    // Executing the retransmitted request again would answer DOES_NOT_EXIST.
    let outcome = within(client.remove("gone.txt")).await.unwrap();

    assert!(matches!(outcome, Outcome::Done { .. }), "{outcome:?}");
    assert!(!exists(&server_dir, "gone.txt"));
}

#[tokio::test]
async fn lost_download_verdict_does_not_stall_next_command() {
    let (server_addr, server_dir) = spawn_server(ephemeral().await, config()).await;
    // Sends: 0 request, 1 confirmation, 2..=4 fragment acks, 5 verdict.
    let sim = faulty(scripted(|c| c.drop_sends = vec![5])).await;
    let mut timing = config();
    timing.linger = Duration::ZERO;
    let (client, client_dir) = client(sim, server_addr, timing).await;
    let data = sample(3000);
    put(&server_dir, "a.txt", &data);

    done_stats(within(client.download("a.txt")).await.unwrap());
    assert_eq!(get(&client_dir, "a.txt"), Some(data));

    // The server is still resending its checksum; the list request is only
    // served once the verdict is replayed.
    match within(client.list()).await.unwrap() {
        Outcome::Listing { names, .. } => assert_eq!(names, vec!["a.txt"]),
        other => panic!("expected listing, got {other:?}"),
    }
}

#[tokio::test]
async fn lost_final_list_ack_does_not_stall_next_command() {
    let (server_addr, server_dir) = spawn_server(ephemeral().await, config()).await;
    // Sends: 0 request, 1 confirmation, 2 ack of the only fragment.
    let sim = faulty(scripted(|c| c.drop_sends = vec![2])).await;
    let mut timing = config();
    timing.linger = Duration::ZERO;
    let (client, _client_dir) = client(sim, server_addr, timing).await;
    put(&server_dir, "gone.txt", b"bye");

    let listing = within(client.list()).await.unwrap();
    assert!(matches!(listing, Outcome::Listing { .. }), "{listing:?}");

    let outcome = within(client.remove("gone.txt")).await.unwrap();
    assert!(matches!(outcome, Outcome::Done { .. }), "{outcome:?}");
    assert!(!exists(&server_dir, "gone.txt"));
}

// ---------------------------------------------------------------------------
// Duplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicated_request_is_executed_once() {
    let (server_addr, server_dir) = spawn_server(ephemeral().await, config()).await;
    let sim = faulty(scripted(|c| c.duplicate_sends = vec![0])).await;
    let (client, client_dir) = client(sim, server_addr, config()).await;
    let data = sample(1800);
    put(&client_dir, "a.txt", &data);

    let outcome = within(client.upload("a.txt")).await.unwrap();

    // A second execution would have found the file and answered
    // DOES_ALREADY_EXIST into the middle of the transfer.
    let stats = done_stats(outcome);
    assert_eq!(stats.retransmissions(), 0);
    assert_eq!(get(&server_dir, "a.txt"), Some(data));
}

#[tokio::test]
async fn duplicate_acks_do_not_advance_the_sender() {
    // Server sends: 0 request reply, 1 and 2 acks of the first two fragments.
    let server = Simulator::new(ephemeral().await, scripted(|c| c.duplicate_sends = vec![1, 2]));
    let (server_addr, server_dir) = spawn_server(server, config()).await;
    let (client, client_dir) = client(ephemeral().await, server_addr, config()).await;
    let data = sample(3000);
    put(&client_dir, "a.txt", &data);

    let stats = done_stats(within(client.upload("a.txt")).await.unwrap());

    assert_eq!(stats.duplicates, 2);
    assert_eq!(stats.packets, 3);
    assert_eq!(get(&server_dir, "a.txt"), Some(data));
}

// ---------------------------------------------------------------------------
// Payload damage, caught only by the whole-file checksum
// ---------------------------------------------------------------------------

#[tokio::test]
async fn damaged_upload_is_reported_and_deleted() {
    let (server_addr, server_dir) = spawn_server(ephemeral().await, config()).await;
    let sim = faulty(scripted(|c| c.corrupt_payload_sends = vec![1])).await;
    let (client, client_dir) = client(sim, server_addr, config()).await;
    put(&client_dir, "a.txt", &sample(3000));

    let outcome = within(client.upload("a.txt")).await.unwrap();

    assert!(matches!(outcome, Outcome::Incorrect { .. }), "{outcome:?}");
    assert!(!outcome.is_success());
    assert!(!exists(&server_dir, "a.txt"));
}

#[tokio::test]
async fn damaged_download_is_reported_and_deleted() {
    // Server sends: 0 announcement, 1 first fragment.
    let server = Simulator::new(
        ephemeral().await,
        scripted(|c| c.corrupt_payload_sends = vec![1]),
    );
    let (server_addr, server_dir) = spawn_server(server, config()).await;
    let (client, client_dir) = client(ephemeral().await, server_addr, config()).await;
    put(&server_dir, "a.txt", &sample(3000));

    let outcome = within(client.download("a.txt")).await.unwrap();

    assert!(matches!(outcome, Outcome::Incorrect { .. }), "{outcome:?}");
    assert!(!exists(&client_dir, "a.txt"));
    assert!(exists(&server_dir, "a.txt"));
}

// ---------------------------------------------------------------------------
// Random faults in both directions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lossy_network_round_trip() {
    let mut timing = TimerConfig::with_rtt(Duration::from_millis(100));
    timing.linger = Duration::from_secs(1);
    let lossy = |seed| SimulatorConfig {
        loss_rate: 0.1,
        duplicate_rate: 0.1,
        corrupt_rate: 0.05,
        ..SimulatorConfig::seeded(seed)
    };

    let server = Simulator::new(ephemeral().await, lossy(7));
    let (server_addr, server_dir) = spawn_server(server, timing.clone()).await;
    let (client, client_dir) = client(faulty(lossy(11)).await, server_addr, timing).await;
    let data = sample(20_000);
    put(&client_dir, "big.bin", &data);

    done_stats(within(client.upload("big.bin")).await.unwrap());
    assert_eq!(get(&server_dir, "big.bin"), Some(data.clone()));

    std::fs::remove_file(client_dir.path().join("big.bin")).unwrap();
    done_stats(within(client.download("big.bin")).await.unwrap());
    assert_eq!(get(&client_dir, "big.bin"), Some(data));
}
