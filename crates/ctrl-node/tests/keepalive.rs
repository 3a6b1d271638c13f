//! Two nodes on loopback UDP exchanging keepalives.

use ctrl_node::{ControlNode, NodeConfig};
use ctrl_types::IsdAs;
use std::net::SocketAddr;
use std::time::Duration;

fn ia(s: &str) -> IsdAs {
    s.parse().unwrap()
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn node_config(local: &str, secret: u8, peer: (&str, u8)) -> NodeConfig {
    NodeConfig {
        listen_addr: loopback(),
        local_ia: ia(local),
        hmac_secret: [secret; 32],
        trusted: vec![(ia(peer.0), vec![peer.1; 32])],
        keepalive_interval: Duration::from_millis(50),
        ..NodeConfig::default()
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_keepalives_recorded_by_peer() {
    let receiver = ControlNode::start(node_config("1-ff00:0:110", 1, ("1-ff00:0:111", 2)))
        .await
        .unwrap();

    let mut sender_config = node_config("1-ff00:0:111", 2, ("1-ff00:0:110", 1));
    sender_config.keepalive_peers = vec![receiver.local_addr()];
    let sender = ControlNode::start(sender_config).await.unwrap();

    let liveness = receiver.liveness();
    assert!(wait_until(|| liveness.lock().contains_key(&(ia("1-ff00:0:111"), 1))).await);
    assert_eq!(receiver.messenger().dispatch_stats().dropped_unverified, 0);

    sender.shutdown().await.unwrap();
    receiver.shutdown().await.unwrap();
    assert!(receiver.messenger().is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_untrusted_keepalives_are_dropped() {
    let receiver = ControlNode::start(node_config("1-ff00:0:110", 1, ("1-ff00:0:111", 2)))
        .await
        .unwrap();

    // Signs with a key the receiver does not hold for this issuer.
    let mut sender_config = node_config("1-ff00:0:111", 9, ("1-ff00:0:110", 1));
    sender_config.keepalive_peers = vec![receiver.local_addr()];
    let sender = ControlNode::start(sender_config).await.unwrap();

    let stats_source = receiver.messenger().clone();
    assert!(wait_until(|| stats_source.dispatch_stats().dropped_unverified > 0).await);
    assert!(receiver.liveness().lock().is_empty());

    sender.shutdown().await.unwrap();
    receiver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let node = ControlNode::start(node_config("1-ff00:0:110", 1, ("1-ff00:0:111", 2)))
        .await
        .unwrap();
    node.shutdown().await.unwrap();
    assert!(node.shutdown().await.is_ok());
}
