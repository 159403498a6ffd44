//! Multi-node replication over real WebSocket links on localhost.
//!
//! Convergence here is approximate: nodes that exchange full logs end up
//! with the same document as long as concurrent writers touch disjoint
//! paths. Two nodes patching the same path concurrently can apply the
//! patches in different local orders and keep different values; that case
//! is deliberately not asserted.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use patch_replica::config::{Direction, NodeConfig, PeerLink};
use patch_replica::node::Node;
use patch_replica::sequencer::{Outcome, SequencerHandle};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const RECONNECT: Duration = Duration::from_millis(100);

struct TestNode {
    addr: SocketAddr,
    handle: SequencerHandle,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl TestNode {
    async fn start(name: &str, links: Vec<PeerLink>) -> Result<Self> {
        Self::start_on("127.0.0.1:0".parse()?, name, links).await
    }

    async fn start_on(addr: SocketAddr, name: &str, links: Vec<PeerLink>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let mut config = NodeConfig::new(name).with_reconnect_delay(RECONNECT);
        config.links = links;

        let node = Node::new(listener, config);
        let addr = node.local_addr()?;
        let handle = node.handle();

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(node.run_until(async move {
            let _ = stopped.await;
        }));

        Ok(Self {
            addr,
            handle,
            stop,
            task,
        })
    }

    fn pull(&self) -> PeerLink {
        PeerLink::new(self.addr.to_string(), Direction::Pull)
    }

    fn link(&self, direction: Direction) -> PeerLink {
        PeerLink::new(self.addr.to_string(), direction)
    }

    async fn write(&self, payload: &str) -> Result<Outcome> {
        Ok(self.handle.submit_local(payload).await?.outcome)
    }

    async fn wait_for_document(&self, expected: Value) -> Result<()> {
        let mut document = self.handle.watch_document();
        let reached = matches!(
            timeout(WAIT, document.wait_for(|doc| **doc == expected)).await,
            Ok(Ok(_))
        );
        if !reached {
            anyhow::bail!(
                "timed out waiting for {expected}, document is {}",
                self.handle.document()
            );
        }
        Ok(())
    }

    async fn wait_for_watermark(&self, source: &str, id: u64) -> Result<()> {
        let mut clock = self.handle.watch_vclock();
        timeout(
            WAIT,
            clock.wait_for(|clock| clock.get(source).copied().unwrap_or(0) >= id),
        )
        .await
        .with_context(|| format!("timed out waiting for watermark {source}={id}"))??;
        Ok(())
    }

    async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(());
        timeout(WAIT, self.task)
            .await
            .context("node did not shut down")???;
        Ok(())
    }
}

/// Reserves a free local port for a node that starts later.
async fn free_addr() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?)
}

#[tokio::test]
async fn dialer_pulls_remote_history() -> Result<()> {
    let b = TestNode::start("B", vec![]).await?;
    assert_eq!(
        b.write(r#"[{"op":"add","path":"/y","value":2}]"#).await?,
        Outcome::Applied
    );

    let a = TestNode::start("A", vec![b.pull()]).await?;
    a.wait_for_document(json!({"y": 2})).await?;
    a.wait_for_watermark("B", 1).await?;
    assert_eq!(a.handle.vclock().get("B"), Some(&1));

    // Pulling is one-way: B never hears about A's writes.
    a.write(r#"[{"op":"add","path":"/from_a","value":true}]"#).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*b.handle.document(), json!({"y": 2}));
    assert!(b.handle.vclock().get("A").is_none());

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn writes_after_connect_are_streamed() -> Result<()> {
    let b = TestNode::start("B", vec![]).await?;
    let a = TestNode::start("A", vec![b.pull()]).await?;

    for n in 1..=5 {
        b.write(&format!(r#"[{{"op":"add","path":"/n{n}","value":{n}}}]"#))
            .await?;
    }

    a.wait_for_watermark("B", 5).await?;
    assert_eq!(a.handle.document(), b.handle.document());
    let order: Vec<u64> = a.handle.log().read_from(0).iter().map(|t| t.id).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5]);

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn push_link_delivers_to_the_accepting_side() -> Result<()> {
    let b = TestNode::start("B", vec![]).await?;
    let a = TestNode::start("A", vec![b.link(Direction::Push)]).await?;

    a.write(r#"[{"op":"add","path":"/pushed","value":"yes"}]"#).await?;
    b.wait_for_document(json!({"pushed": "yes"})).await?;
    b.wait_for_watermark("A", 1).await?;

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn both_direction_link_syncs_two_nodes() -> Result<()> {
    let b = TestNode::start("B", vec![]).await?;
    let a = TestNode::start("A", vec![b.link(Direction::Both)]).await?;

    a.write(r#"[{"op":"add","path":"/a","value":1}]"#).await?;
    b.write(r#"[{"op":"add","path":"/b","value":2}]"#).await?;

    let expected = json!({"a": 1, "b": 2});
    a.wait_for_document(expected.clone()).await?;
    b.wait_for_document(expected).await?;
    assert_eq!(a.handle.vclock(), b.handle.vclock());

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn transactions_propagate_through_intermediate_nodes() -> Result<()> {
    let c = TestNode::start("C", vec![]).await?;
    let b = TestNode::start("B", vec![c.pull()]).await?;
    let a = TestNode::start("A", vec![b.pull()]).await?;

    c.write(r#"[{"op":"add","path":"/origin","value":"C"}]"#).await?;

    a.wait_for_document(json!({"origin": "C"})).await?;
    a.wait_for_watermark("C", 1).await?;
    // B relays C's transaction; A never sees a transaction sourced from B.
    assert!(a.handle.vclock().get("B").is_none());

    a.shutdown().await?;
    b.shutdown().await?;
    c.shutdown().await
}

#[tokio::test]
async fn redundant_links_apply_each_transaction_once() -> Result<()> {
    let b = TestNode::start("B", vec![]).await?;
    b.write(r#"[{"op":"add","path":"/count","value":[]}]"#).await?;
    b.write(r#"[{"op":"add","path":"/count/-","value":1}]"#).await?;

    let a = TestNode::start("A", vec![b.pull(), b.pull()]).await?;
    a.wait_for_watermark("B", 2).await?;

    // Give the second link time to replay the same log.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*a.handle.document(), json!({"count": [1]}));
    assert_eq!(a.handle.log().len(), 2);

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn rejected_writes_are_not_replicated() -> Result<()> {
    let b = TestNode::start("B", vec![]).await?;
    let a = TestNode::start("A", vec![b.pull()]).await?;

    assert!(matches!(b.write("{oops").await?, Outcome::Rejected(_)));
    b.write(r#"[{"op":"add","path":"/ok","value":1}]"#).await?;

    a.wait_for_document(json!({"ok": 1})).await?;
    // Only the applied transaction travels, carrying B's second id.
    let replicated: Vec<u64> = a.handle.log().read_from(0).iter().map(|t| t.id).collect();
    assert_eq!(replicated, vec![2]);
    assert_eq!(a.handle.vclock().get("B"), Some(&2));

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn dialer_retries_until_peer_appears() -> Result<()> {
    let b_addr = free_addr().await?;
    let a = TestNode::start("A", vec![PeerLink::new(b_addr.to_string(), Direction::Pull)]).await?;

    // Let a few connection attempts fail first.
    tokio::time::sleep(Duration::from_millis(350)).await;

    let b = TestNode::start_on(b_addr, "B", vec![]).await?;
    b.write(r#"[{"op":"add","path":"/late","value":true}]"#).await?;

    a.wait_for_document(json!({"late": true})).await?;

    a.shutdown().await?;
    b.shutdown().await
}

#[tokio::test]
async fn dialer_reconnects_after_peer_restart() -> Result<()> {
    let b_addr = free_addr().await?;
    let b = TestNode::start_on(b_addr, "B", vec![]).await?;
    b.write(r#"[{"op":"add","path":"/first","value":1}]"#).await?;

    let a = TestNode::start("A", vec![PeerLink::new(b_addr.to_string(), Direction::Pull)]).await?;
    a.wait_for_watermark("B", 1).await?;

    // B restarts with empty state; nothing is persisted across restarts.
    b.shutdown().await?;
    let b = TestNode::start_on(b_addr, "B2", vec![]).await?;
    b.write(r#"[{"op":"add","path":"/second","value":2}]"#).await?;

    a.wait_for_document(json!({"first": 1, "second": 2})).await?;
    assert_eq!(a.handle.vclock().get("B"), Some(&1));
    assert_eq!(a.handle.vclock().get("B2"), Some(&1));

    a.shutdown().await?;
    b.shutdown().await
}
