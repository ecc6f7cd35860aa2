//! End-to-end mesh scenarios.

use std::time::Duration;

use meshsync_proto::Peer;

use crate::harness::{eventually, MeshNode};

const WITHIN: Duration = Duration::from_secs(5);

async fn roster_is(node: &MeshNode, expected: &[&MeshNode]) -> bool {
    let mut roster = node.node().state().roster().snapshot().await;
    let mut want: Vec<Peer> = expected.iter().map(|n| n.peer()).collect();
    roster.sort_by(|a, b| a.addr.port().cmp(&b.addr.port()));
    want.sort_by(|a, b| a.addr.port().cmp(&b.addr.port()));
    roster == want
}

#[tokio::test]
async fn test_two_node_bootstrap() {
    let a = MeshNode::start("A", None).await;
    let b = MeshNode::start("B", Some(&a)).await;

    assert!(eventually(WITHIN, || async { roster_is(&a, &[&b]).await }).await);
    assert!(eventually(WITHIN, || async { roster_is(&b, &[&a]).await }).await);

    assert!(a.node().state().catalog().is_empty().await);
    assert!(b.node().state().catalog().is_empty().await);
    assert!(a.node().state().subscriptions().is_empty().await);
    assert!(b.node().state().subscriptions().is_empty().await);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_three_node_membership_fanout() {
    let a = MeshNode::start("A", None).await;
    let b = MeshNode::start("B", Some(&a)).await;
    assert!(eventually(WITHIN, || async { roster_is(&a, &[&b]).await }).await);
    let c = MeshNode::start("C", Some(&a)).await;

    assert!(eventually(WITHIN, || async { roster_is(&a, &[&b, &c]).await }).await);
    assert!(eventually(WITHIN, || async { roster_is(&b, &[&a, &c]).await }).await);
    assert!(eventually(WITHIN, || async { roster_is(&c, &[&a, &b]).await }).await);

    // The roster never holds the node's own record.
    for node in [&a, &b, &c] {
        assert!(!node.node().state().roster().contains(&node.peer()).await);
    }

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

#[tokio::test]
async fn test_file_advertisement() {
    let a = MeshNode::start_with("A", None, &[("readme.txt", b"hello world.\n")], &[]).await;
    let b = MeshNode::start("B", Some(&a)).await;

    let catalog = b.node().state().catalog().snapshot().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].filename, "readme.txt");
    assert_eq!(catalog[0].username, "A");
    assert_eq!(catalog[0].addr, a.peer().addr);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_download() {
    let content: &[u8] = b"hello world.\n";
    let a = MeshNode::start_with("A", None, &[("readme.txt", content)], &[]).await;
    let b = MeshNode::start("B", Some(&a)).await;

    let received = b.node().download("readme.txt").await.unwrap();
    assert_eq!(received, content.len() as u64);
    let downloaded = std::fs::read(b.file_path("readme.txt")).unwrap();
    assert_eq!(downloaded, content);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_subscribe_and_update() {
    let a = MeshNode::start_with("A", None, &[], &[("notes.md", b"v1")]).await;
    let b = MeshNode::start("B", Some(&a)).await;

    // The join advertised A's document to B as available.
    let entry = b.node().state().subscriptions().get("notes.md").await.unwrap();
    assert_eq!(entry.users_subbed, vec![a.peer()]);

    let received = b.node().subscribe("notes.md").await.unwrap();
    assert_eq!(received, 2);
    assert_eq!(std::fs::read(b.sync_file_path("notes.md")).unwrap(), b"v1");

    // A's record now carries both subscribers, in subscription order.
    assert!(
        eventually(WITHIN, || async {
            match a.node().state().subscriptions().get("notes.md").await {
                Some(entry) => entry.users_subbed == vec![a.peer(), b.peer()],
                None => false,
            }
        })
        .await
    );

    a.edit_sync_file("notes.md", b"v2");
    a.node().trigger_save();

    assert!(
        eventually(WITHIN, || async {
            std::fs::read(b.sync_file_path("notes.md"))
                .map(|c| c == b"v2")
                .unwrap_or(false)
        })
        .await
    );

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_duplicate_subscribe_is_noop() {
    let a = MeshNode::start_with("A", None, &[], &[("notes.md", b"v1")]).await;
    let b = MeshNode::start("B", Some(&a)).await;

    b.node().subscribe("notes.md").await.unwrap();
    assert!(
        eventually(WITHIN, || async {
            a.node()
                .state()
                .subscriptions()
                .get("notes.md")
                .await
                .map(|e| e.users_subbed.len() == 2)
                .unwrap_or(false)
        })
        .await
    );

    // A repeated subscriber announcement does not duplicate the entry.
    let descriptor = a.node().state().subscriptions().get("notes.md").await.unwrap();
    b.node()
        .client()
        .user_subscribed(&a.peer().addr, &b.peer(), &descriptor)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let entry = a.node().state().subscriptions().get("notes.md").await.unwrap();
    assert_eq!(entry.users_subbed.len(), 2);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_update_propagates_to_all_subscribers() {
    let a = MeshNode::start_with("A", None, &[], &[("plan.md", b"draft")]).await;
    let b = MeshNode::start("B", Some(&a)).await;
    let c = MeshNode::start("C", Some(&a)).await;

    b.node().subscribe("plan.md").await.unwrap();
    assert!(
        eventually(WITHIN, || async {
            a.node()
                .state()
                .subscriptions()
                .get("plan.md")
                .await
                .map(|e| e.users_subbed.len() == 2)
                .unwrap_or(false)
        })
        .await
    );
    c.node().subscribe("plan.md").await.unwrap();

    assert!(
        eventually(WITHIN, || async {
            a.node()
                .state()
                .subscriptions()
                .get("plan.md")
                .await
                .map(|e| e.users_subbed.len() == 3)
                .unwrap_or(false)
        })
        .await
    );

    // C heard about B (or vice versa) through the subscriber broadcast.
    assert!(
        eventually(WITHIN, || async {
            match b.node().state().subscriptions().get("plan.md").await {
                Some(entry) => entry.users_subbed.len() == 3,
                None => false,
            }
        })
        .await
    );

    a.edit_sync_file("plan.md", b"final");
    a.node().trigger_save();

    for node in [&b, &c] {
        assert!(
            eventually(WITHIN, || async {
                std::fs::read(node.sync_file_path("plan.md"))
                    .map(|content| content == b"final")
                    .unwrap_or(false)
            })
            .await
        );
    }

    a.stop().await;
    b.stop().await;
    c.stop().await;
}
