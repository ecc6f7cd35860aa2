//! One-to-many outbound notification.
//!
//! Recipients are contacted one by one over short-lived connections; a
//! recipient that times out or refuses is recorded and skipped, never
//! aborting the loop. Membership fan-out covers the whole roster;
//! sync-update fan-out covers a sync file's subscriber subset.

use meshsync_proto::{Peer, SyncFile};

use crate::client::NodeClient;

/// Outcome of contacting one recipient.
#[derive(Debug, Clone)]
pub struct FanoutResult {
    /// The recipient contacted.
    pub peer: Peer,
    /// Whether the exchange completed.
    pub success: bool,
    /// Error message if it did not.
    pub error: Option<String>,
}

/// Summary of one fan-out pass.
#[derive(Debug, Clone)]
pub struct FanoutSummary {
    /// Recipients attempted.
    pub attempted: usize,
    /// Exchanges that completed.
    pub succeeded: usize,
    /// Exchanges that failed (timeout, refusal, protocol error).
    pub failed: usize,
    /// Per-recipient outcomes, in contact order.
    pub results: Vec<FanoutResult>,
}

impl FanoutSummary {
    fn from_results(results: Vec<FanoutResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        FanoutSummary {
            attempted: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// True when every attempted recipient completed.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Announce a newly joined peer to every recipient.
pub async fn notify_user_joined(
    client: &NodeClient,
    recipients: &[Peer],
    new_peer: &Peer,
) -> FanoutSummary {
    let mut results = Vec::with_capacity(recipients.len());
    for peer in recipients {
        let outcome = client.user_joined(&peer.addr, new_peer).await;
        results.push(record(peer, "user joined broadcast", outcome));
    }
    FanoutSummary::from_results(results)
}

/// Announce a new subscriber to the other subscribers of a sync file.
pub async fn notify_user_subscribed(
    client: &NodeClient,
    recipients: &[Peer],
    new_subscriber: &Peer,
    sync_file: &SyncFile,
) -> FanoutSummary {
    let mut results = Vec::with_capacity(recipients.len());
    for peer in recipients {
        let outcome = client
            .user_subscribed(&peer.addr, new_subscriber, sync_file)
            .await;
        results.push(record(peer, "subscriber broadcast", outcome));
    }
    FanoutSummary::from_results(results)
}

/// Push updated sync-file content to each recipient in turn.
pub async fn propagate_sync_update(
    client: &NodeClient,
    recipients: &[Peer],
    sync_file: &SyncFile,
) -> FanoutSummary {
    let mut results = Vec::with_capacity(recipients.len());
    for peer in recipients {
        let outcome = client.sync_file_update(&peer.addr, sync_file).await;
        results.push(record(peer, "sync update", outcome));
    }
    FanoutSummary::from_results(results)
}

fn record(peer: &Peer, what: &str, outcome: crate::error::Result<()>) -> FanoutResult {
    match outcome {
        Ok(()) => FanoutResult {
            peer: peer.clone(),
            success: true,
            error: None,
        },
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "{what} failed");
            FanoutResult {
                peer: peer.clone(),
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}
