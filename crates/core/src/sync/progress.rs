//! Structured progress events emitted during a sync.
//!
//! Replaces callback-based reporting: the caller subscribes to a broadcast
//! channel and rendering stays fully decoupled from control flow. Emission
//! never fails the sync; a sync with no subscribers is normal.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One observable step of a sync invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncProgress {
    TabEnsured { tab: String },
    HeaderRewritten { tab: String, columns: usize },
    PendingRemoved { count: usize },
    /// The empty-tab probe timed out; rows were appended without dedup.
    ProbeDegraded { tab: String },
    RowsAppended { tab: String, count: usize },
    AccountsReplaced { count: usize },
}

/// Sender half of the progress stream. Cloneable; a disabled sender drops
/// every event.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<broadcast::Sender<SyncProgress>>,
}

impl ProgressSender {
    /// Create a connected sender/receiver pair.
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<SyncProgress>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that discards all events.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<SyncProgress>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    pub fn emit(&self, event: SyncProgress) {
        if let Some(tx) = &self.tx {
            // A send error only means no receiver is listening.
            let _ = tx.send(event);
        }
    }
}
