//! User-visible notices raised by background work.
//!
//! The queue cannot show anything itself; it posts a short message here and
//! the front end drains the board.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Mutex;

use notetree_core::NodeId;

/// Oldest notices are dropped beyond this many.
const MAX_NOTICES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: u64,
    /// The node the notice is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub message: String,
    pub created_at: i64,
}

#[derive(Debug, Default)]
pub struct NoticeBoard {
    inner: Mutex<Board>,
}

#[derive(Debug, Default)]
struct Board {
    next_id: u64,
    notices: VecDeque<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, node_id: Option<NodeId>, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("notice: {}", message);

        let mut board = self.inner.lock().await;
        board.next_id += 1;
        let notice = Notice {
            id: board.next_id,
            node_id,
            message,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
        };
        board.notices.push_back(notice);
        while board.notices.len() > MAX_NOTICES {
            board.notices.pop_front();
        }
    }

    /// Removes and returns all notices, oldest first.
    pub async fn drain(&self) -> Vec<Notice> {
        self.inner.lock().await.notices.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.notices.len()
    }
}
