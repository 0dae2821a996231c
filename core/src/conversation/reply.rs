use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::Result;

/// What a reply is for, so hosts can render notices differently from answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    /// Transient progress ("calling tool …")
    Notice,
    /// A failure reported before falling back
    Error,
    /// The single final answer of a turn
    Answer,
}

/// One user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Notice,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error,
            text: text.into(),
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Answer,
            text: text.into(),
        }
    }
}

/// Host-side delivery of replies (chat UI, terminal, socket…)
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;
}

/// Sink that keeps every reply in memory
#[derive(Debug, Default)]
pub struct VecSink {
    replies: Mutex<Vec<Reply>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replies(&self) -> Vec<Reply> {
        self.replies.lock().await.clone()
    }

    /// Only the final answers
    pub async fn answers(&self) -> Vec<String> {
        self.replies
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == ReplyKind::Answer)
            .map(|r| r.text.clone())
            .collect()
    }
}

#[async_trait]
impl ReplySink for VecSink {
    async fn send(&self, reply: Reply) -> Result<()> {
        self.replies.lock().await.push(reply);
        Ok(())
    }
}
