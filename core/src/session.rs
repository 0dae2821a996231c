//! Explicit per-session state.
//!
//! Each chat session owns its tool registry and its bounded history. Nothing
//! is shared between sessions; the store only maps ids to their state.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::conversation::history::{ConversationHistory, DEFAULT_HISTORY_LIMIT};
use crate::tools::ToolRegistry;

/// State carried across the turns of one conversation
pub struct Session {
    pub id: String,
    pub registry: ToolRegistry,
    pub history: ConversationHistory,
}

impl Session {
    pub fn new(id: impl Into<String>, history_limit: usize) -> Self {
        Self {
            id: id.into(),
            registry: ToolRegistry::new(),
            history: ConversationHistory::new(history_limit),
        }
    }

    /// Disconnect every provider attached to this session
    pub async fn close(&self) {
        debug!(target: "session", session = %self.id, "Closing session");
        self.registry.shutdown_all().await;
    }
}

struct SessionSlot {
    registry: ToolRegistry,
    session: Arc<Mutex<Session>>,
}

/// Id → session map for hosts serving many conversations at once.
///
/// Turns lock their own session; provider hooks go through `registry()` and
/// never wait on a running turn.
pub struct SessionStore {
    sessions: DashMap<String, SessionSlot>,
    history_limit: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            history_limit,
        }
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        let slot = self.sessions.entry(id.to_string()).or_insert_with(|| {
            info!(target: "session", session = %id, "Session started");
            let session = Session::new(id, self.history_limit);
            SessionSlot {
                registry: session.registry.clone(),
                session: Arc::new(Mutex::new(session)),
            }
        });
        Arc::clone(&slot.session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(id).map(|s| Arc::clone(&s.session))
    }

    /// Registry handle for connect/disconnect hooks
    pub fn registry(&self, id: &str) -> Option<ToolRegistry> {
        self.sessions.get(id).map(|s| s.registry.clone())
    }

    /// End a session and shut its providers down
    pub async fn remove(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, slot)) => {
                slot.registry.shutdown_all().await;
                info!(target: "session", session = %id, "Session ended");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
