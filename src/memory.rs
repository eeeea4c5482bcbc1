//! Session storage
//!
//! A [`Session`] persists the ordered item log of a conversation under a
//! session id, so consecutive runs share history. [`MemorySession`] keeps
//! items in memory for tests and ephemeral runs;
//! [`SqliteSession`](crate::sqlite_session::SqliteSession) is the durable
//! implementation.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Mutex;

use crate::error::Result;
use crate::items::{ItemHelpers, Message, RunItem};

/// Interface for session stores. Implementations serialize their own
/// per-key reads and writes; the runner only appends after a completed
/// run and reads before the first turn.
#[async_trait]
pub trait Session: Send + Sync + Debug {
    /// The unique identifier this conversation is stored under.
    fn session_id(&self) -> &str;

    /// All stored items, oldest first.
    async fn read_all(&self) -> Result<Vec<RunItem>>;

    /// Appends items at the end of the log.
    async fn append(&self, items: Vec<RunItem>) -> Result<()>;

    /// Removes and returns the most recent item, if any.
    async fn pop_last(&self) -> Result<Option<RunItem>>;

    /// Deletes every item, resetting the conversation.
    async fn clear(&self) -> Result<()>;

    /// The stored conversation replayed as model-facing messages.
    async fn history(&self) -> Result<Vec<Message>> {
        let items = self.read_all().await?;
        Ok(ItemHelpers::to_messages(&items))
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySession {
    session_id: String,
    items: Mutex<Vec<RunItem>>,
}

impl MemorySession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            items: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn read_all(&self) -> Result<Vec<RunItem>> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn append(&self, items: Vec<RunItem>) -> Result<()> {
        self.items.lock().unwrap().extend(items);
        Ok(())
    }

    async fn pop_last(&self) -> Result<Option<RunItem>> {
        Ok(self.items.lock().unwrap().pop())
    }

    async fn clear(&self) -> Result<()> {
        self.items.lock().unwrap().clear();
        Ok(())
    }
}
