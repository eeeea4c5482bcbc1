//! # SQLite-based session storage
//!
//! [`SqliteSession`] implements the [`Session`] trait over a SQLite
//! database file, so conversation history survives process restarts. All
//! operations go through an async `sqlx` pool; the schema is created on
//! first connect.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_relay::sqlite_session::SqliteSession;
//! use agent_relay::memory::Session;
//! use agent_relay::items::{RunItem, Role};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SqliteSession::new("user_123", "conversations.db").await?;
//!
//! session.append(vec![RunItem::message(Role::User, "Hello")]).await?;
//! let items = session.read_all().await?;
//! assert_eq!(items.len(), 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;
use crate::items::RunItem;
use crate::memory::Session;

/// A [`Session`] backed by a SQLite database.
pub struct SqliteSession {
    session_id: String,
    pool: Pool<Sqlite>,
}

impl SqliteSession {
    /// Opens (creating if necessary) the database at `db_path` and ensures
    /// the schema exists.
    pub async fn new(session_id: impl Into<String>, db_path: impl AsRef<Path>) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.as_ref().display()))
                .map_err(sqlx::Error::from)?
                .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::init_schema(&pool).await?;
        Ok(Self {
            session_id: session_id.into(),
            pool,
        })
    }

    /// An in-memory database; contents are lost when the pool closes.
    /// Pinned to a single connection, since each SQLite connection opens
    /// its own private in-memory database.
    pub async fn new_in_memory(session_id: impl Into<String>) -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init_schema(&pool).await?;
        Ok(Self {
            session_id: session_id.into(),
            pool,
        })
    }

    async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_items (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn next_seq(&self) -> Result<i64> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(seq) FROM session_items WHERE session_id = ?")
                .bind(&self.session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.unwrap_or(0) + 1)
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn read_all(&self) -> Result<Vec<RunItem>> {
        let rows = sqlx::query(
            "SELECT payload FROM session_items WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(&self.session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("payload");
            items.push(serde_json::from_str(&payload)?);
        }
        Ok(items)
    }

    async fn append(&self, items: Vec<RunItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut seq = self.next_seq().await?;
        for item in items {
            let payload = serde_json::to_string(&item)?;
            sqlx::query(
                "INSERT INTO session_items (session_id, seq, payload, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&self.session_id)
            .bind(seq)
            .bind(payload)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            seq += 1;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn pop_last(&self) -> Result<Option<RunItem>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT seq, payload FROM session_items WHERE session_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(&self.session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seq: i64 = row.get("seq");
        let payload: String = row.get("payload");

        sqlx::query("DELETE FROM session_items WHERE session_id = ? AND seq = ?")
            .bind(&self.session_id)
            .bind(seq)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(serde_json::from_str(&payload)?))
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM session_items WHERE session_id = ?")
            .bind(&self.session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSession")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Role, RunItem, ToolOutputItem};

    #[tokio::test]
    async fn test_append_and_read_back() {
        let session = SqliteSession::new_in_memory("s1").await.unwrap();
        assert_eq!(session.session_id(), "s1");

        session
            .append(vec![
                RunItem::message(Role::User, "Hello"),
                RunItem::message(Role::Assistant, "Hi there!"),
            ])
            .await
            .unwrap();

        let items = session.read_all().await.unwrap();
        assert_eq!(items.len(), 2);
        match &items[0] {
            RunItem::Message(m) => {
                assert_eq!(m.content, "Hello");
                assert_eq!(m.role, Role::User);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pop_last_removes_and_returns() {
        let session = SqliteSession::new_in_memory("s2").await.unwrap();
        session
            .append(vec![
                RunItem::message(Role::User, "first"),
                RunItem::message(Role::Assistant, "second"),
            ])
            .await
            .unwrap();

        let popped = session.pop_last().await.unwrap().unwrap();
        match popped {
            RunItem::Message(m) => assert_eq!(m.content, "second"),
            other => panic!("unexpected item: {other:?}"),
        }

        assert_eq!(session.read_all().await.unwrap().len(), 1);
        assert!(session.pop_last().await.unwrap().is_some());
        assert!(session.pop_last().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_resets_conversation() {
        let session = SqliteSession::new_in_memory("s3").await.unwrap();
        session
            .append(vec![RunItem::message(Role::User, "to be removed")])
            .await
            .unwrap();

        session.clear().await.unwrap();
        assert!(session.read_all().await.unwrap().is_empty());

        // Appending after clear restarts the sequence cleanly.
        session
            .append(vec![RunItem::message(Role::User, "fresh start")])
            .await
            .unwrap();
        assert_eq!(session.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_by_key() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteSession::init_schema(&pool).await.unwrap();

        let a = SqliteSession {
            session_id: "user_a".to_string(),
            pool: pool.clone(),
        };
        let b = SqliteSession {
            session_id: "user_b".to_string(),
            pool,
        };

        a.append(vec![RunItem::message(Role::User, "a's message")])
            .await
            .unwrap();

        assert_eq!(a.read_all().await.unwrap().len(), 1);
        assert!(b.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trips_all_item_kinds() {
        let session = SqliteSession::new_in_memory("s4").await.unwrap();
        session
            .append(vec![RunItem::ToolOutput(ToolOutputItem {
                id: "o1".to_string(),
                tool_call_id: "c1".to_string(),
                output: serde_json::json!({"sum": 4}),
                error: None,
                created_at: chrono::Utc::now(),
            })])
            .await
            .unwrap();

        let items = session.read_all().await.unwrap();
        match &items[0] {
            RunItem::ToolOutput(o) => assert_eq!(o.output["sum"], 4),
            other => panic!("unexpected item: {other:?}"),
        }

        let history = session.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tool_call_id.as_deref(), Some("c1"));
    }
}
