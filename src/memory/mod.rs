//! Session-scoped conversation memory.
//!
//! Turns are append-only; the append transaction also enforces the
//! per-session turn budget with oldest-first eviction, so the store never
//! grows without bound. Reads always observe a prefix-consistent snapshot.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Agent => "agent",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "agent" => TurnRole::Agent,
            _ => TurnRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub turn_count: i64,
}

#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
    max_turns: usize,
}

impl ConversationStore {
    pub async fn new(db_path: PathBuf, max_turns: usize) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| {
                ApiError::internal(format!("Failed to connect to conversation db: {}", e))
            })?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to enable foreign keys: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init turns table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session_id ON turns(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool, max_turns })
    }

    /// Append one turn. Session creation, insert, and eviction run in a
    /// single transaction so concurrent appends on the same session
    /// serialize without interleaving.
    pub async fn append(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let result =
            sqlx::query("INSERT INTO turns (session_id, role, content, created_at) VALUES (?, ?, ?, ?)")
                .bind(session_id)
                .bind(role.as_str())
                .bind(content)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;

        if self.max_turns > 0 {
            sqlx::query(
                "DELETE FROM turns WHERE session_id = ? AND id NOT IN (
                    SELECT id FROM turns WHERE session_id = ? ORDER BY id DESC LIMIT ?
                )",
            )
            .bind(session_id)
            .bind(session_id)
            .bind(self.max_turns as i64)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// All retained turns for a session, in append order.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM turns \
             WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            turns.push(ConversationTurn {
                id: row.try_get::<i64, _>("id").unwrap_or_default(),
                session_id: row.try_get::<String, _>("session_id").unwrap_or_default(),
                role: TurnRole::from_str(
                    &row.try_get::<String, _>("role").unwrap_or_default(),
                ),
                content: row.try_get::<String, _>("content").unwrap_or_default(),
                created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
            });
        }

        Ok(turns)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT s.id, s.created_at, s.updated_at, COUNT(t.id) as turn_count \
             FROM sessions s \
             LEFT JOIN turns t ON s.id = t.session_id \
             GROUP BY s.id \
             ORDER BY s.updated_at DESC \
             LIMIT 100",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(SessionInfo {
                id: row.try_get::<String, _>("id").unwrap_or_default(),
                created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
                updated_at: row.try_get::<String, _>("updated_at").unwrap_or_default(),
                turn_count: row.try_get::<i64, _>("turn_count").unwrap_or(0),
            });
        }
        Ok(sessions)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(max_turns: usize) -> (ConversationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path().join("conversations.db"), max_turns)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn history_preserves_append_order() {
        let (store, _dir) = store(0).await;
        for i in 0..5 {
            let role = if i % 2 == 0 { TurnRole::User } else { TurnRole::Agent };
            store.append("s1", role, &format!("turno {}", i)).await.unwrap();
        }

        let turns = store.history("s1").await.unwrap();
        assert_eq!(turns.len(), 5);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.content, format!("turno {}", i));
        }
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Agent);
    }

    #[tokio::test]
    async fn sessions_do_not_leak_into_each_other() {
        let (store, _dir) = store(0).await;

        let a = store.clone();
        let b = store.clone();
        let writer_a = tokio::spawn(async move {
            for i in 0..20 {
                a.append("sesion-a", TurnRole::User, &format!("a{}", i)).await.unwrap();
            }
        });
        let writer_b = tokio::spawn(async move {
            for i in 0..20 {
                b.append("sesion-b", TurnRole::User, &format!("b{}", i)).await.unwrap();
            }
        });
        writer_a.await.unwrap();
        writer_b.await.unwrap();

        let turns_a = store.history("sesion-a").await.unwrap();
        let turns_b = store.history("sesion-b").await.unwrap();
        assert_eq!(turns_a.len(), 20);
        assert_eq!(turns_b.len(), 20);
        assert!(turns_a.iter().all(|t| t.content.starts_with('a')));
        assert!(turns_b.iter().all(|t| t.content.starts_with('b')));
        // per-session ordering survives the concurrent writers
        for (i, turn) in turns_a.iter().enumerate() {
            assert_eq!(turn.content, format!("a{}", i));
        }
    }

    #[tokio::test]
    async fn oldest_turns_are_evicted_beyond_the_budget() {
        let (store, _dir) = store(3).await;
        for i in 0..6 {
            store.append("s1", TurnRole::User, &format!("turno {}", i)).await.unwrap();
        }

        let turns = store.history("s1").await.unwrap();
        assert_eq!(turns.len(), 3);
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["turno 3", "turno 4", "turno 5"]);
    }

    #[tokio::test]
    async fn delete_session_cascades_to_turns() {
        let (store, _dir) = store(0).await;
        store.append("s1", TurnRole::User, "hola").await.unwrap();
        store.delete_session("s1").await.unwrap();
        assert!(store.history("s1").await.unwrap().is_empty());
        assert!(store.list_sessions().await.unwrap().is_empty());
    }
}
