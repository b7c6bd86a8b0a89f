//! SQLite consultation store.
//!
//! Uses a single SQLite database file with three tables:
//! - `users` — one row per authenticated email
//! - `chambers` — conversation threads, `ON DELETE CASCADE` to their turns
//! - `turns` — immutable messages keyed by `(chamber_id, seq)`
//!
//! Timestamps are stored as epoch milliseconds. Turn sequence numbers are
//! assigned inside the inserting statement itself, so a turn is either fully
//! present with the next `seq` or absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexchamber_core::consultation::{Chamber, ChamberId, Role, Turn, UserRecord};
use lexchamber_core::error::StoreError;
use lexchamber_core::store::ConsultationStore;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A durable SQLite store for users, chambers, and turns.
pub struct SqliteStore {
    pool: SqlitePool,
    /// Serializes writers of this process; other processes are serialized
    /// by SQLite's own lock plus the busy timeout.
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    ///
    /// Accepts a plain file path, a `sqlite:` URL, or `":memory:"` /
    /// `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:" || path.starts_with("sqlite::memory:");

        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
        } else if path.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(path)
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::WriteFailed(format!(
                            "Cannot create directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }
            Ok(SqliteConnectOptions::new().filename(path))
        }
        .map_err(|e| StoreError::WriteFailed(format!("Invalid SQLite path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .pragma("foreign_keys", "ON");

        // Every connection to `:memory:` is a separate database, so an
        // ephemeral store must live on exactly one connection that is never
        // recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("Failed to open SQLite at {path}: {e}")))?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        info!("SQLite consultation store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations — creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                email       TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("users table: {e}")))?;

        // AUTOINCREMENT keeps ids of deleted chambers from being reissued.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chambers (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                email       TEXT NOT NULL,
                title       TEXT NOT NULL,
                persona     TEXT NULL,
                language    TEXT NULL,
                created_at  INTEGER NOT NULL,
                FOREIGN KEY(email) REFERENCES users(email)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chambers table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                chamber_id  INTEGER NOT NULL,
                seq         INTEGER NOT NULL,
                role        TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content     TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY(chamber_id, seq),
                FOREIGN KEY(chamber_id) REFERENCES chambers(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chambers_email ON chambers(email, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chambers index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn from_millis(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }

    fn row_to_user(row: &SqliteRow) -> Result<UserRecord, StoreError> {
        let email: String = row
            .try_get("email")
            .map_err(|e| StoreError::ReadFailed(format!("email column: {e}")))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| StoreError::ReadFailed(format!("name column: {e}")))?;
        let created_at: i64 = row
            .try_get("created_at")
            .map_err(|e| StoreError::ReadFailed(format!("created_at column: {e}")))?;

        Ok(UserRecord {
            email,
            name,
            created_at: Self::from_millis(created_at),
        })
    }

    fn row_to_chamber(row: &SqliteRow) -> Result<Chamber, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::ReadFailed(format!("id column: {e}")))?;
        let email: String = row
            .try_get("email")
            .map_err(|e| StoreError::ReadFailed(format!("email column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::ReadFailed(format!("title column: {e}")))?;
        let persona: Option<String> = row
            .try_get("persona")
            .map_err(|e| StoreError::ReadFailed(format!("persona column: {e}")))?;
        let language: Option<String> = row
            .try_get("language")
            .map_err(|e| StoreError::ReadFailed(format!("language column: {e}")))?;
        let created_at: i64 = row
            .try_get("created_at")
            .map_err(|e| StoreError::ReadFailed(format!("created_at column: {e}")))?;

        Ok(Chamber {
            id: ChamberId(id),
            email,
            title,
            persona,
            language,
            created_at: Self::from_millis(created_at),
        })
    }

    fn row_to_turn(row: &SqliteRow) -> Result<Turn, StoreError> {
        let chamber_id: i64 = row
            .try_get("chamber_id")
            .map_err(|e| StoreError::ReadFailed(format!("chamber_id column: {e}")))?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StoreError::ReadFailed(format!("seq column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::ReadFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::ReadFailed(format!("content column: {e}")))?;
        let created_at: i64 = row
            .try_get("created_at")
            .map_err(|e| StoreError::ReadFailed(format!("created_at column: {e}")))?;

        Ok(Turn {
            chamber_id: ChamberId(chamber_id),
            seq,
            role: Role::from_str(&role).map_err(StoreError::ReadFailed)?,
            content,
            created_at: Self::from_millis(created_at),
        })
    }
}

#[async_trait]
impl ConsultationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert_user(&self, email: &str, name: &str) -> Result<UserRecord, StoreError> {
        if email.trim().is_empty() {
            return Err(StoreError::NotAuthenticated(email.to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, name, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(email) DO UPDATE SET name = excluded.name
            RETURNING email, name, created_at
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(Self::now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("upsert user: {e}")))?;

        Self::row_to_user(&row)
    }

    async fn create_chamber(&self, email: &str, title: &str) -> Result<ChamberId, StoreError> {
        let _guard = self.write_lock.lock().await;
        let row = sqlx::query(
            r#"
            INSERT INTO chambers (email, title, created_at)
            SELECT email, ?2, ?3 FROM users WHERE email = ?1
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(title)
        .bind(Self::now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("create chamber: {e}")))?;

        let Some(row) = row else {
            return Err(StoreError::NotAuthenticated(email.to_string()));
        };
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::ReadFailed(format!("id column: {e}")))?;

        debug!(chamber_id = id, "Created chamber");
        Ok(ChamberId(id))
    }

    async fn get_chamber(
        &self,
        email: &str,
        chamber_id: ChamberId,
    ) -> Result<Chamber, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, title, persona, language, created_at
            FROM chambers
            WHERE id = ?1 AND email = ?2
            "#,
        )
        .bind(chamber_id.0)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::ReadFailed(format!("get chamber: {e}")))?;

        match row {
            Some(row) => Self::row_to_chamber(&row),
            None => Err(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            }),
        }
    }

    async fn list_chambers(&self, email: &str) -> Result<Vec<Chamber>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, title, persona, language, created_at
            FROM chambers
            WHERE email = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::ReadFailed(format!("list chambers: {e}")))?;

        rows.iter().map(Self::row_to_chamber).collect()
    }

    async fn rename_chamber(
        &self,
        email: &str,
        chamber_id: ChamberId,
        title: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("UPDATE chambers SET title = ?3 WHERE id = ?1 AND email = ?2")
            .bind(chamber_id.0)
            .bind(email)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("rename chamber: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            });
        }
        Ok(())
    }

    async fn set_chamber_preferences(
        &self,
        email: &str,
        chamber_id: ChamberId,
        persona: Option<&str>,
        language: Option<&str>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE chambers SET persona = ?3, language = ?4 WHERE id = ?1 AND email = ?2",
        )
        .bind(chamber_id.0)
        .bind(email)
        .bind(persona)
        .bind(language)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("set chamber preferences: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            });
        }
        Ok(())
    }

    async fn delete_chamber(&self, email: &str, chamber_id: ChamberId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::WriteFailed(format!("begin delete: {e}")))?;

        // The cascade would cover this; deleting explicitly keeps the
        // outcome independent of the connection's foreign_keys pragma.
        sqlx::query(
            r#"
            DELETE FROM turns
            WHERE chamber_id IN (SELECT id FROM chambers WHERE id = ?1 AND email = ?2)
            "#,
        )
        .bind(chamber_id.0)
        .bind(email)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("delete turns: {e}")))?;

        let result = sqlx::query("DELETE FROM chambers WHERE id = ?1 AND email = ?2")
            .bind(chamber_id.0)
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("delete chamber: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::WriteFailed(format!("commit delete: {e}")))?;

        if result.rows_affected() > 0 {
            debug!(chamber_id = chamber_id.0, "Deleted chamber");
        }
        Ok(())
    }

    async fn append_turn(
        &self,
        email: &str,
        chamber_id: ChamberId,
        role: Role,
        content: &str,
    ) -> Result<i64, StoreError> {
        let _guard = self.write_lock.lock().await;

        // Ownership check, seq assignment, and insert in one statement.
        let row = sqlx::query(
            r#"
            INSERT INTO turns (chamber_id, seq, role, content, created_at)
            SELECT c.id,
                   COALESCE((SELECT MAX(t.seq) FROM turns t WHERE t.chamber_id = c.id), 0) + 1,
                   ?3,
                   ?4,
                   MAX(?5, COALESCE((SELECT MAX(t.created_at) FROM turns t WHERE t.chamber_id = c.id), 0))
            FROM chambers c
            WHERE c.id = ?1 AND c.email = ?2
            RETURNING seq
            "#,
        )
        .bind(chamber_id.0)
        .bind(email)
        .bind(role.as_str())
        .bind(content)
        .bind(Self::now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("append turn: {e}")))?;

        let Some(row) = row else {
            return Err(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            });
        };
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StoreError::ReadFailed(format!("seq column: {e}")))?;

        debug!(chamber_id = chamber_id.0, seq, role = %role, "Appended turn");
        Ok(seq)
    }

    async fn read_turns(&self, email: &str, chamber_id: ChamberId) -> Result<Vec<Turn>, StoreError> {
        // One read transaction so the ownership check and the turn list come
        // from the same snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::ReadFailed(format!("begin read: {e}")))?;

        let owned = sqlx::query("SELECT 1 FROM chambers WHERE id = ?1 AND email = ?2")
            .bind(chamber_id.0)
            .bind(email)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("check chamber: {e}")))?;

        if owned.is_none() {
            return Err(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT chamber_id, seq, role, content, created_at
            FROM turns
            WHERE chamber_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(chamber_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::ReadFailed(format!("read turns: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::ReadFailed(format!("end read: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }
}
