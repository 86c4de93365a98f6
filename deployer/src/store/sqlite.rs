//! SQLite-backed deployment store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use crate::errors::DeployerError;
use crate::models::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use crate::store::DeploymentStore;

const COLUMNS: &str =
    "id, product_name, mode, status, message, is_current, error_message, started_at, finished_at";

/// Store persisting records in a single SQLite table
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeployerError> {
        let path = path.as_ref();
        info!("Opening deployment database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, DeployerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DeployerError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<(), DeployerError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS deployments (
                id            TEXT PRIMARY KEY,
                product_name  TEXT NOT NULL,
                mode          TEXT NOT NULL DEFAULT 'standard',
                status        TEXT NOT NULL,
                message       TEXT NOT NULL,
                is_current    INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                started_at    TEXT NOT NULL,
                finished_at   TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_deployments_product ON deployments(product_name, started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_deployments_status ON deployments(status, started_at DESC);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DeployerError> {
        self.conn
            .lock()
            .map_err(|_| {
                DeployerError::StorageError("database connection lock poisoned".to_string())
            })
    }

    fn query(
        conn: &Connection,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Deployment>, DeployerError> {
        let sql = format!(
            "SELECT {} FROM deployments WHERE {} ORDER BY started_at DESC",
            COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, DeploymentRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(DeploymentRow::into_deployment).collect()
    }

    fn upsert(conn: &Connection, deployment: &Deployment) -> Result<(), DeployerError> {
        conn.execute(
            "INSERT INTO deployments (id, product_name, mode, status, message, is_current, error_message, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                product_name = excluded.product_name,
                mode = excluded.mode,
                status = excluded.status,
                message = excluded.message,
                is_current = excluded.is_current,
                error_message = excluded.error_message,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at",
            params![
                deployment.id.to_string(),
                deployment.product_name,
                deployment.mode.as_str(),
                deployment.status.as_str(),
                deployment.message,
                deployment.is_current,
                deployment.error_message,
                format_timestamp(&deployment.started_at),
                deployment.finished_at.as_ref().map(format_timestamp),
            ],
        )?;
        Ok(())
    }
}

/// Fixed-width timestamps so text ordering matches time ordering
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DeployerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DeployerError::StorageError(format!("invalid timestamp '{}': {}", value, e)))
}

/// Raw column values of one row
struct DeploymentRow {
    id: String,
    product_name: String,
    mode: String,
    status: String,
    message: String,
    is_current: bool,
    error_message: Option<String>,
    started_at: String,
    finished_at: Option<String>,
}

impl DeploymentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_name: row.get(1)?,
            mode: row.get(2)?,
            status: row.get(3)?,
            message: row.get(4)?,
            is_current: row.get(5)?,
            error_message: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
        })
    }

    fn into_deployment(self) -> Result<Deployment, DeployerError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| DeployerError::StorageError(format!("invalid id '{}': {}", self.id, e)))?;

        Ok(Deployment {
            id,
            product_name: self.product_name,
            mode: self.mode.parse::<DeploymentMode>().map_err(DeployerError::StorageError)?,
            status: self.status.parse::<DeploymentStatus>().map_err(DeployerError::StorageError)?,
            message: self.message,
            is_current: self.is_current,
            error_message: self.error_message,
            started_at: parse_timestamp(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[async_trait]
impl DeploymentStore for SqliteStore {
    async fn save(&self, deployment: &Deployment) -> Result<(), DeployerError> {
        let conn = self.lock()?;
        Self::upsert(&conn, deployment)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Deployment>, DeployerError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM deployments WHERE id = ?1", COLUMNS);
        let row = conn
            .query_row(&sql, params![id.to_string()], DeploymentRow::read)
            .optional()?;
        row.map(DeploymentRow::into_deployment).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DeployerError> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM deployments WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    async fn list(&self, product_name: &str) -> Result<Vec<Deployment>, DeployerError> {
        let conn = self.lock()?;
        Self::query(&conn, "product_name = ?1", params![product_name])
    }

    async fn queued(&self) -> Result<Vec<Deployment>, DeployerError> {
        let conn = self.lock()?;
        Self::query(&conn, "status IN ('queued', 'canceled')", params![])
    }

    async fn current(&self, product_name: &str) -> Result<Option<Deployment>, DeployerError> {
        let conn = self.lock()?;
        let mut current = Self::query(
            &conn,
            "is_current = 1 AND product_name = ?1",
            params![product_name],
        )?;
        Ok(if current.is_empty() {
            None
        } else {
            Some(current.swap_remove(0))
        })
    }

    async fn set_current(&self, deployment: &Deployment) -> Result<(), DeployerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE deployments SET is_current = 0,
                status = CASE WHEN status = 'deployed' THEN 'success' ELSE status END
             WHERE is_current = 1 AND product_name = ?1 AND id != ?2",
            params![deployment.product_name, deployment.id.to_string()],
        )?;
        Self::upsert(&tx, deployment)?;

        tx.commit()?;
        Ok(())
    }

    async fn has_delivered_after(
        &self,
        product_name: &str,
        after: DateTime<Utc>,
    ) -> Result<bool, DeployerError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM deployments
                WHERE product_name = ?1 AND started_at > ?2 AND status IN ('success', 'deployed')
            )",
            params![product_name, format_timestamp(&after)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn has_queued_restart(
        &self,
        product_name: &str,
        after: DateTime<Utc>,
    ) -> Result<bool, DeployerError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM deployments
                WHERE product_name = ?1 AND started_at > ?2
                  AND status IN ('queued', 'canceled') AND mode IN ('restart_only', 'restartOnly')
            )",
            params![product_name, format_timestamp(&after)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
