use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use sqlx::{
    Error, Pool, Sqlite,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqliteOperation, SqlitePoolOptions,
        UpdateHookResult,
    },
};
use strum_macros::{Display, EnumIter, EnumString};
use tokio::sync::broadcast;
use tracing::{debug, info};
use ts_rs::TS;

pub mod models;

/// Buffered change notifications per subscriber before lagging ones start losing events.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Tables whose writes are published on the change feed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Sectors,
    Units,
    Routines,
    RoutineUnits,
    RoutineAssignees,
    RoutinePeriods,
    RoutineCheckins,
    Tasks,
    Notes,
    NoteAttachments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A single row-level write observed on any pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct TableChange {
    pub table: Table,
    pub operation: ChangeOperation,
    pub rowid: i64,
}

impl TableChange {
    fn from_hook(result: &UpdateHookResult<'_>) -> Option<Self> {
        let table = Table::from_str(result.table).ok()?;
        let operation = match result.operation {
            SqliteOperation::Insert => ChangeOperation::Insert,
            SqliteOperation::Update => ChangeOperation::Update,
            SqliteOperation::Delete => ChangeOperation::Delete,
            _ => return None,
        };
        Some(Self {
            table,
            operation,
            rowid: result.rowid,
        })
    }
}

#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
    changes: broadcast::Sender<TableChange>,
}

impl DBService {
    /// Open (creating if needed) the database at `database_url` and run pending migrations.
    pub async fn new(database_url: &str) -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let service = Self::connect(options, 8).await?;
        service.migrate().await?;
        info!(database_url = %database_url, "Database ready");
        Ok(service)
    }

    /// Open an existing database read-only, for diagnostics. Nothing is created and no
    /// migration runs; a missing file is an error.
    pub async fn open_existing(database_url: &str) -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(false)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));
        Self::connect(options, 1).await
    }

    /// Single-connection in-memory database, used by tests and tooling.
    pub async fn new_in_memory() -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let service = Self::connect(options, 1).await?;
        service.migrate().await?;
        Ok(service)
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<DBService, Error> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let hook_sender = changes.clone();

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            // an in-memory database disappears with its last connection
            .idle_timeout(None)
            .max_lifetime(None)
            .after_connect(move |conn, _meta| {
                let hook_sender = hook_sender.clone();
                Box::pin(async move {
                    let mut handle = conn.lock_handle().await?;
                    handle.set_update_hook(move |result| {
                        if let Some(change) = TableChange::from_hook(&result) {
                            // no subscribers is fine
                            let _ = hook_sender.send(change);
                        }
                    });
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        Ok(DBService { pool, changes })
    }

    async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Migrations applied");
        Ok(())
    }

    /// Subscribe to row-level writes. Events are published as statements execute, so a
    /// rolled-back transaction may still produce notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_runs_migrations() {
        let db = DBService::new_in_memory().await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'routine_checkins'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_writes_are_published_on_change_feed() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut rx = db.subscribe();

        sqlx::query("INSERT INTO sectors (id, name) VALUES ($1, $2)")
            .bind(uuid::Uuid::new_v4())
            .bind("Operações")
            .execute(&db.pool)
            .await
            .unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.table, Table::Sectors);
        assert_eq!(change.operation, ChangeOperation::Insert);
    }

    #[tokio::test]
    async fn test_open_existing_does_not_create_missing_database() {
        let path = std::env::temp_dir().join(format!("missing-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        assert!(DBService::open_existing(&url).await.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_table_names_match_schema() {
        assert_eq!(Table::RoutineCheckins.to_string(), "routine_checkins");
        assert_eq!(Table::from_str("note_attachments").unwrap(), Table::NoteAttachments);
        assert!(Table::from_str("_sqlx_migrations").is_err());
    }
}
