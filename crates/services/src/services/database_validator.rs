//! Health check: migrations applied and every application table present.

use db::Table;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum DatabaseValidationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct HealthReport {
    pub is_initialized: bool,
    pub migrations_applied: usize,
    pub latest_migration: Option<String>,
    pub missing_tables: Vec<String>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.is_initialized && self.missing_tables.is_empty()
    }

    pub fn summary(&self) -> String {
        if !self.is_initialized {
            "Database not initialized - migrations need to be run".to_string()
        } else if !self.missing_tables.is_empty() {
            format!("Missing tables: {}", self.missing_tables.join(", "))
        } else {
            format!("Database OK - {} migrations applied", self.migrations_applied)
        }
    }
}

pub struct DatabaseValidator {
    pool: SqlitePool,
}

impl DatabaseValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn validate(&self) -> Result<HealthReport, DatabaseValidationError> {
        if !self.table_exists("_sqlx_migrations").await? {
            warn!("Database not initialized - _sqlx_migrations table does not exist");
            return Ok(HealthReport {
                is_initialized: false,
                migrations_applied: 0,
                latest_migration: None,
                missing_tables: Table::iter().map(|t| t.to_string()).collect(),
            });
        }

        let migrations_applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        let latest_migration = sqlx::query_scalar::<_, String>(
            "SELECT description FROM _sqlx_migrations WHERE success = 1 ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let mut missing_tables = Vec::new();
        for table in Table::iter() {
            let name = table.to_string();
            if !self.table_exists(&name).await? {
                missing_tables.push(name);
            }
        }
        if !missing_tables.is_empty() {
            warn!(missing = ?missing_tables, "Database is missing tables");
        }

        let report = HealthReport {
            is_initialized: true,
            migrations_applied: migrations_applied as usize,
            latest_migration,
            missing_tables,
        };
        debug!(summary = %report.summary(), "Database validation complete");
        Ok(report)
    }

    async fn table_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
