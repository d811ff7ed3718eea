use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "routine_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Frequency {
    #[default]
    Diaria,
    Semanal,
    Quinzenal,
    Mensal,
    Anual,
    Customizada,
}

/// How the next period of a routine is opened once one exists.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "recurrence_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecurrenceMode {
    /// Roll over when the current window ends
    #[default]
    Schedule,
    /// Roll over as soon as every checkin of the current period is completed
    OnCompletion,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Routine {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub recurrence_mode: RecurrenceMode,
    pub unit_id: Option<Uuid>,   // Scoped to a single unit when set
    pub sector_id: Option<Uuid>, // Restricts the default leaf-unit set
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateRoutine {
    pub title: String,
    pub description: Option<String>,
    pub frequency: Option<Frequency>,
    pub recurrence_mode: Option<RecurrenceMode>,
    pub unit_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub unit_ids: Option<Vec<Uuid>>,
    pub assignee_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
pub struct UpdateRoutine {
    pub title: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<Frequency>,
    pub recurrence_mode: Option<RecurrenceMode>,
    pub unit_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
}

impl Routine {
    pub async fn find_all(
        pool: &SqlitePool,
        include_inactive: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Routine>(
            r#"SELECT id, title, description, frequency, recurrence_mode, unit_id, sector_id, is_active, created_by, created_at, updated_at
               FROM routines
               WHERE ($1 = 1 OR is_active = 1)
               ORDER BY title ASC"#,
        )
        .bind(include_inactive)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Routine>(
            r#"SELECT id, title, description, frequency, recurrence_mode, unit_id, sector_id, is_active, created_by, created_at, updated_at
               FROM routines
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateRoutine,
        id: Uuid,
        created_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let frequency = data.frequency.unwrap_or_default();
        let recurrence_mode = data.recurrence_mode.unwrap_or_default();
        let mut tx = pool.begin().await?;

        let routine = sqlx::query_as::<_, Routine>(
            r#"INSERT INTO routines (id, title, description, frequency, recurrence_mode, unit_id, sector_id, created_by)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, title, description, frequency, recurrence_mode, unit_id, sector_id, is_active, created_by, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(frequency)
        .bind(recurrence_mode)
        .bind(data.unit_id)
        .bind(data.sector_id)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        for unit_id in data.unit_ids.iter().flatten() {
            sqlx::query("INSERT OR IGNORE INTO routine_units (routine_id, unit_id) VALUES ($1, $2)")
                .bind(id)
                .bind(*unit_id)
                .execute(&mut *tx)
                .await?;
        }
        for user_id in data.assignee_ids.iter().flatten() {
            sqlx::query(
                "INSERT OR IGNORE INTO routine_assignees (routine_id, user_id) VALUES ($1, $2)",
            )
            .bind(id)
            .bind(*user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(routine)
    }

    /// `None` fields are left unchanged.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateRoutine,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Routine>(
            r#"UPDATE routines
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   frequency = COALESCE($4, frequency),
                   recurrence_mode = COALESCE($5, recurrence_mode),
                   unit_id = COALESCE($6, unit_id),
                   sector_id = COALESCE($7, sector_id),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, title, description, frequency, recurrence_mode, unit_id, sector_id, is_active, created_by, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.title.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(data.frequency)
        .bind(data.recurrence_mode)
        .bind(data.unit_id)
        .bind(data.sector_id)
        .fetch_optional(pool)
        .await
    }

    /// Routines are never hard-deleted; their periods and checkins stay as history.
    pub async fn soft_delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE routines SET is_active = 0, updated_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// No-op write on the routine row. Run first inside a transaction, it takes the SQLite
    /// write lock, so the reads that follow cannot be invalidated by another writer before
    /// commit. Returns false when the routine does not exist.
    pub async fn lock<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE routines SET is_active = is_active WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_unit_ids(pool: &SqlitePool, routine_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT unit_id FROM routine_units WHERE routine_id = $1")
            .bind(routine_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_assignee_ids(
        pool: &SqlitePool,
        routine_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM routine_assignees WHERE routine_id = $1 ORDER BY user_id",
        )
        .bind(routine_id)
        .fetch_all(pool)
        .await
    }

    /// Replace the explicit unit assignment of a routine.
    pub async fn set_unit_ids(
        pool: &SqlitePool,
        routine_id: Uuid,
        unit_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM routine_units WHERE routine_id = $1")
            .bind(routine_id)
            .execute(&mut *tx)
            .await?;
        for unit_id in unit_ids {
            sqlx::query("INSERT OR IGNORE INTO routine_units (routine_id, unit_id) VALUES ($1, $2)")
                .bind(routine_id)
                .bind(*unit_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    /// Replace the set of users the routine is assigned to.
    pub async fn set_assignee_ids(
        pool: &SqlitePool,
        routine_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM routine_assignees WHERE routine_id = $1")
            .bind(routine_id)
            .execute(&mut *tx)
            .await?;
        for user_id in user_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO routine_assignees (routine_id, user_id) VALUES ($1, $2)",
            )
            .bind(routine_id)
            .bind(*user_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
