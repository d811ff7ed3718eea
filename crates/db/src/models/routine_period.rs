use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One execution window of a routine (e.g. "this week").
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct RoutinePeriod {
    pub id: Uuid,
    pub routine_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl RoutinePeriod {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.period_start <= instant && instant <= self.period_end
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        routine_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, RoutinePeriod>(
            r#"INSERT INTO routine_periods (id, routine_id, period_start, period_end, is_active)
               VALUES ($1, $2, $3, $4, 1)
               RETURNING id, routine_id, period_start, period_end, is_active, created_at"#,
        )
        .bind(id)
        .bind(routine_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoutinePeriod>(
            r#"SELECT id, routine_id, period_start, period_end, is_active, created_at
               FROM routine_periods
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Active periods of a routine, newest first. Normally zero or one.
    pub async fn find_active_by_routine<'e, E>(
        executor: E,
        routine_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, RoutinePeriod>(
            r#"SELECT id, routine_id, period_start, period_end, is_active, created_at
               FROM routine_periods
               WHERE routine_id = $1 AND is_active = 1
               ORDER BY period_start DESC, created_at DESC"#,
        )
        .bind(routine_id)
        .fetch_all(executor)
        .await
    }

    /// Every period of a routine, newest first.
    pub async fn find_by_routine(
        pool: &SqlitePool,
        routine_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoutinePeriod>(
            r#"SELECT id, routine_id, period_start, period_end, is_active, created_at
               FROM routine_periods
               WHERE routine_id = $1
               ORDER BY period_start DESC, created_at DESC"#,
        )
        .bind(routine_id)
        .fetch_all(pool)
        .await
    }

    /// Active periods of active routines, used by the scheduler.
    pub async fn find_all_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoutinePeriod>(
            r#"SELECT p.id, p.routine_id, p.period_start, p.period_end, p.is_active, p.created_at
               FROM routine_periods p
               JOIN routines r ON r.id = p.routine_id
               WHERE p.is_active = 1 AND r.is_active = 1
               ORDER BY p.period_start ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    /// Returns 0 when the period was already inactive.
    pub async fn deactivate<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE routine_periods SET is_active = 0 WHERE id = $1 AND is_active = 1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn deactivate_all_for_routine<'e, E>(
        executor: E,
        routine_id: Uuid,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE routine_periods SET is_active = 0 WHERE routine_id = $1 AND is_active = 1",
        )
        .bind(routine_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
