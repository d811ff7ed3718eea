use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "checkin_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckinStatus {
    #[default]
    Pendente,
    Concluido,
}

/// One unit's (optionally one assignee's) confirmation of a routine within a period.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct RoutineCheckin {
    pub id: Uuid,
    pub routine_period_id: Uuid,
    pub unit_id: Uuid,
    pub assignee_user_id: Option<Uuid>,
    pub status: CheckinStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutineCheckin {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Checkin joined with the unit it belongs to, for period detail views.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct RoutineCheckinWithUnit {
    #[serde(flatten)]
    #[ts(flatten)]
    #[sqlx(flatten)]
    pub checkin: RoutineCheckin,
    pub unit_name: String,
}

impl std::ops::Deref for RoutineCheckinWithUnit {
    type Target = RoutineCheckin;
    fn deref(&self) -> &Self::Target {
        &self.checkin
    }
}

/// Row to insert when a period opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckin {
    pub unit_id: Uuid,
    pub assignee_user_id: Option<Uuid>,
}

impl RoutineCheckin {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        routine_period_id: Uuid,
        data: &NewCheckin,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, RoutineCheckin>(
            r#"INSERT INTO routine_checkins (id, routine_period_id, unit_id, assignee_user_id, status)
               VALUES ($1, $2, $3, $4, 'pendente')
               RETURNING id, routine_period_id, unit_id, assignee_user_id, status, completed_at, completed_by, notes, created_at, updated_at"#,
        )
        .bind(id)
        .bind(routine_period_id)
        .bind(data.unit_id)
        .bind(data.assignee_user_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoutineCheckin>(
            r#"SELECT id, routine_period_id, unit_id, assignee_user_id, status, completed_at, completed_by, notes, created_at, updated_at
               FROM routine_checkins
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_period<'e, E>(
        executor: E,
        routine_period_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, RoutineCheckin>(
            r#"SELECT id, routine_period_id, unit_id, assignee_user_id, status, completed_at, completed_by, notes, created_at, updated_at
               FROM routine_checkins
               WHERE routine_period_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(routine_period_id)
        .fetch_all(executor)
        .await
    }

    pub async fn find_by_period_with_unit(
        pool: &SqlitePool,
        routine_period_id: Uuid,
    ) -> Result<Vec<RoutineCheckinWithUnit>, sqlx::Error> {
        sqlx::query_as::<_, RoutineCheckinWithUnit>(
            r#"SELECT c.id, c.routine_period_id, c.unit_id, c.assignee_user_id, c.status, c.completed_at,
                      c.completed_by, c.notes, c.created_at, c.updated_at,
                      u.name AS unit_name
               FROM routine_checkins c
               JOIN units u ON u.id = c.unit_id
               WHERE c.routine_period_id = $1
               ORDER BY u.name ASC, c.assignee_user_id ASC"#,
        )
        .bind(routine_period_id)
        .fetch_all(pool)
        .await
    }

    /// Mark as completed by `completed_by`. A `None` note keeps the stored one.
    pub async fn mark_completed(
        pool: &SqlitePool,
        id: Uuid,
        completed_by: Uuid,
        completed_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoutineCheckin>(
            r#"UPDATE routine_checkins
               SET status = 'concluido',
                   completed_at = $2,
                   completed_by = $3,
                   notes = COALESCE($4, notes),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, routine_period_id, unit_id, assignee_user_id, status, completed_at, completed_by, notes, created_at, updated_at"#,
        )
        .bind(id)
        .bind(completed_at)
        .bind(completed_by)
        .bind(notes)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_pending(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoutineCheckin>(
            r#"UPDATE routine_checkins
               SET status = 'pendente',
                   completed_at = NULL,
                   completed_by = NULL,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, routine_period_id, unit_id, assignee_user_id, status, completed_at, completed_by, notes, created_at, updated_at"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
