use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A sticky note on the shared board. `pos_x`/`pos_y` are pixel offsets snapped to the
/// board grid; very small values come from the older rank-based layout.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub color: String,
    pub pos_x: i64,
    pub pos_y: i64,
    pub sector_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateNote {
    pub title: String,
    pub content: Option<String>,
    pub color: Option<String>,
    pub pos_x: Option<i64>,
    pub pos_y: Option<i64>,
    pub sector_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<String>,
    pub sector_id: Option<Uuid>,
}

pub const DEFAULT_NOTE_COLOR: &str = "yellow";

impl Note {
    /// Notes in creation order; layout normalisation depends on this order.
    pub async fn find_all(
        pool: &SqlitePool,
        sector_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Note>(
            r#"SELECT id, title, content, color, pos_x, pos_y, sector_id, created_by, created_at, updated_at
               FROM notes
               WHERE ($1 IS NULL OR sector_id = $1)
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(sector_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Note>(
            r#"SELECT id, title, content, color, pos_x, pos_y, sector_id, created_by, created_at, updated_at
               FROM notes
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateNote,
        id: Uuid,
        created_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let color = data.color.as_deref().unwrap_or(DEFAULT_NOTE_COLOR);
        sqlx::query_as::<_, Note>(
            r#"INSERT INTO notes (id, title, content, color, pos_x, pos_y, sector_id, created_by)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, title, content, color, pos_x, pos_y, sector_id, created_by, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.title.trim())
        .bind(&data.content)
        .bind(color)
        .bind(data.pos_x.unwrap_or(0))
        .bind(data.pos_y.unwrap_or(0))
        .bind(data.sector_id)
        .bind(created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateNote,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Note>(
            r#"UPDATE notes
               SET title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   color = COALESCE($4, color),
                   sector_id = COALESCE($5, sector_id),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, title, content, color, pos_x, pos_y, sector_id, created_by, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.title.as_deref().map(str::trim))
        .bind(&data.content)
        .bind(&data.color)
        .bind(data.sector_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_position(
        pool: &SqlitePool,
        id: Uuid,
        pos_x: i64,
        pos_y: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Note>(
            r#"UPDATE notes
               SET pos_x = $2, pos_y = $3, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, title, content, color, pos_x, pos_y, sector_id, created_by, created_at, updated_at"#,
        )
        .bind(id)
        .bind(pos_x)
        .bind(pos_y)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
