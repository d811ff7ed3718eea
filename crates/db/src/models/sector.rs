use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Sector {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateSector {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateSector {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Sector {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sector>(
            r#"SELECT id, name, description, created_at, updated_at
               FROM sectors
               ORDER BY name ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sector>(
            r#"SELECT id, name, description, created_at, updated_at
               FROM sectors
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateSector,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Sector>(
            r#"INSERT INTO sectors (id, name, description)
               VALUES ($1, $2, $3)
               RETURNING id, name, description, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    /// `None` fields are left unchanged.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateSector,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sector>(
            r#"UPDATE sectors
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, description, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.description)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sectors WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
