use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct NoteAttachment {
    pub id: Uuid,
    pub note_id: Uuid,
    pub file_name: String,
    pub file_path: String, // Blob storage key: {owner}/{token}_{name}
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNoteAttachment {
    pub note_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub uploaded_by: Uuid,
}

impl NoteAttachment {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateNoteAttachment,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, NoteAttachment>(
            r#"INSERT INTO note_attachments (id, note_id, file_name, file_path, file_size, mime_type, uploaded_by)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, note_id, file_name, file_path, file_size, mime_type, uploaded_by, created_at"#,
        )
        .bind(id)
        .bind(data.note_id)
        .bind(&data.file_name)
        .bind(&data.file_path)
        .bind(data.file_size)
        .bind(&data.mime_type)
        .bind(data.uploaded_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, NoteAttachment>(
            r#"SELECT id, note_id, file_name, file_path, file_size, mime_type, uploaded_by, created_at
               FROM note_attachments
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_note(
        pool: &SqlitePool,
        note_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, NoteAttachment>(
            r#"SELECT id, note_id, file_name, file_path, file_size, mime_type, uploaded_by, created_at
               FROM note_attachments
               WHERE note_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(note_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM note_attachments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
