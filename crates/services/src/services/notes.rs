//! Notes board persistence: layout repair on load, drag moves, and attachments.

use db::models::{
    note::{CreateNote, Note, UpdateNote},
    note_attachment::{CreateNoteAttachment, NoteAttachment},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    file_storage::{FileStorage, FileStorageError, guess_mime},
    notes_board::{GridConfig, GridPosition, NotePlacement},
};

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Storage(#[from] FileStorageError),
    #[error("note {0} not found")]
    NotFound(Uuid),
    #[error("attachment {0} not found")]
    AttachmentNotFound(Uuid),
    #[error("position ({x}, {y}) is outside the board")]
    OutOfBoard { x: i64, y: i64 },
}

/// A file received with a request, not yet stored.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AttachmentView {
    #[serde(flatten)]
    #[ts(flatten)]
    pub attachment: NoteAttachment,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct NoteWithAttachments {
    #[serde(flatten)]
    #[ts(flatten)]
    pub note: Note,
    pub attachments: Vec<AttachmentView>,
}

/// Result of creating a note together with its uploads.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ComposedNote {
    pub note: NoteWithAttachments,
    /// File names that could not be stored; the note itself was saved
    pub failed_attachments: Vec<String>,
}

impl ComposedNote {
    pub fn is_partial(&self) -> bool {
        !self.failed_attachments.is_empty()
    }
}

/// Drag by a pixel delta, or drop at an absolute position. Either way the result is snapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(untagged)]
pub enum MoveNote {
    Delta { dx: i64, dy: i64 },
    Absolute { x: i64, y: i64 },
}

#[derive(Clone)]
pub struct NoteService {
    storage: FileStorage,
    grid: GridConfig,
}

impl NoteService {
    pub fn new(storage: FileStorage, grid: GridConfig) -> Self {
        Self { storage, grid }
    }

    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    /// The board with legacy and colliding positions repaired and persisted.
    pub async fn board(
        &self,
        pool: &SqlitePool,
        sector_id: Option<Uuid>,
    ) -> Result<Vec<NoteWithAttachments>, NoteError> {
        let mut notes = Note::find_all(pool, sector_id).await?;
        let placements: Vec<NotePlacement> = notes.iter().map(placement_of).collect();
        let changed = self.grid.normalize_layout(&placements);

        for moved in &changed {
            Note::update_position(pool, moved.id, moved.position.x, moved.position.y).await?;
            if let Some(note) = notes.iter_mut().find(|n| n.id == moved.id) {
                note.pos_x = moved.position.x;
                note.pos_y = moved.position.y;
            }
        }
        if !changed.is_empty() {
            info!(repaired = changed.len(), "Normalized notes board layout");
        }

        let mut board = Vec::with_capacity(notes.len());
        for note in notes {
            board.push(self.with_attachments(pool, note).await?);
        }
        Ok(board)
    }

    pub async fn get(&self, pool: &SqlitePool, id: Uuid) -> Result<NoteWithAttachments, NoteError> {
        let note = Note::find_by_id(pool, id).await?.ok_or(NoteError::NotFound(id))?;
        self.with_attachments(pool, note).await
    }

    /// Create the note, then store each upload. Upload failures are reported, not rolled back.
    pub async fn create_with_attachments(
        &self,
        pool: &SqlitePool,
        data: &CreateNote,
        created_by: Uuid,
        uploads: Vec<PendingUpload>,
    ) -> Result<ComposedNote, NoteError> {
        let position = match (data.pos_x, data.pos_y) {
            (Some(x), Some(y)) => self.grid.snap(GridPosition::new(x, y)),
            _ => {
                let existing = Note::find_all(pool, None).await?;
                let occupied: Vec<GridPosition> =
                    existing.iter().map(|n| placement_of(n).position).collect();
                self.grid.first_free_cell(&occupied)
            }
        };
        let data = CreateNote {
            pos_x: Some(position.x),
            pos_y: Some(position.y),
            ..data.clone()
        };
        let note = Note::create(pool, &data, Uuid::new_v4(), created_by).await?;
        info!(note_id = %note.id, uploads = uploads.len(), "Created note");

        let mut failed_attachments = Vec::new();
        for upload in uploads {
            let file_name = upload.file_name.clone();
            if let Err(e) = self.store_attachment(pool, note.id, upload, created_by).await {
                warn!(note_id = %note.id, file_name = %file_name, error = %e, "Attachment upload failed");
                failed_attachments.push(file_name);
            }
        }

        Ok(ComposedNote {
            note: self.with_attachments(pool, note).await?,
            failed_attachments,
        })
    }

    pub async fn update(
        &self,
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateNote,
    ) -> Result<NoteWithAttachments, NoteError> {
        let note = Note::update(pool, id, data).await?.ok_or(NoteError::NotFound(id))?;
        self.with_attachments(pool, note).await
    }

    pub async fn move_note(
        &self,
        pool: &SqlitePool,
        id: Uuid,
        movement: MoveNote,
    ) -> Result<Note, NoteError> {
        let note = Note::find_by_id(pool, id).await?.ok_or(NoteError::NotFound(id))?;
        let current = GridPosition::new(note.pos_x, note.pos_y);
        let target = match movement {
            MoveNote::Delta { dx, dy } => self.grid.apply_drag(current, dx, dy),
            MoveNote::Absolute { x, y } => self.grid.snap(GridPosition::new(x, y)),
        };
        if !target.within_board() {
            return Err(NoteError::OutOfBoard {
                x: target.x,
                y: target.y,
            });
        }
        let moved = Note::update_position(pool, id, target.x, target.y)
            .await?
            .ok_or(NoteError::NotFound(id))?;
        debug!(note_id = %id, x = target.x, y = target.y, "Moved note");
        Ok(moved)
    }

    /// Delete the note and its stored files. Files that cannot be removed are logged.
    pub async fn delete(&self, pool: &SqlitePool, id: Uuid) -> Result<(), NoteError> {
        let attachments = NoteAttachment::find_by_note(pool, id).await?;
        if Note::delete(pool, id).await? == 0 {
            return Err(NoteError::NotFound(id));
        }
        for attachment in attachments {
            if let Err(e) = self.storage.delete(&attachment.file_path).await {
                warn!(note_id = %id, path = %attachment.file_path, error = %e, "Could not delete attachment file");
            }
        }
        info!(note_id = %id, "Deleted note");
        Ok(())
    }

    pub async fn attachments(
        &self,
        pool: &SqlitePool,
        note_id: Uuid,
    ) -> Result<Vec<AttachmentView>, NoteError> {
        Note::find_by_id(pool, note_id)
            .await?
            .ok_or(NoteError::NotFound(note_id))?;
        let attachments = NoteAttachment::find_by_note(pool, note_id).await?;
        Ok(attachments.into_iter().map(|a| self.view(a)).collect())
    }

    pub async fn add_attachment(
        &self,
        pool: &SqlitePool,
        note_id: Uuid,
        upload: PendingUpload,
        uploaded_by: Uuid,
    ) -> Result<AttachmentView, NoteError> {
        Note::find_by_id(pool, note_id)
            .await?
            .ok_or(NoteError::NotFound(note_id))?;
        let attachment = self.store_attachment(pool, note_id, upload, uploaded_by).await?;
        Ok(self.view(attachment))
    }

    pub async fn delete_attachment(
        &self,
        pool: &SqlitePool,
        attachment_id: Uuid,
    ) -> Result<(), NoteError> {
        let attachment = NoteAttachment::find_by_id(pool, attachment_id)
            .await?
            .ok_or(NoteError::AttachmentNotFound(attachment_id))?;
        NoteAttachment::delete(pool, attachment_id).await?;
        self.storage.delete(&attachment.file_path).await?;
        Ok(())
    }

    async fn store_attachment(
        &self,
        pool: &SqlitePool,
        note_id: Uuid,
        upload: PendingUpload,
        uploaded_by: Uuid,
    ) -> Result<NoteAttachment, NoteError> {
        let stored = self
            .storage
            .upload(note_id, &upload.file_name, &upload.bytes)
            .await?;
        let data = CreateNoteAttachment {
            note_id,
            file_name: stored.file_name,
            file_path: stored.path.clone(),
            file_size: stored.size as i64,
            mime_type: stored.mime_type.or_else(|| guess_mime(&upload.file_name)),
            uploaded_by,
        };
        match NoteAttachment::create(pool, &data, Uuid::new_v4()).await {
            Ok(attachment) => Ok(attachment),
            Err(e) => {
                // keep storage in step with the table
                if let Err(cleanup) = self.storage.delete(&stored.path).await {
                    warn!(path = %stored.path, error = %cleanup, "Could not remove orphaned file");
                }
                Err(e.into())
            }
        }
    }

    async fn with_attachments(
        &self,
        pool: &SqlitePool,
        note: Note,
    ) -> Result<NoteWithAttachments, NoteError> {
        let attachments = NoteAttachment::find_by_note(pool, note.id).await?;
        Ok(NoteWithAttachments {
            note,
            attachments: attachments.into_iter().map(|a| self.view(a)).collect(),
        })
    }

    fn view(&self, attachment: NoteAttachment) -> AttachmentView {
        AttachmentView {
            url: self.storage.public_url(&attachment.file_path),
            attachment,
        }
    }
}

fn placement_of(note: &Note) -> NotePlacement {
    NotePlacement {
        id: note.id,
        position: GridPosition::new(note.pos_x, note.pos_y),
    }
}
