use chrono::Utc;
use db::models::routine_checkin::RoutineCheckin;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckinError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("checkin {0} not found")]
    NotFound(Uuid),
}

/// Toggles a unit's confirmation within a period.
pub struct CheckinService;

impl CheckinService {
    /// Mark the checkin done by `acting_user`. Completing again refreshes the timestamp.
    pub async fn complete(
        pool: &SqlitePool,
        checkin_id: Uuid,
        acting_user: Uuid,
        comment: Option<&str>,
    ) -> Result<RoutineCheckin, CheckinError> {
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        let checkin = RoutineCheckin::mark_completed(pool, checkin_id, acting_user, Utc::now(), comment)
            .await?
            .ok_or(CheckinError::NotFound(checkin_id))?;
        info!(
            checkin_id = %checkin_id,
            period_id = %checkin.routine_period_id,
            user_id = %acting_user,
            "Checkin completed"
        );
        Ok(checkin)
    }

    /// Back to pending. The note is kept.
    pub async fn undo(pool: &SqlitePool, checkin_id: Uuid) -> Result<RoutineCheckin, CheckinError> {
        let checkin = RoutineCheckin::mark_pending(pool, checkin_id)
            .await?
            .ok_or(CheckinError::NotFound(checkin_id))?;
        info!(checkin_id = %checkin_id, period_id = %checkin.routine_period_id, "Checkin reopened");
        Ok(checkin)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::{
        DBService,
        models::{routine::Frequency, routine_checkin::CheckinStatus},
    };

    use super::*;
    use crate::services::{
        completion::CompletionSummary,
        routine_period::{
            RoutinePeriodService,
            tests::{seed_routine, seed_units},
        },
    };

    #[tokio::test]
    async fn test_complete_then_undo_restores_pending_state() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A", "B"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let opened = RoutinePeriodService::start_current_period(
            &db.pool,
            routine.id,
            Utc::now(),
            chrono_tz::UTC,
        )
        .await
        .unwrap();
        let original = opened.checkins[0].clone();
        let user = Uuid::new_v4();

        let done = CheckinService::complete(&db.pool, original.id, user, Some(" ok "))
            .await
            .unwrap();
        assert_eq!(done.status, CheckinStatus::Concluido);
        assert_eq!(done.completed_by, Some(user));
        assert_eq!(done.notes.as_deref(), Some("ok"));

        let reopened = CheckinService::undo(&db.pool, original.id).await.unwrap();
        assert_eq!(reopened.status, original.status);
        assert_eq!(reopened.completed_at, None);
        assert_eq!(reopened.completed_by, None);
        assert_eq!(reopened.notes.as_deref(), Some("ok"));

        let checkins = RoutineCheckin::find_by_period(&db.pool, opened.period.id)
            .await
            .unwrap();
        assert_eq!(CompletionSummary::from_checkins(&checkins).completed, 0);
    }

    #[tokio::test]
    async fn test_completing_twice_keeps_it_completed() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let opened = RoutinePeriodService::start_current_period(
            &db.pool,
            routine.id,
            Utc::now(),
            chrono_tz::UTC,
        )
        .await
        .unwrap();
        let id = opened.checkins[0].id;

        let first = CheckinService::complete(&db.pool, id, Uuid::new_v4(), None).await.unwrap();
        let second = CheckinService::complete(&db.pool, id, Uuid::new_v4(), None).await.unwrap();
        assert!(first.is_completed() && second.is_completed());
        assert!(second.completed_at >= first.completed_at);
    }

    #[tokio::test]
    async fn test_unknown_checkin_is_not_found() {
        let db = DBService::new_in_memory().await.unwrap();
        let result = CheckinService::undo(&db.pool, Uuid::new_v4()).await;
        assert!(matches!(result, Err(CheckinError::NotFound(_))));
    }
}
