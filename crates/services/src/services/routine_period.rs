//! Opening routine periods and reporting their progress.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use db::models::{
    routine::{RecurrenceMode, Routine},
    routine_checkin::{NewCheckin, RoutineCheckin, RoutineCheckinWithUnit},
    routine_period::RoutinePeriod,
    unit::Unit,
};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    completion::CompletionSummary,
    period_window::{PeriodWindow, period_window},
};

#[derive(Debug, Error)]
pub enum RoutinePeriodError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("routine {0} not found")]
    RoutineNotFound(Uuid),
    #[error("routine {0} is inactive")]
    RoutineInactive(Uuid),
    #[error("period {period_id} is already active")]
    PeriodAlreadyActive { period_id: Uuid },
    #[error("period {period_id} still has pending checkins")]
    PeriodAwaitingCompletion { period_id: Uuid },
}

/// A freshly opened period with the checkins created for it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct OpenedPeriod {
    pub period: RoutinePeriod,
    pub checkins: Vec<RoutineCheckin>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PeriodWithProgress {
    #[serde(flatten)]
    #[ts(flatten)]
    pub period: RoutinePeriod,
    pub summary: CompletionSummary,
}

/// Routine card: the routine plus the progress of its active period, if any.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RoutineWithProgress {
    #[serde(flatten)]
    #[ts(flatten)]
    pub routine: Routine,
    pub active_period: Option<RoutinePeriod>,
    pub summary: CompletionSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RoutineDetail {
    pub routine: Routine,
    pub unit_ids: Vec<Uuid>,
    pub assignee_ids: Vec<Uuid>,
    pub active_period: Option<RoutinePeriod>,
    pub checkins: Vec<RoutineCheckinWithUnit>,
    pub summary: CompletionSummary,
}

/// One checkin per (unit, assignee), or one unassigned checkin per unit when the routine
/// has no assignees.
pub fn expand_checkins(unit_ids: &[Uuid], assignee_ids: &[Uuid]) -> Vec<NewCheckin> {
    if assignee_ids.is_empty() {
        return unit_ids
            .iter()
            .map(|unit_id| NewCheckin {
                unit_id: *unit_id,
                assignee_user_id: None,
            })
            .collect();
    }
    unit_ids
        .iter()
        .flat_map(|unit_id| {
            assignee_ids.iter().map(move |user_id| NewCheckin {
                unit_id: *unit_id,
                assignee_user_id: Some(*user_id),
            })
        })
        .collect()
}

/// Window of the period that covers `now` in the business time zone, as UTC.
pub fn current_window(routine: &Routine, now: DateTime<Utc>, tz: Tz) -> PeriodWindow<Utc> {
    period_window(routine.frequency, &now.with_timezone(&tz)).to_utc()
}

pub struct RoutinePeriodService;

impl RoutinePeriodService {
    /// Units a new period of `routine` needs a checkin from.
    pub async fn applicable_unit_ids(
        pool: &SqlitePool,
        routine: &Routine,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        if let Some(unit_id) = routine.unit_id {
            return Ok(vec![unit_id]);
        }
        let explicit = Routine::find_unit_ids(pool, routine.id).await?;
        if !explicit.is_empty() {
            let units = Unit::find_active_by_ids(pool, &explicit).await?;
            return Ok(units.into_iter().map(|u| u.id).collect());
        }
        let leaves = Unit::find_active_leaves(pool, routine.sector_id).await?;
        Ok(leaves.into_iter().map(|u| u.id).collect())
    }

    pub async fn applicable_checkins(
        pool: &SqlitePool,
        routine: &Routine,
    ) -> Result<Vec<NewCheckin>, sqlx::Error> {
        let unit_ids = Self::applicable_unit_ids(pool, routine).await?;
        let assignee_ids = Routine::find_assignee_ids(pool, routine.id).await?;
        if unit_ids.is_empty() {
            warn!(routine_id = %routine.id, "Routine has no applicable units; period will have no checkins");
        }
        Ok(expand_checkins(&unit_ids, &assignee_ids))
    }

    /// Insert a period for `window` and its checkins in one transaction. Does not check for
    /// an existing period covering the same window.
    pub async fn open_period(
        pool: &SqlitePool,
        routine: &Routine,
        window: &PeriodWindow<Utc>,
    ) -> Result<OpenedPeriod, RoutinePeriodError> {
        let checkins = Self::applicable_checkins(pool, routine).await?;
        let mut tx = pool.begin().await?;
        let opened = insert_period(&mut tx, routine.id, window, &checkins).await?;
        tx.commit().await?;

        info!(
            routine_id = %routine.id,
            period_id = %opened.period.id,
            checkins = opened.checkins.len(),
            "Opened routine period"
        );
        Ok(opened)
    }

    /// Start the period covering `now`, unless one is already active. Other active periods
    /// of the routine are deactivated. An `on_completion` routine whose newest period still
    /// has pending checkins is refused.
    pub async fn start_current_period(
        pool: &SqlitePool,
        routine_id: Uuid,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<OpenedPeriod, RoutinePeriodError> {
        let routine = Routine::find_by_id(pool, routine_id)
            .await?
            .ok_or(RoutinePeriodError::RoutineNotFound(routine_id))?;
        if !routine.is_active {
            return Err(RoutinePeriodError::RoutineInactive(routine_id));
        }

        let window = current_window(&routine, now, tz);
        let checkins = Self::applicable_checkins(pool, &routine).await?;

        let mut tx = pool.begin().await?;
        if !Routine::lock(&mut *tx, routine_id).await? {
            return Err(RoutinePeriodError::RoutineNotFound(routine_id));
        }

        let active = RoutinePeriod::find_active_by_routine(&mut *tx, routine_id).await?;
        if let Some(current) = active.iter().find(|p| p.contains(now)) {
            return Err(RoutinePeriodError::PeriodAlreadyActive {
                period_id: current.id,
            });
        }
        if routine.recurrence_mode == RecurrenceMode::OnCompletion {
            if let Some(newest) = active.first() {
                let pending = RoutineCheckin::find_by_period(&mut *tx, newest.id).await?;
                let summary = CompletionSummary::from_checkins(&pending);
                // a period without checkins has nothing to wait for
                if summary.total > 0 && !summary.is_complete() {
                    return Err(RoutinePeriodError::PeriodAwaitingCompletion {
                        period_id: newest.id,
                    });
                }
            }
        }
        let deactivated = RoutinePeriod::deactivate_all_for_routine(&mut *tx, routine_id).await?;

        let opened = insert_period(&mut tx, routine_id, &window, &checkins).await?;
        tx.commit().await?;

        info!(
            routine_id = %routine_id,
            period_id = %opened.period.id,
            deactivated,
            checkins = opened.checkins.len(),
            "Started routine period"
        );
        Ok(opened)
    }

    /// Replace the active periods of `routine` with a new one for `window`, provided
    /// `expected` is still its newest active period and `still_due` holds for its current
    /// checkins. The state is re-read under the write lock; `None` means it changed since
    /// the caller looked and nothing was written.
    pub async fn roll_over<F>(
        pool: &SqlitePool,
        routine: &Routine,
        expected: Uuid,
        window: &PeriodWindow<Utc>,
        still_due: F,
    ) -> Result<Option<OpenedPeriod>, RoutinePeriodError>
    where
        F: FnOnce(&RoutinePeriod, &CompletionSummary) -> bool,
    {
        let checkins = Self::applicable_checkins(pool, routine).await?;
        let mut tx = pool.begin().await?;
        if !Routine::lock(&mut *tx, routine.id).await? {
            return Ok(None);
        }

        let active = RoutinePeriod::find_active_by_routine(&mut *tx, routine.id).await?;
        let Some(newest) = active.first().filter(|p| p.id == expected) else {
            debug!(routine_id = %routine.id, period_id = %expected, "Period superseded; skipping rollover");
            return Ok(None);
        };
        if active.iter().any(|p| p.contains(window.start)) {
            debug!(routine_id = %routine.id, "Window already covered; skipping rollover");
            return Ok(None);
        }
        let current = RoutineCheckin::find_by_period(&mut *tx, newest.id).await?;
        if !still_due(newest, &CompletionSummary::from_checkins(&current)) {
            debug!(routine_id = %routine.id, period_id = %expected, "Period no longer due; skipping rollover");
            return Ok(None);
        }

        let closed = RoutinePeriod::deactivate_all_for_routine(&mut *tx, routine.id).await?;
        let opened = insert_period(&mut tx, routine.id, window, &checkins).await?;
        tx.commit().await?;

        info!(
            routine_id = %routine.id,
            period_id = %opened.period.id,
            deactivated = closed,
            "Rolled routine over to a new period"
        );
        Ok(Some(opened))
    }

    pub async fn period_progress(
        pool: &SqlitePool,
        period: RoutinePeriod,
    ) -> Result<PeriodWithProgress, sqlx::Error> {
        let checkins = RoutineCheckin::find_by_period(pool, period.id).await?;
        Ok(PeriodWithProgress {
            summary: CompletionSummary::from_checkins(&checkins),
            period,
        })
    }

    /// Routine cards with the completion of their active period.
    pub async fn list_with_progress(
        pool: &SqlitePool,
        include_inactive: bool,
    ) -> Result<Vec<RoutineWithProgress>, sqlx::Error> {
        let routines = Routine::find_all(pool, include_inactive).await?;
        let mut cards = Vec::with_capacity(routines.len());
        for routine in routines {
            let active_period = RoutinePeriod::find_active_by_routine(pool, routine.id)
                .await?
                .into_iter()
                .next();
            let summary = match &active_period {
                Some(period) => {
                    let checkins = RoutineCheckin::find_by_period(pool, period.id).await?;
                    CompletionSummary::from_checkins(&checkins)
                }
                None => CompletionSummary::empty(),
            };
            cards.push(RoutineWithProgress {
                routine,
                active_period,
                summary,
            });
        }
        debug!(count = cards.len(), "Loaded routine cards");
        Ok(cards)
    }

    pub async fn routine_detail(
        pool: &SqlitePool,
        routine_id: Uuid,
    ) -> Result<Option<RoutineDetail>, sqlx::Error> {
        let Some(routine) = Routine::find_by_id(pool, routine_id).await? else {
            return Ok(None);
        };
        let unit_ids = Routine::find_unit_ids(pool, routine_id).await?;
        let assignee_ids = Routine::find_assignee_ids(pool, routine_id).await?;
        let active_period = RoutinePeriod::find_active_by_routine(pool, routine_id)
            .await?
            .into_iter()
            .next();
        let checkins = match &active_period {
            Some(period) => RoutineCheckin::find_by_period_with_unit(pool, period.id).await?,
            None => Vec::new(),
        };
        let summary = CompletionSummary::from_checkins(checkins.iter().map(|c| &c.checkin));

        Ok(Some(RoutineDetail {
            routine,
            unit_ids,
            assignee_ids,
            active_period,
            checkins,
            summary,
        }))
    }

    /// Every period of a routine, newest first, with its completion.
    pub async fn history(
        pool: &SqlitePool,
        routine_id: Uuid,
    ) -> Result<Vec<PeriodWithProgress>, sqlx::Error> {
        let periods = RoutinePeriod::find_by_routine(pool, routine_id).await?;
        let mut history = Vec::with_capacity(periods.len());
        for period in periods {
            history.push(Self::period_progress(pool, period).await?);
        }
        Ok(history)
    }
}

async fn insert_period(
    conn: &mut SqliteConnection,
    routine_id: Uuid,
    window: &PeriodWindow<Utc>,
    checkins: &[NewCheckin],
) -> Result<OpenedPeriod, sqlx::Error> {
    let period = RoutinePeriod::create(
        &mut *conn,
        Uuid::new_v4(),
        routine_id,
        window.start,
        window.end,
    )
    .await?;

    let mut created = Vec::with_capacity(checkins.len());
    for checkin in checkins {
        created.push(RoutineCheckin::create(&mut *conn, Uuid::new_v4(), period.id, checkin).await?);
    }

    Ok(OpenedPeriod {
        period,
        checkins: created,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;
    use db::{
        DBService,
        models::{
            routine::{CreateRoutine, Frequency},
            sector::{CreateSector, Sector},
            unit::CreateUnit,
        },
    };

    use super::*;
    use crate::services::completion::CompletionBucket;

    pub(crate) async fn seed_units(pool: &SqlitePool, names: &[&str]) -> Vec<Unit> {
        let mut units = Vec::new();
        for name in names {
            let data = CreateUnit {
                name: name.to_string(),
                code: None,
                parent_id: None,
                sector_id: None,
            };
            units.push(Unit::create(pool, &data, Uuid::new_v4()).await.unwrap());
        }
        units
    }

    pub(crate) async fn seed_routine(pool: &SqlitePool, frequency: Frequency) -> Routine {
        seed_routine_in_mode(pool, frequency, RecurrenceMode::Schedule).await
    }

    pub(crate) async fn seed_routine_in_mode(
        pool: &SqlitePool,
        frequency: Frequency,
        mode: RecurrenceMode,
    ) -> Routine {
        let data = CreateRoutine {
            title: "Conferência de estoque".to_string(),
            description: None,
            frequency: Some(frequency),
            recurrence_mode: Some(mode),
            unit_id: None,
            sector_id: None,
            unit_ids: None,
            assignee_ids: None,
        };
        Routine::create(pool, &data, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap()
    }

    fn wednesday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_expand_checkins_without_assignees() {
        let units = [Uuid::new_v4(), Uuid::new_v4()];
        let checkins = expand_checkins(&units, &[]);
        assert_eq!(checkins.len(), 2);
        assert!(checkins.iter().all(|c| c.assignee_user_id.is_none()));
    }

    #[test]
    fn test_expand_checkins_per_assignee() {
        let units = [Uuid::new_v4(), Uuid::new_v4()];
        let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let checkins = expand_checkins(&units, &users);
        assert_eq!(checkins.len(), 6);
        assert_eq!(checkins[0].unit_id, units[0]);
        assert_eq!(checkins[2].assignee_user_id, Some(users[2]));
    }

    #[tokio::test]
    async fn test_start_period_creates_checkin_per_leaf_unit() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["Loja Centro", "Loja Norte", "Loja Sul"]).await;
        let routine = seed_routine(&db.pool, Frequency::Semanal).await;

        let opened = RoutinePeriodService::start_current_period(
            &db.pool,
            routine.id,
            wednesday_noon(),
            chrono_tz::America::Sao_Paulo,
        )
        .await
        .unwrap();

        assert_eq!(opened.checkins.len(), 3);
        let history = RoutinePeriodService::history(&db.pool, routine.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].summary.percentage, 0);
        assert_eq!(history[0].summary.bucket, CompletionBucket::Danger);

        // Monday 2025-03-10 00:00 in São Paulo is 03:00 UTC
        assert_eq!(
            opened.period.period_start,
            Utc.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_partial_completion_rounds_to_67_percent() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A", "B", "C"]).await;
        let routine = seed_routine(&db.pool, Frequency::Semanal).await;
        let opened = RoutinePeriodService::start_current_period(
            &db.pool,
            routine.id,
            wednesday_noon(),
            chrono_tz::America::Sao_Paulo,
        )
        .await
        .unwrap();

        for checkin in opened.checkins.iter().take(2) {
            RoutineCheckin::mark_completed(&db.pool, checkin.id, Uuid::new_v4(), Utc::now(), None)
                .await
                .unwrap();
        }

        let cards = RoutinePeriodService::list_with_progress(&db.pool, false)
            .await
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].summary.completed, 2);
        assert_eq!(cards[0].summary.percentage, 67);
        assert_eq!(cards[0].summary.bucket, CompletionBucket::Warning);

        let detail = RoutinePeriodService::routine_detail(&db.pool, routine.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(detail.summary, cards[0].summary);
    }

    #[tokio::test]
    async fn test_starting_twice_in_same_window_conflicts() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let tz = chrono_tz::America::Sao_Paulo;

        let first = RoutinePeriodService::start_current_period(&db.pool, routine.id, wednesday_noon(), tz)
            .await
            .unwrap();
        let second =
            RoutinePeriodService::start_current_period(&db.pool, routine.id, wednesday_noon(), tz).await;

        match second {
            Err(RoutinePeriodError::PeriodAlreadyActive { period_id }) => {
                assert_eq!(period_id, first.period.id)
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_starting_next_day_deactivates_previous_period() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let tz = chrono_tz::America::Sao_Paulo;

        let first = RoutinePeriodService::start_current_period(&db.pool, routine.id, wednesday_noon(), tz)
            .await
            .unwrap();
        let next_day = wednesday_noon() + chrono::Duration::days(1);
        let second = RoutinePeriodService::start_current_period(&db.pool, routine.id, next_day, tz)
            .await
            .unwrap();

        let active = RoutinePeriod::find_active_by_routine(&db.pool, routine.id)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.period.id);
        let old = RoutinePeriod::find_by_id(&db.pool, first.period.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!old.is_active);
    }

    #[tokio::test]
    async fn test_open_period_has_no_duplicate_guard() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A", "B"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let window = current_window(&routine, wednesday_noon(), chrono_tz::America::Sao_Paulo);

        RoutinePeriodService::open_period(&db.pool, &routine, &window)
            .await
            .unwrap();
        RoutinePeriodService::open_period(&db.pool, &routine, &window)
            .await
            .unwrap();

        let periods = RoutinePeriod::find_by_routine(&db.pool, routine.id).await.unwrap();
        assert_eq!(periods.len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_routine_only_checks_its_unit() {
        let db = DBService::new_in_memory().await.unwrap();
        let units = seed_units(&db.pool, &["A", "B", "C"]).await;
        let data = CreateRoutine {
            title: "Limpeza".to_string(),
            description: None,
            frequency: Some(Frequency::Diaria),
            recurrence_mode: None,
            unit_id: Some(units[1].id),
            sector_id: None,
            unit_ids: None,
            assignee_ids: Some(vec![Uuid::new_v4(), Uuid::new_v4()]),
        };
        let routine = Routine::create(&db.pool, &data, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        let checkins = RoutinePeriodService::applicable_checkins(&db.pool, &routine)
            .await
            .unwrap();
        assert_eq!(checkins.len(), 2);
        assert!(checkins.iter().all(|c| c.unit_id == units[1].id));
    }

    #[tokio::test]
    async fn test_missing_and_inactive_routines_are_rejected() {
        let db = DBService::new_in_memory().await.unwrap();
        let tz = chrono_tz::America::Sao_Paulo;
        let missing =
            RoutinePeriodService::start_current_period(&db.pool, Uuid::new_v4(), Utc::now(), tz).await;
        assert!(matches!(missing, Err(RoutinePeriodError::RoutineNotFound(_))));

        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        Routine::soft_delete(&db.pool, routine.id).await.unwrap();
        let inactive =
            RoutinePeriodService::start_current_period(&db.pool, routine.id, Utc::now(), tz).await;
        assert!(matches!(inactive, Err(RoutinePeriodError::RoutineInactive(_))));
    }

    #[tokio::test]
    async fn test_explicit_units_override_leaf_default() {
        let db = DBService::new_in_memory().await.unwrap();
        let units = seed_units(&db.pool, &["A", "B", "C"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        Routine::set_unit_ids(&db.pool, routine.id, &[units[0].id, units[2].id])
            .await
            .unwrap();
        Unit::soft_delete(&db.pool, units[2].id).await.unwrap();

        let unit_ids = RoutinePeriodService::applicable_unit_ids(&db.pool, &routine)
            .await
            .unwrap();
        assert_eq!(unit_ids, vec![units[0].id]);
    }

    #[tokio::test]
    async fn test_sector_routine_uses_leaves_of_its_sector() {
        let db = DBService::new_in_memory().await.unwrap();
        let sector = Sector::create(
            &db.pool,
            &CreateSector {
                name: "Operações".to_string(),
                description: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let unit = |name: &str, parent_id: Option<Uuid>, sector_id: Option<Uuid>| CreateUnit {
            name: name.to_string(),
            code: None,
            parent_id,
            sector_id,
        };
        let gerencia = Unit::create(&db.pool, &unit("Gerência", None, Some(sector.id)), Uuid::new_v4())
            .await
            .unwrap();
        let north = Unit::create(
            &db.pool,
            &unit("Loja Norte", Some(gerencia.id), Some(sector.id)),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let south = Unit::create(&db.pool, &unit("Loja Sul", None, Some(sector.id)), Uuid::new_v4())
            .await
            .unwrap();
        Unit::create(&db.pool, &unit("Matriz", None, None), Uuid::new_v4())
            .await
            .unwrap();

        let data = CreateRoutine {
            title: "Fechamento".to_string(),
            description: None,
            frequency: Some(Frequency::Diaria),
            recurrence_mode: None,
            unit_id: None,
            sector_id: Some(sector.id),
            unit_ids: None,
            assignee_ids: None,
        };
        let routine = Routine::create(&db.pool, &data, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        let unit_ids = RoutinePeriodService::applicable_unit_ids(&db.pool, &routine)
            .await
            .unwrap();
        assert_eq!(unit_ids, vec![north.id, south.id]);
    }

    #[tokio::test]
    async fn test_stale_rollover_keeps_period_started_meanwhile() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A", "B"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let tz = chrono_tz::UTC;
        let yesterday = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let now = yesterday + chrono::Duration::days(1);

        // the scheduler saw this period as due ...
        let old = RoutinePeriodService::start_current_period(&db.pool, routine.id, yesterday, tz)
            .await
            .unwrap();
        // ... but a user started today's period before it acted
        let started = RoutinePeriodService::start_current_period(&db.pool, routine.id, now, tz)
            .await
            .unwrap();
        RoutineCheckin::mark_completed(&db.pool, started.checkins[0].id, Uuid::new_v4(), now, None)
            .await
            .unwrap();

        let window = current_window(&routine, now, tz);
        let rolled =
            RoutinePeriodService::roll_over(&db.pool, &routine, old.period.id, &window, |_, _| true)
                .await
                .unwrap();
        assert!(rolled.is_none());

        let active = RoutinePeriod::find_active_by_routine(&db.pool, routine.id)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, started.period.id);
        let covering_today = RoutinePeriod::find_by_routine(&db.pool, routine.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.contains(now))
            .count();
        assert_eq!(covering_today, 1);
    }

    #[tokio::test]
    async fn test_rollover_rechecks_completion_under_lock() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A", "B"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let tz = chrono_tz::UTC;
        let yesterday = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let now = yesterday + chrono::Duration::days(1);
        let old = RoutinePeriodService::start_current_period(&db.pool, routine.id, yesterday, tz)
            .await
            .unwrap();

        let window = current_window(&routine, now, tz);
        let rolled = RoutinePeriodService::roll_over(
            &db.pool,
            &routine,
            old.period.id,
            &window,
            |_, summary| summary.is_complete(),
        )
        .await
        .unwrap();
        assert!(rolled.is_none());
        let active = RoutinePeriod::find_active_by_routine(&db.pool, routine.id)
            .await
            .unwrap();
        assert_eq!(active[0].id, old.period.id);

        let rolled =
            RoutinePeriodService::roll_over(&db.pool, &routine, old.period.id, &window, |_, _| true)
                .await
                .unwrap()
                .unwrap();
        assert!(rolled.period.contains(now));
    }

    #[tokio::test]
    async fn test_on_completion_start_waits_for_pending_checkins() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A"]).await;
        let routine =
            seed_routine_in_mode(&db.pool, Frequency::Diaria, RecurrenceMode::OnCompletion).await;
        let tz = chrono_tz::UTC;
        let yesterday = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let now = yesterday + chrono::Duration::days(1);
        let first = RoutinePeriodService::start_current_period(&db.pool, routine.id, yesterday, tz)
            .await
            .unwrap();

        let refused = RoutinePeriodService::start_current_period(&db.pool, routine.id, now, tz).await;
        match refused {
            Err(RoutinePeriodError::PeriodAwaitingCompletion { period_id }) => {
                assert_eq!(period_id, first.period.id)
            }
            other => panic!("expected pending checkins to block, got {other:?}"),
        }
        let still = RoutinePeriod::find_by_id(&db.pool, first.period.id)
            .await
            .unwrap()
            .unwrap();
        assert!(still.is_active);

        RoutineCheckin::mark_completed(&db.pool, first.checkins[0].id, Uuid::new_v4(), now, None)
            .await
            .unwrap();
        let opened = RoutinePeriodService::start_current_period(&db.pool, routine.id, now, tz)
            .await
            .unwrap();
        assert!(opened.period.contains(now));
    }
}
