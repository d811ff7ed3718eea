//! Background service that rolls recurring routines over to their next period.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use db::{
    DBService,
    models::{
        routine::{RecurrenceMode, Routine},
        routine_checkin::RoutineCheckin,
        routine_period::RoutinePeriod,
    },
};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    completion::CompletionSummary,
    routine_period::{RoutinePeriodError, RoutinePeriodService, current_window},
};

#[derive(Debug, Error)]
pub enum RoutineSchedulerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Period(#[from] RoutinePeriodError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    Keep,
    Next,
}

/// Whether the active period of a routine should be closed and replaced.
pub fn decide_rollover(
    mode: RecurrenceMode,
    period: &RoutinePeriod,
    summary: &CompletionSummary,
    now: DateTime<Utc>,
) -> Rollover {
    let ended = period.period_end < now;
    let ready = match mode {
        RecurrenceMode::Schedule => ended,
        RecurrenceMode::OnCompletion => ended && summary.is_complete(),
    };
    if ready { Rollover::Next } else { Rollover::Keep }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub examined: usize,
    pub rolled_over: usize,
    pub failed: usize,
}

pub struct RoutineSchedulerService {
    db: DBService,
    poll_interval: Duration,
    timezone: Tz,
}

impl RoutineSchedulerService {
    pub async fn spawn(
        db: DBService,
        poll_interval: Duration,
        timezone: Tz,
    ) -> tokio::task::JoinHandle<()> {
        let service = Self {
            db,
            poll_interval,
            timezone,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting routine scheduler with interval {:?} in {:?}",
            self.poll_interval, self.timezone
        );

        let mut interval = interval(self.poll_interval);
        loop {
            interval.tick().await;
            match Self::run_once(&self.db.pool, Utc::now(), self.timezone).await {
                Ok(report) if report.rolled_over > 0 || report.failed > 0 => {
                    info!(
                        examined = report.examined,
                        rolled_over = report.rolled_over,
                        failed = report.failed,
                        "Routine scheduler pass finished"
                    );
                }
                Ok(_) => debug!("Routine scheduler: nothing to roll over"),
                Err(e) => error!("Error running routine scheduler: {}", e),
            }
        }
    }

    /// One pass over every active period of every active routine.
    pub async fn run_once(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<SchedulerReport, RoutineSchedulerError> {
        let periods = RoutinePeriod::find_all_active(pool).await?;

        // Newest active period per routine
        let mut latest: HashMap<Uuid, RoutinePeriod> = HashMap::new();
        for period in periods {
            match latest.get(&period.routine_id) {
                Some(existing) if existing.period_start > period.period_start => {}
                _ => {
                    latest.insert(period.routine_id, period);
                }
            }
        }

        let mut report = SchedulerReport::default();
        for (routine_id, period) in latest {
            report.examined += 1;
            match Self::process_routine(pool, routine_id, &period, now, tz).await {
                Ok(true) => report.rolled_over += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        routine_id = %routine_id,
                        period_id = %period.id,
                        error = %e,
                        "Failed to roll routine over"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn process_routine(
        pool: &SqlitePool,
        routine_id: Uuid,
        period: &RoutinePeriod,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<bool, RoutineSchedulerError> {
        let Some(routine) = Routine::find_by_id(pool, routine_id).await? else {
            return Ok(false);
        };
        let checkins = RoutineCheckin::find_by_period(pool, period.id).await?;
        let summary = CompletionSummary::from_checkins(&checkins);

        if decide_rollover(routine.recurrence_mode, period, &summary, now) == Rollover::Keep {
            return Ok(false);
        }

        let window = current_window(&routine, now, tz);
        let mode = routine.recurrence_mode;
        let opened = RoutinePeriodService::roll_over(
            pool,
            &routine,
            period.id,
            &window,
            |current, summary| decide_rollover(mode, current, summary, now) == Rollover::Next,
        )
        .await?;
        let Some(opened) = opened else {
            return Ok(false);
        };
        debug!(
            routine_id = %routine_id,
            previous_period_id = %period.id,
            period_id = %opened.period.id,
            "Scheduler opened next period"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use db::models::routine::{CreateRoutine, Frequency, UpdateRoutine};

    use super::*;
    use crate::services::routine_period::tests::{seed_routine, seed_units};

    fn period_ending(end: DateTime<Utc>) -> RoutinePeriod {
        RoutinePeriod {
            id: Uuid::new_v4(),
            routine_id: Uuid::new_v4(),
            period_start: end - chrono::Duration::days(1),
            period_end: end,
            is_active: true,
            created_at: end - chrono::Duration::days(1),
        }
    }

    #[test]
    fn test_schedule_mode_rolls_over_after_end() {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 12, 0, 0).unwrap();
        let pending = CompletionSummary::from_counts(0, 3);

        let ended = period_ending(now - chrono::Duration::hours(1));
        let running = period_ending(now + chrono::Duration::hours(1));

        assert_eq!(decide_rollover(RecurrenceMode::Schedule, &ended, &pending, now), Rollover::Next);
        assert_eq!(decide_rollover(RecurrenceMode::Schedule, &running, &pending, now), Rollover::Keep);
    }

    #[test]
    fn test_on_completion_waits_for_every_checkin() {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 12, 0, 0).unwrap();
        let ended = period_ending(now - chrono::Duration::hours(1));
        let running = period_ending(now + chrono::Duration::hours(1));
        let partial = CompletionSummary::from_counts(2, 3);
        let complete = CompletionSummary::from_counts(3, 3);

        let mode = RecurrenceMode::OnCompletion;
        assert_eq!(decide_rollover(mode, &ended, &partial, now), Rollover::Keep);
        assert_eq!(decide_rollover(mode, &running, &complete, now), Rollover::Keep);
        assert_eq!(decide_rollover(mode, &ended, &complete, now), Rollover::Next);
    }

    #[tokio::test]
    async fn test_run_once_rolls_ended_schedule_period() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A", "B"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;
        let tz = chrono_tz::UTC;
        let yesterday = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let first = RoutinePeriodService::start_current_period(&db.pool, routine.id, yesterday, tz)
            .await
            .unwrap();

        let now = yesterday + chrono::Duration::days(1);
        let report = RoutineSchedulerService::run_once(&db.pool, now, tz).await.unwrap();
        assert_eq!(report.rolled_over, 1);

        let active = RoutinePeriod::find_active_by_routine(&db.pool, routine.id)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, first.period.id);
        assert!(active[0].contains(now));

        let again = RoutineSchedulerService::run_once(&db.pool, now, tz).await.unwrap();
        assert_eq!(again.rolled_over, 0);
    }

    #[tokio::test]
    async fn test_run_once_leaves_routines_without_periods_alone() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A"]).await;
        let routine = seed_routine(&db.pool, Frequency::Diaria).await;

        let report = RoutineSchedulerService::run_once(&db.pool, Utc::now(), chrono_tz::UTC)
            .await
            .unwrap();
        assert_eq!(report, SchedulerReport::default());
        let periods = RoutinePeriod::find_by_routine(&db.pool, routine.id).await.unwrap();
        assert!(periods.is_empty());
    }

    #[tokio::test]
    async fn test_on_completion_routine_keeps_incomplete_period() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_units(&db.pool, &["A"]).await;
        let data = CreateRoutine {
            title: "Inventário".to_string(),
            description: None,
            frequency: Some(Frequency::Diaria),
            recurrence_mode: Some(RecurrenceMode::OnCompletion),
            unit_id: None,
            sector_id: None,
            unit_ids: None,
            assignee_ids: None,
        };
        let routine = Routine::create(&db.pool, &data, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        let tz = chrono_tz::UTC;
        let yesterday = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let first = RoutinePeriodService::start_current_period(&db.pool, routine.id, yesterday, tz)
            .await
            .unwrap();
        let now = yesterday + chrono::Duration::days(1);

        let report = RoutineSchedulerService::run_once(&db.pool, now, tz).await.unwrap();
        assert_eq!(report.rolled_over, 0);

        RoutineCheckin::mark_completed(&db.pool, first.checkins[0].id, Uuid::new_v4(), now, None)
            .await
            .unwrap();
        let report = RoutineSchedulerService::run_once(&db.pool, now, tz).await.unwrap();
        assert_eq!(report.rolled_over, 1);

        // switching the routine to schedule mode makes plain expiry enough
        Routine::update(
            &db.pool,
            routine.id,
            &UpdateRoutine {
                recurrence_mode: Some(RecurrenceMode::Schedule),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let later = now + chrono::Duration::days(1);
        let report = RoutineSchedulerService::run_once(&db.pool, later, tz).await.unwrap();
        assert_eq!(report.rolled_over, 1);
    }
}
