//! Completion percentage and colour bucket shared by routine cards, period details and
//! dashboard groups.

use db::models::routine_checkin::RoutineCheckin;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use ts_rs::TS;

/// `completed / total` as a whole percentage, rounded half up. An empty set is 0%.
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    ((completed * 200 + total) / (total * 2)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompletionBucket {
    /// 100%
    Success,
    /// 70% to 99%
    Good,
    /// 40% to 69%
    Warning,
    /// below 40%
    Danger,
}

impl CompletionBucket {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            100.. => CompletionBucket::Success,
            70..=99 => CompletionBucket::Good,
            40..=69 => CompletionBucket::Warning,
            _ => CompletionBucket::Danger,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct CompletionSummary {
    pub total: usize,
    pub completed: usize,
    pub percentage: u8,
    pub bucket: CompletionBucket,
}

impl CompletionSummary {
    pub fn from_counts(completed: usize, total: usize) -> Self {
        let percentage = completion_percentage(completed, total);
        Self {
            total,
            completed: completed.min(total),
            percentage,
            bucket: CompletionBucket::from_percentage(percentage),
        }
    }

    pub fn from_checkins<'a, I>(checkins: I) -> Self
    where
        I: IntoIterator<Item = &'a RoutineCheckin>,
    {
        let (completed, total) = checkins
            .into_iter()
            .fold((0, 0), |(completed, total), checkin| {
                (completed + usize::from(checkin.is_completed()), total + 1)
            });
        Self::from_counts(completed, total)
    }

    pub fn empty() -> Self {
        Self::from_counts(0, 0)
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::routine_checkin::CheckinStatus;
    use uuid::Uuid;

    use super::*;

    fn checkin(completed: bool) -> RoutineCheckin {
        RoutineCheckin {
            id: Uuid::new_v4(),
            routine_period_id: Uuid::nil(),
            unit_id: Uuid::new_v4(),
            assignee_user_id: None,
            status: if completed {
                CheckinStatus::Concluido
            } else {
                CheckinStatus::Pendente
            },
            completed_at: completed.then(Utc::now),
            completed_by: completed.then(Uuid::new_v4),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_rounds_to_nearest() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(0, 3), 0);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 8), 13); // 12.5 rounds up
        assert_eq!(completion_percentage(3, 3), 100);
    }

    #[test]
    fn test_bucket_thresholds() {
        assert_eq!(CompletionBucket::from_percentage(100), CompletionBucket::Success);
        assert_eq!(CompletionBucket::from_percentage(99), CompletionBucket::Good);
        assert_eq!(CompletionBucket::from_percentage(70), CompletionBucket::Good);
        assert_eq!(CompletionBucket::from_percentage(69), CompletionBucket::Warning);
        assert_eq!(CompletionBucket::from_percentage(40), CompletionBucket::Warning);
        assert_eq!(CompletionBucket::from_percentage(39), CompletionBucket::Danger);
        assert_eq!(CompletionBucket::from_percentage(0), CompletionBucket::Danger);
    }

    #[test]
    fn test_summary_is_order_independent() {
        let mut checkins: Vec<RoutineCheckin> = [true, false, true, false, false, true, true]
            .into_iter()
            .map(checkin)
            .collect();
        let before = CompletionSummary::from_checkins(&checkins);
        checkins.reverse();
        checkins.rotate_left(3);
        let after = CompletionSummary::from_checkins(&checkins);

        assert_eq!(before, after);
        assert_eq!(before.completed, 4);
        assert_eq!(before.percentage, 57);
        assert_eq!(before.bucket, CompletionBucket::Warning);
    }

    #[test]
    fn test_empty_summary_is_not_complete() {
        let summary = CompletionSummary::empty();
        assert_eq!(summary.percentage, 0);
        assert_eq!(summary.bucket, CompletionBucket::Danger);
        assert!(!summary.is_complete());
    }
}
