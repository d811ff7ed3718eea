//! Task completion grouped by unit, responsible, sector or frequency.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use db::models::task::{DashboardTaskRow, Task, TaskFilter, TaskStatus};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::completion::{CompletionBucket, completion_percentage};

/// Label of the frequency group for tasks not generated by a routine.
pub const ONE_OFF_LABEL: &str = "avulsa";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Unit,
    Responsible,
    Sector,
    Frequency,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct DashboardQuery {
    #[serde(default)]
    pub group_by: GroupBy,
    pub sector_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    /// Inclusive lower bound on `due_date`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `due_date`
    pub to: Option<DateTime<Utc>>,
}

impl DashboardQuery {
    /// Cache scope for this query evaluated at `now`. Overdue counts depend on the clock, so
    /// the scope changes every minute and a cached report is never older than that.
    pub fn cache_scope(&self, now: DateTime<Utc>) -> String {
        let query = serde_json::to_string(self).unwrap_or_default();
        format!("{query}@{}", now.format("%Y-%m-%dT%H:%M"))
    }

    fn task_filter(&self) -> TaskFilter {
        TaskFilter {
            sector_id: self.sector_id,
            unit_id: self.unit_id,
            ..Default::default()
        }
    }

    fn in_range(&self, task: &Task) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(due) = task.due_date else {
            return false;
        };
        self.from.is_none_or(|from| due >= from) && self.to.is_none_or(|to| due <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct DashboardGroup {
    /// Unit, sector or user id; the frequency name when grouping by frequency
    pub key: Option<String>,
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub overdue: usize,
    pub percentage: u8,
    pub bucket: CompletionBucket,
}

impl DashboardGroup {
    fn new(key: Option<String>, label: String) -> Self {
        Self {
            key,
            label,
            total: 0,
            completed: 0,
            in_progress: 0,
            pending: 0,
            overdue: 0,
            percentage: 0,
            bucket: CompletionBucket::Danger,
        }
    }

    fn count(&mut self, status: TaskStatus) {
        if status.is_excluded_from_progress() {
            return;
        }
        self.total += 1;
        match status {
            TaskStatus::Concluida => self.completed += 1,
            TaskStatus::EmAndamento => self.in_progress += 1,
            TaskStatus::Atrasada => self.overdue += 1,
            _ => self.pending += 1,
        }
    }

    fn finish(mut self) -> Self {
        self.percentage = completion_percentage(self.completed, self.total);
        self.bucket = CompletionBucket::from_percentage(self.percentage);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct DashboardReport {
    pub group_by: GroupBy,
    pub groups: Vec<DashboardGroup>,
    pub overall: DashboardGroup,
}

fn group_key(row: &DashboardTaskRow, group_by: GroupBy) -> (Option<String>, String) {
    match group_by {
        GroupBy::Unit => (
            row.unit_id.map(|id| id.to_string()),
            row.unit_name.clone().unwrap_or_else(|| "Sem unidade".to_string()),
        ),
        GroupBy::Sector => (
            row.sector_id.map(|id| id.to_string()),
            row.sector_name.clone().unwrap_or_else(|| "Sem setor".to_string()),
        ),
        GroupBy::Responsible => match row.assigned_to {
            Some(user) => (Some(user.to_string()), user.to_string()),
            None => (None, "Sem responsável".to_string()),
        },
        GroupBy::Frequency => match (row.routine_id, row.frequency) {
            (Some(_), Some(frequency)) => (Some(frequency.to_string()), frequency.to_string()),
            _ => (Some(ONE_OFF_LABEL.to_string()), ONE_OFF_LABEL.to_string()),
        },
    }
}

/// Group dashboard rows. Roll-up parents are skipped; their children are counted instead.
pub fn aggregate(rows: &[DashboardTaskRow], query: &DashboardQuery, now: DateTime<Utc>) -> DashboardReport {
    let mut groups: BTreeMap<(String, Option<String>), DashboardGroup> = BTreeMap::new();
    let mut overall = DashboardGroup::new(None, "Total".to_string());

    for row in rows
        .iter()
        .filter(|row| !row.has_children)
        .filter(|row| query.in_range(&row.task))
    {
        let status = row.effective_status(now);
        let (key, label) = group_key(row, query.group_by);
        groups
            .entry((label.clone(), key.clone()))
            .or_insert_with(|| DashboardGroup::new(key, label))
            .count(status);
        overall.count(status);
    }

    DashboardReport {
        group_by: query.group_by,
        groups: groups.into_values().map(DashboardGroup::finish).collect(),
        overall: overall.finish(),
    }
}

pub async fn dashboard(
    pool: &SqlitePool,
    query: &DashboardQuery,
    now: DateTime<Utc>,
) -> Result<DashboardReport, sqlx::Error> {
    let rows = Task::find_dashboard_rows(pool, &query.task_filter()).await?;
    Ok(aggregate(&rows, query, now))
}
