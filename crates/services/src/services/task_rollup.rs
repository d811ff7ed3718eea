//! Parent tasks summarise the progress of their subtasks.

use chrono::{DateTime, Utc};
use db::models::task::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

use super::completion::{CompletionBucket, completion_percentage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct TaskRollup {
    /// Children that count: cancelled and not-applicable ones are left out
    pub total: usize,
    pub completed: usize,
    pub percentage: u8,
    pub bucket: CompletionBucket,
    pub derived_status: TaskStatus,
}

impl TaskRollup {
    pub fn from_children(children: &[Task], now: DateTime<Utc>) -> Self {
        let counted: Vec<TaskStatus> = children
            .iter()
            .filter(|child| !child.status.is_excluded_from_progress())
            .map(|child| child.effective_status(now))
            .collect();

        let total = counted.len();
        let completed = counted
            .iter()
            .filter(|status| **status == TaskStatus::Concluida)
            .count();
        let percentage = completion_percentage(completed, total);

        let derived_status = if total > 0 && completed == total {
            TaskStatus::Concluida
        } else if counted.contains(&TaskStatus::Atrasada) {
            TaskStatus::Atrasada
        } else if completed > 0 || counted.contains(&TaskStatus::EmAndamento) {
            TaskStatus::EmAndamento
        } else {
            TaskStatus::Pendente
        };

        Self {
            total,
            completed,
            percentage,
            bucket: CompletionBucket::from_percentage(percentage),
            derived_status,
        }
    }
}

/// A task as shown on its detail page.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskDetail {
    #[serde(flatten)]
    #[ts(flatten)]
    pub task: Task,
    pub effective_status: TaskStatus,
    pub children: Vec<Task>,
    /// Present only for tasks that have subtasks
    pub rollup: Option<TaskRollup>,
}

pub async fn task_detail(
    pool: &SqlitePool,
    task_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<TaskDetail>, sqlx::Error> {
    let Some(task) = Task::find_by_id(pool, task_id).await? else {
        return Ok(None);
    };
    let children = Task::find_children(pool, task_id).await?;
    let rollup = (!children.is_empty()).then(|| TaskRollup::from_children(&children, now));
    Ok(Some(TaskDetail {
        effective_status: task.effective_status(now),
        task,
        children,
        rollup,
    }))
}
