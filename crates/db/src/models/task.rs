use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::routine::Frequency;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pendente,
    EmAndamento,
    Concluida,
    Atrasada,
    Cancelada,
    NaoAplicavel,
}

impl TaskStatus {
    /// Statuses that take a task out of completion counts.
    pub fn is_excluded_from_progress(&self) -> bool {
        matches!(self, TaskStatus::Cancelada | TaskStatus::NaoAplicavel)
    }

    /// Statuses a due date can no longer turn into `Atrasada`.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TaskStatus::Concluida | TaskStatus::Cancelada | TaskStatus::NaoAplicavel
        )
    }
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Baixa,
    #[default]
    Media,
    Alta,
    Urgente,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub routine_id: Option<Uuid>, // Generated from a routine; inherits its frequency
    pub unit_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Status as shown to users: an open task past its due date counts as overdue.
    pub fn effective_status(&self, now: DateTime<Utc>) -> TaskStatus {
        match self.due_date {
            Some(due) if due < now && !self.status.is_closed() => TaskStatus::Atrasada,
            _ => self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub routine_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
}

impl CreateTask {
    pub fn from_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: Some(TaskStatus::Pendente),
            priority: None,
            routine_id: None,
            unit_id: None,
            sector_id: None,
            assigned_to: None,
            parent_task_id: None,
            due_date: None,
            start_date: None,
        }
    }

    /// A child task that inherits the parent's routine, unit and sector.
    pub fn subtask_of(parent: &Task, title: impl Into<String>) -> Self {
        Self {
            routine_id: parent.routine_id,
            unit_id: parent.unit_id,
            sector_id: parent.sector_id,
            assigned_to: parent.assigned_to,
            parent_task_id: Some(parent.id),
            due_date: parent.due_date,
            ..Self::from_title(title)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub unit_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
}

/// Optional filters for task listings; every set field narrows the result.
#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub unit_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub routine_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub title: Option<String>,
}

/// Task joined with the names and routine frequency the dashboard groups on.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct DashboardTaskRow {
    #[serde(flatten)]
    #[ts(flatten)]
    #[sqlx(flatten)]
    pub task: Task,
    pub frequency: Option<Frequency>,
    pub unit_name: Option<String>,
    pub sector_name: Option<String>,
    pub has_children: bool,
}

impl std::ops::Deref for DashboardTaskRow {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.status, t.priority, t.routine_id, t.unit_id, t.sector_id, t.assigned_to, t.created_by, t.parent_task_id, t.due_date, t.start_date, t.completed_at, t.created_at, t.updated_at";

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &TaskFilter) {
    if let Some(status) = filter.status {
        builder.push(" AND t.status = ").push_bind(status);
    }
    if let Some(unit_id) = filter.unit_id {
        builder.push(" AND t.unit_id = ").push_bind(unit_id);
    }
    if let Some(sector_id) = filter.sector_id {
        builder.push(" AND t.sector_id = ").push_bind(sector_id);
    }
    if let Some(assigned_to) = filter.assigned_to {
        builder.push(" AND t.assigned_to = ").push_bind(assigned_to);
    }
    if let Some(routine_id) = filter.routine_id {
        builder.push(" AND t.routine_id = ").push_bind(routine_id);
    }
    if let Some(parent_task_id) = filter.parent_task_id {
        builder.push(" AND t.parent_task_id = ").push_bind(parent_task_id);
    }
    if let Some(title) = filter.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        builder
            .push(" AND t.title LIKE ")
            .push_bind(format!("%{}%", escape_like(title)))
            .push(" ESCAPE '\\'");
    }
}

/// Make `%` and `_` match themselves in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Task {
    pub async fn find_filtered(
        pool: &SqlitePool,
        filter: &TaskFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE 1 = 1"));
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY t.due_date IS NULL, t.due_date ASC, t.created_at DESC");
        builder.build_query_as::<Task>().fetch_all(pool).await
    }

    /// Case-insensitive title search (SQLite `LIKE` folds ASCII case).
    pub async fn find_by_title(
        pool: &SqlitePool,
        title: &str,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE 1 = 1"));
        push_filters(
            &mut builder,
            &TaskFilter {
                title: Some(title.to_string()),
                ..Default::default()
            },
        );
        builder
            .push(" ORDER BY t.created_at DESC LIMIT ")
            .push_bind(limit);
        builder.build_query_as::<Task>().fetch_all(pool).await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Direct children of a roll-up task.
    pub async fn find_children(
        pool: &SqlitePool,
        parent_task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.parent_task_id = $1 ORDER BY t.created_at ASC"
        ))
        .bind(parent_task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_dashboard_rows(
        pool: &SqlitePool,
        filter: &TaskFilter,
    ) -> Result<Vec<DashboardTaskRow>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            r#"SELECT {TASK_COLUMNS},
                      r.frequency AS frequency,
                      u.name AS unit_name,
                      s.name AS sector_name,
                      EXISTS (SELECT 1 FROM tasks c WHERE c.parent_task_id = t.id) AS has_children
               FROM tasks t
               LEFT JOIN routines r ON r.id = t.routine_id
               LEFT JOIN units u ON u.id = t.unit_id
               LEFT JOIN sectors s ON s.id = t.sector_id
               WHERE 1 = 1"#
        ));
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY t.created_at ASC");
        builder
            .build_query_as::<DashboardTaskRow>()
            .fetch_all(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTask,
        task_id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        let status = data.status.unwrap_or_default();
        let priority = data.priority.unwrap_or_default();
        let completed_at = (status == TaskStatus::Concluida).then(Utc::now);
        sqlx::query_as::<_, Task>(
            r#"INSERT INTO tasks (id, title, description, status, priority, routine_id, unit_id, sector_id, assigned_to, created_by, parent_task_id, due_date, start_date, completed_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
               RETURNING id, title, description, status, priority, routine_id, unit_id, sector_id, assigned_to, created_by, parent_task_id, due_date, start_date, completed_at, created_at, updated_at"#,
        )
        .bind(task_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(status)
        .bind(priority)
        .bind(data.routine_id)
        .bind(data.unit_id)
        .bind(data.sector_id)
        .bind(data.assigned_to)
        .bind(created_by)
        .bind(data.parent_task_id)
        .bind(data.due_date)
        .bind(data.start_date)
        .bind(completed_at)
        .fetch_one(pool)
        .await
    }

    /// `None` fields are left unchanged. Status changes go through [`Task::update_status`].
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"UPDATE tasks
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   priority = COALESCE($4, priority),
                   unit_id = COALESCE($5, unit_id),
                   sector_id = COALESCE($6, sector_id),
                   assigned_to = COALESCE($7, assigned_to),
                   due_date = COALESCE($8, due_date),
                   start_date = COALESCE($9, start_date),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, title, description, status, priority, routine_id, unit_id, sector_id, assigned_to, created_by, parent_task_id, due_date, start_date, completed_at, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.title.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(data.priority)
        .bind(data.unit_id)
        .bind(data.sector_id)
        .bind(data.assigned_to)
        .bind(data.due_date)
        .bind(data.start_date)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        // completed_at follows the status: stamped on completion, cleared when reopened
        let completed_at = (status == TaskStatus::Concluida).then(Utc::now);
        sqlx::query_as::<_, Task>(
            r#"UPDATE tasks
               SET status = $2,
                   completed_at = $3,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, title, description, status, priority, routine_id, unit_id, sector_id, assigned_to, created_by, parent_task_id, due_date, start_date, completed_at, created_at, updated_at"#,
        )
        .bind(id)
        .bind(status)
        .bind(completed_at)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
