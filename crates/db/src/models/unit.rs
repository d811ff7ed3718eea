use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// An organisational node. Top-level units ("gerências") group leaf units, and only
/// leaf units receive routine checkins.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Unit {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UnitWithLeaf {
    #[serde(flatten)]
    #[ts(flatten)]
    #[sqlx(flatten)]
    pub unit: Unit,
    pub is_leaf: bool,
}

impl std::ops::Deref for UnitWithLeaf {
    type Target = Unit;
    fn deref(&self) -> &Self::Target {
        &self.unit
    }
}

/// A top-level unit with its direct children.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UnitTreeNode {
    #[serde(flatten)]
    #[ts(flatten)]
    pub unit: Unit,
    pub children: Vec<Unit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateUnit {
    pub name: String,
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateUnit {
    pub name: Option<String>,
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sector_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

impl Unit {
    /// Group units into gerências and their children. Units whose parent is missing or
    /// inactive are promoted to the top level so nothing disappears from the tree.
    pub fn build_tree(units: Vec<Unit>) -> Vec<UnitTreeNode> {
        let known: std::collections::HashSet<Uuid> = units.iter().map(|u| u.id).collect();
        let (roots, children): (Vec<Unit>, Vec<Unit>) = units
            .into_iter()
            .partition(|u| u.parent_id.is_none_or(|p| !known.contains(&p)));

        let mut nodes: Vec<UnitTreeNode> = roots
            .into_iter()
            .map(|unit| UnitTreeNode {
                unit,
                children: Vec::new(),
            })
            .collect();

        for child in children {
            if let Some(node) = nodes.iter_mut().find(|n| Some(n.unit.id) == child.parent_id) {
                node.children.push(child);
            } else {
                // deeper descendants are listed as their own rows
                nodes.push(UnitTreeNode {
                    unit: child,
                    children: Vec::new(),
                });
            }
        }

        nodes.sort_by(|a, b| a.unit.name.cmp(&b.unit.name));
        for node in &mut nodes {
            node.children.sort_by(|a, b| a.name.cmp(&b.name));
        }
        nodes
    }

    pub async fn find_all_with_leaf(
        pool: &SqlitePool,
        include_inactive: bool,
    ) -> Result<Vec<UnitWithLeaf>, sqlx::Error> {
        sqlx::query_as::<_, UnitWithLeaf>(
            r#"SELECT u.id, u.name, u.code, u.parent_id, u.sector_id, u.is_active, u.created_at, u.updated_at,
                      NOT EXISTS (
                          SELECT 1 FROM units c WHERE c.parent_id = u.id AND c.is_active = 1
                      ) AS is_leaf
               FROM units u
               WHERE ($1 = 1 OR u.is_active = 1)
               ORDER BY u.name ASC"#,
        )
        .bind(include_inactive)
        .fetch_all(pool)
        .await
    }

    pub async fn find_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Unit>(
            r#"SELECT id, name, code, parent_id, sector_id, is_active, created_at, updated_at
               FROM units
               WHERE is_active = 1
               ORDER BY name ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Unit>(
            r#"SELECT id, name, code, parent_id, sector_id, is_active, created_at, updated_at
               FROM units
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Active units without active children, optionally restricted to one sector.
    pub async fn find_active_leaves(
        pool: &SqlitePool,
        sector_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Unit>(
            r#"SELECT u.id, u.name, u.code, u.parent_id, u.sector_id, u.is_active, u.created_at, u.updated_at
               FROM units u
               WHERE u.is_active = 1
                 AND NOT EXISTS (
                     SELECT 1 FROM units c WHERE c.parent_id = u.id AND c.is_active = 1
                 )
                 AND ($1 IS NULL OR u.sector_id = $1)
               ORDER BY u.name ASC"#,
        )
        .bind(sector_id)
        .fetch_all(pool)
        .await
    }

    /// Active units among `ids`, ordered by name.
    pub async fn find_active_by_ids(
        pool: &SqlitePool,
        ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, code, parent_id, sector_id, is_active, created_at, updated_at FROM units WHERE is_active = 1 AND id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY name ASC");
        builder.build_query_as::<Unit>().fetch_all(pool).await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateUnit, id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Unit>(
            r#"INSERT INTO units (id, name, code, parent_id, sector_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, name, code, parent_id, sector_id, is_active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&data.code)
        .bind(data.parent_id)
        .bind(data.sector_id)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateUnit,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Unit>(
            r#"UPDATE units
               SET name = COALESCE($2, name),
                   code = COALESCE($3, code),
                   parent_id = COALESCE($4, parent_id),
                   sector_id = COALESCE($5, sector_id),
                   is_active = COALESCE($6, is_active),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, code, parent_id, sector_id, is_active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.code)
        .bind(data.parent_id)
        .bind(data.sector_id)
        .bind(data.is_active)
        .fetch_optional(pool)
        .await
    }

    /// Units are deactivated rather than removed so historical checkins keep their unit.
    pub async fn soft_delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE units SET is_active = 0, updated_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
