//! SQLite implementation of the ExploitCaseRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CaseOrigin, CaseStatus, ExploitCase};
use crate::domain::ports::ExploitCaseRepository;

const CASE_COLUMNS: &str =
    "id, task_id, origin, name, description, code, status, version_added, created_at";

#[derive(Clone)]
pub struct SqliteExploitCaseRepository {
    pool: SqlitePool,
}

impl SqliteExploitCaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExploitCaseRepository for SqliteExploitCaseRepository {
    async fn register(&self, case: &ExploitCase) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO exploit_cases (id, task_id, origin, name, description, code, status,
               version_added, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(task_id, name) DO NOTHING"#
        )
        .bind(case.id.to_string())
        .bind(case.task_id.to_string())
        .bind(case.origin.as_str())
        .bind(&case.name)
        .bind(&case.description)
        .bind(&case.code)
        .bind(case.status.as_str())
        .bind(&case.version_added)
        .bind(case.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_by_name(&self, task_id: Uuid, name: &str) -> DomainResult<Option<ExploitCase>> {
        let row: Option<ExploitCaseRow> = sqlx::query_as(&format!(
            "SELECT {CASE_COLUMNS} FROM exploit_cases WHERE task_id = ? AND name = ?"
        ))
        .bind(task_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ExploitCase::try_from).transpose()
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<ExploitCase>> {
        let rows: Vec<ExploitCaseRow> = sqlx::query_as(&format!(
            "SELECT {CASE_COLUMNS} FROM exploit_cases WHERE task_id = ? ORDER BY rowid"
        ))
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExploitCase::try_from).collect()
    }

    async fn list_by_status(
        &self,
        task_id: Uuid,
        status: CaseStatus,
        limit: Option<usize>,
    ) -> DomainResult<Vec<ExploitCase>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit
            .map(i64::try_from)
            .transpose()
            .map_err(|e| DomainError::ValidationFailed(e.to_string()))?
            .unwrap_or(-1);

        let rows: Vec<ExploitCaseRow> = sqlx::query_as(&format!(
            "SELECT {CASE_COLUMNS} FROM exploit_cases WHERE task_id = ? AND status = ? ORDER BY rowid LIMIT ?"
        ))
        .bind(task_id.to_string())
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExploitCase::try_from).collect()
    }

    async fn count_by_status(&self, task_id: Uuid, status: CaseStatus) -> DomainResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM exploit_cases WHERE task_id = ? AND status = ?")
                .bind(task_id.to_string())
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        u64::try_from(count).map_err(|e| DomainError::SerializationError(e.to_string()))
    }

    async fn apply_statuses(
        &self,
        task_id: Uuid,
        statuses: &HashMap<String, CaseStatus>,
    ) -> DomainResult<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0usize;
        for (name, status) in statuses {
            let result = sqlx::query("UPDATE exploit_cases SET status = ? WHERE task_id = ? AND name = ?")
                .bind(status.as_str())
                .bind(task_id.to_string())
                .bind(name)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() > 0 {
                updated += 1;
            }
        }
        tx.commit().await?;

        Ok(updated)
    }
}

#[derive(sqlx::FromRow)]
struct ExploitCaseRow {
    id: String,
    task_id: String,
    origin: String,
    name: String,
    description: Option<String>,
    code: String,
    status: String,
    version_added: String,
    created_at: String,
}

impl TryFrom<ExploitCaseRow> for ExploitCase {
    type Error = DomainError;

    fn try_from(row: ExploitCaseRow) -> Result<Self, Self::Error> {
        let origin = CaseOrigin::from_str(&row.origin)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid origin: {}", row.origin)))?;
        let status = CaseStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        Ok(ExploitCase {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            origin,
            name: row.name,
            description: row.description,
            code: row.code,
            status,
            version_added: row.version_added,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
