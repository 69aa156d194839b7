//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FuzzerSummary, Task, TaskStatus};
use crate::domain::ports::{TaskFilters, TaskRepository};

const TASK_COLUMNS: &str = "id, name, status, contract_name, original_source, current_source, fixed_source, \
     exploit_source, static_report, fuzzer_report, current_phase, round_count, result_summary, \
     created_at, started_at, finished_at";

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn ensure_updated(id: Uuid, rows_affected: u64) -> DomainResult<()> {
        if rows_affected == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        let fuzzer_json = task.fuzzer_report.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks (id, name, status, contract_name, original_source, current_source,
               fixed_source, exploit_source, static_report, fuzzer_report, current_phase, round_count,
               result_summary, created_at, started_at, finished_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(task.id.to_string())
        .bind(&task.name)
        .bind(task.status.as_str())
        .bind(&task.contract_name)
        .bind(&task.original_source)
        .bind(&task.current_source)
        .bind(&task.fixed_source)
        .bind(&task.exploit_source)
        .bind(&task.static_report)
        .bind(&fuzzer_json)
        .bind(&task.current_phase)
        .bind(i64::from(task.round_count))
        .bind(&task.result_summary)
        .bind(task.created_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let fuzzer_json = task.fuzzer_report.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE tasks SET name = ?, status = ?, contract_name = ?, original_source = ?,
               current_source = ?, fixed_source = ?, exploit_source = ?, static_report = ?,
               fuzzer_report = ?, current_phase = ?, round_count = ?, result_summary = ?,
               started_at = ?, finished_at = ?
               WHERE id = ?"#
        )
        .bind(&task.name)
        .bind(task.status.as_str())
        .bind(&task.contract_name)
        .bind(&task.original_source)
        .bind(&task.current_source)
        .bind(&task.fixed_source)
        .bind(&task.exploit_source)
        .bind(&task.static_report)
        .bind(&fuzzer_json)
        .bind(&task.current_phase)
        .bind(i64::from(task.round_count))
        .bind(&task.result_summary)
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.finished_at.map(|t| t.to_rfc3339()))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(task.id, result.rows_affected())
    }

    async fn list(&self, filters: TaskFilters) -> DomainResult<Vec<Task>> {
        let mut query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        if filters.status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at DESC");
        if filters.limit.is_some() {
            query.push_str(" LIMIT ? OFFSET ?");
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        if let Some(status) = filters.status {
            q = q.bind(status.as_str());
        }
        if let Some(limit) = filters.limit {
            q = q.bind(limit).bind(filters.offset.unwrap_or(0));
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn count(&self, filters: TaskFilters) -> DomainResult<i64> {
        let (count,): (i64,) = match filters.status {
            Some(status) => {
                sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => sqlx::query_as("SELECT COUNT(*) FROM tasks").fetch_one(&self.pool).await?,
        };
        Ok(count)
    }

    async fn update_phase(&self, id: Uuid, phase: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tasks SET current_phase = ? WHERE id = ?")
            .bind(phase)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Self::ensure_updated(id, result.rows_affected())
    }

    async fn record_discovery(
        &self,
        id: Uuid,
        static_report: &str,
        fuzzer: Option<&FuzzerSummary>,
    ) -> DomainResult<()> {
        let fuzzer_json = fuzzer.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "UPDATE tasks SET static_report = ?, fuzzer_report = COALESCE(?, fuzzer_report) WHERE id = ?",
        )
        .bind(static_report)
        .bind(fuzzer_json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Self::ensure_updated(id, result.rows_affected())
    }

    async fn record_exploit(&self, id: Uuid, exploit: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tasks SET exploit_source = ? WHERE id = ?")
            .bind(exploit)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Self::ensure_updated(id, result.rows_affected())
    }

    async fn record_patch(&self, id: Uuid, patched: &str, round_count: u32) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET current_source = ?, fixed_source = ?, round_count = ? WHERE id = ?",
        )
        .bind(patched)
        .bind(patched)
        .bind(i64::from(round_count))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Self::ensure_updated(id, result.rows_affected())
    }

    async fn finish(&self, id: Uuid, status: TaskStatus, summary: &str) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE tasks SET status = ?, result_summary = ?, current_phase = 'Finished', finished_at = ?
               WHERE id = ? AND status IN ('running', ?)"#
        )
        .bind(status.as_str())
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    name: String,
    status: String,
    contract_name: Option<String>,
    original_source: Option<String>,
    current_source: Option<String>,
    fixed_source: Option<String>,
    exploit_source: Option<String>,
    static_report: Option<String>,
    fuzzer_report: Option<String>,
    current_phase: Option<String>,
    round_count: i64,
    result_summary: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        let fuzzer_report: Option<FuzzerSummary> = row
            .fuzzer_report
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        let round_count = u32::try_from(row.round_count)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            name: row.name,
            status,
            contract_name: row.contract_name,
            original_source: row.original_source,
            current_source: row.current_source,
            fixed_source: row.fixed_source,
            exploit_source: row.exploit_source,
            static_report: row.static_report,
            fuzzer_report,
            current_phase: row.current_phase,
            round_count,
            result_summary: row.result_summary,
            created_at: parse_datetime(&row.created_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            finished_at: parse_optional_datetime(row.finished_at)?,
        })
    }
}
