// ==========================================
// 评审分配引擎 - 求解运行队列仓储
// ==========================================
// 状态: PENDING → RUNNING → COMPLETED / FAILED / CANCELLED
// 红线: 同一配置至多一个 PENDING/RUNNING 任务（由调用方在入队前判断）
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 队列任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTaskStatus::Pending => "PENDING",
            RunTaskStatus::Running => "RUNNING",
            RunTaskStatus::Completed => "COMPLETED",
            RunTaskStatus::Failed => "FAILED",
            RunTaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunTaskStatus::Pending | RunTaskStatus::Running)
    }
}

impl FromStr for RunTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RunTaskStatus::Pending),
            "RUNNING" => Ok(RunTaskStatus::Running),
            "COMPLETED" => Ok(RunTaskStatus::Completed),
            "FAILED" => Ok(RunTaskStatus::Failed),
            "CANCELLED" => Ok(RunTaskStatus::Cancelled),
            other => Err(format!("未知任务状态: {}", other)),
        }
    }
}

/// 队列任务
#[derive(Debug, Clone, Serialize)]
pub struct RunTask {
    pub task_id: String,
    pub config_id: String,
    pub status: RunTaskStatus,
    pub retry_count: i64,
    pub max_retries: i64,
    /// 运行开始时的设置快照（JSON）
    pub settings_snapshot: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

impl RunTask {
    pub fn new(config_id: &str, max_retries: i64) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            config_id: config_id.to_string(),
            status: RunTaskStatus::Pending,
            retry_count: 0,
            max_retries,
            settings_snapshot: None,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunQueueCounts {
    pub pending: i64,
    pub running: i64,
    pub failed: i64,
    pub completed: i64,
    pub cancelled: i64,
}

const TASK_COLUMNS: &str = "task_id, config_id, status, retry_count, max_retries, settings_snapshot, \
                            created_at, started_at, completed_at, error_message";

pub struct RunQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunQueueRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn enqueue(&self, task: &RunTask) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO run_queue ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                TASK_COLUMNS
            ),
            params![
                task.task_id,
                task.config_id,
                task.status.as_str(),
                task.retry_count,
                task.max_retries,
                task.settings_snapshot,
                task.created_at,
                task.started_at,
                task.completed_at,
                task.error_message,
            ],
        )?;
        tracing::info!(task_id = %task.task_id, config_id = %task.config_id, "求解任务已入队");
        Ok(task.task_id.clone())
    }

    /// 取出最早的待执行任务并置为 RUNNING
    ///
    /// 跳过已有 RUNNING 任务的配置
    pub fn dequeue_next(&self) -> RepositoryResult<Option<RunTask>> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let task = tx
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM run_queue q
                    WHERE q.status = 'PENDING'
                      AND NOT EXISTS (
                        SELECT 1 FROM run_queue r
                        WHERE r.config_id = q.config_id AND r.status = 'RUNNING'
                      )
                    ORDER BY q.created_at ASC, q.rowid ASC
                    LIMIT 1
                    "#,
                    TASK_COLUMNS
                ),
                [],
                map_task_row,
            )
            .optional()?
            .transpose()?;

        let Some(mut task) = task else {
            return Ok(None);
        };
        let started_at = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE run_queue SET status = 'RUNNING', started_at = ?1 WHERE task_id = ?2",
            params![started_at, task.task_id],
        )?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        task.status = RunTaskStatus::Running;
        task.started_at = Some(started_at);
        Ok(Some(task))
    }

    pub fn set_settings_snapshot(&self, task_id: &str, snapshot: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE run_queue SET settings_snapshot = ?1 WHERE task_id = ?2",
            params![snapshot, task_id],
        )?;
        Ok(())
    }

    /// 结束任务（COMPLETED / FAILED / CANCELLED）
    pub fn finish(
        &self,
        task_id: &str,
        status: RunTaskStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            r#"
            UPDATE run_queue
            SET status = ?1, completed_at = ?2, error_message = ?3
            WHERE task_id = ?4
            "#,
            params![status.as_str(), Utc::now().to_rfc3339(), error_message, task_id],
        )?;
        if n == 0 {
            return Err(RepositoryError::not_found("RunTask", task_id));
        }
        Ok(())
    }

    /// 失败任务重新排队（retry_count + 1）
    ///
    /// # 返回
    /// - true: 已重新排队；false: 已达最大重试次数，置为 FAILED
    pub fn retry_or_fail(&self, task_id: &str, error_message: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let requeued = conn.execute(
            r#"
            UPDATE run_queue
            SET status = 'PENDING', retry_count = retry_count + 1, error_message = ?1, started_at = NULL
            WHERE task_id = ?2 AND retry_count < max_retries
            "#,
            params![error_message, task_id],
        )?;
        if requeued > 0 {
            return Ok(true);
        }
        conn.execute(
            r#"
            UPDATE run_queue
            SET status = 'FAILED', completed_at = ?1, error_message = ?2
            WHERE task_id = ?3
            "#,
            params![Utc::now().to_rfc3339(), error_message, task_id],
        )?;
        Ok(false)
    }

    /// 取消某配置的待执行任务
    ///
    /// # 返回
    /// - 被取消的任务数（RUNNING 任务由调度器通过取消标志结束）
    pub fn cancel_pending(&self, config_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            r#"
            UPDATE run_queue
            SET status = 'CANCELLED', completed_at = ?1
            WHERE config_id = ?2 AND status = 'PENDING'
            "#,
            params![Utc::now().to_rfc3339(), config_id],
        )?;
        Ok(n)
    }

    pub fn find_by_id(&self, task_id: &str) -> RepositoryResult<Option<RunTask>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM run_queue WHERE task_id = ?1", TASK_COLUMNS),
            params![task_id],
            map_task_row,
        )
        .optional()?
        .transpose()
    }

    /// 某配置当前的 PENDING/RUNNING 任务
    pub fn find_active_by_config(&self, config_id: &str) -> RepositoryResult<Option<RunTask>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!(
                r#"
                SELECT {} FROM run_queue
                WHERE config_id = ?1 AND status IN ('PENDING', 'RUNNING')
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                TASK_COLUMNS
            ),
            params![config_id],
            map_task_row,
        )
        .optional()?
        .transpose()
    }

    pub fn find_latest_by_config(&self, config_id: &str) -> RepositoryResult<Option<RunTask>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM run_queue WHERE config_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                TASK_COLUMNS
            ),
            params![config_id],
            map_task_row,
        )
        .optional()?
        .transpose()
    }

    pub fn get_queue_counts(&self) -> RepositoryResult<RunQueueCounts> {
        let conn = self.get_conn()?;
        let (pending, running, failed, completed, cancelled): (i64, i64, i64, i64, i64) = conn.query_row(
            r#"
            SELECT
              COALESCE(SUM(CASE WHEN status = 'PENDING' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'RUNNING' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'CANCELLED' THEN 1 ELSE 0 END), 0)
            FROM run_queue
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;
        Ok(RunQueueCounts {
            pending,
            running,
            failed,
            completed,
            cancelled,
        })
    }

    /// 进程重启后把遗留的 RUNNING 任务放回 PENDING
    pub fn reset_running_to_pending(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "UPDATE run_queue SET status = 'PENDING', started_at = NULL WHERE status = 'RUNNING'",
            [],
        )?;
        Ok(n)
    }
}

fn map_task_row(row: &Row) -> rusqlite::Result<RepositoryResult<RunTask>> {
    let status_raw: String = row.get(2)?;
    let task = RunTask {
        task_id: row.get(0)?,
        config_id: row.get(1)?,
        status: RunTaskStatus::Pending,
        retry_count: row.get(3)?,
        max_retries: row.get(4)?,
        settings_snapshot: row.get(5)?,
        created_at: row.get(6)?,
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        error_message: row.get(9)?,
    };
    Ok(status_raw
        .parse::<RunTaskStatus>()
        .map(|status| RunTask { status, ..task })
        .map_err(|message| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn repo() -> RunQueueRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        RunQueueRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_enqueue_dequeue_finish() {
        let repo = repo();
        let first = RunTask::new("c1", 0);
        let second = RunTask::new("c2", 0);
        repo.enqueue(&first).unwrap();
        repo.enqueue(&second).unwrap();

        let task = repo.dequeue_next().unwrap().unwrap();
        assert_eq!(task.task_id, first.task_id);
        assert_eq!(task.status, RunTaskStatus::Running);
        assert!(task.started_at.is_some());

        repo.finish(&task.task_id, RunTaskStatus::Completed, None).unwrap();
        let counts = repo.get_queue_counts().unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.pending, 1);
        assert!(repo.find_active_by_config("c1").unwrap().is_none());
        assert!(repo.find_active_by_config("c2").unwrap().is_some());
    }

    #[test]
    fn test_dequeue_skips_config_with_running_task() {
        let repo = repo();
        let a1 = RunTask::new("c1", 0);
        repo.enqueue(&a1).unwrap();
        repo.dequeue_next().unwrap().unwrap();

        let a2 = RunTask::new("c1", 0);
        repo.enqueue(&a2).unwrap();
        assert!(repo.dequeue_next().unwrap().is_none());

        repo.finish(&a1.task_id, RunTaskStatus::Failed, Some("boom")).unwrap();
        assert_eq!(repo.dequeue_next().unwrap().unwrap().task_id, a2.task_id);
    }

    #[test]
    fn test_cancel_and_retry() {
        let repo = repo();
        let task = RunTask::new("c1", 1);
        repo.enqueue(&task).unwrap();
        repo.dequeue_next().unwrap();

        assert!(repo.retry_or_fail(&task.task_id, "transient").unwrap());
        assert_eq!(repo.find_by_id(&task.task_id).unwrap().unwrap().retry_count, 1);
        repo.dequeue_next().unwrap();
        assert!(!repo.retry_or_fail(&task.task_id, "again").unwrap());
        assert_eq!(
            repo.find_by_id(&task.task_id).unwrap().unwrap().status,
            RunTaskStatus::Failed
        );

        let pending = RunTask::new("c2", 0);
        repo.enqueue(&pending).unwrap();
        assert_eq!(repo.cancel_pending("c2").unwrap(), 1);
        assert_eq!(
            repo.find_latest_by_config("c2").unwrap().unwrap().status,
            RunTaskStatus::Cancelled
        );
    }

    #[test]
    fn test_reset_running() {
        let repo = repo();
        repo.enqueue(&RunTask::new("c1", 0)).unwrap();
        repo.dequeue_next().unwrap();
        assert_eq!(repo.reset_running_to_pending().unwrap(), 1);
        assert_eq!(repo.get_queue_counts().unwrap().pending, 1);
    }
}
