// ==========================================
// 评审分配引擎 - 分配配置仓储
// ==========================================
// 红线: Repository 不含业务逻辑（状态机合法性由引擎层判断）
// 红线: 状态列是唯一权威，更新使用 compare-and-set
// ==========================================

use crate::domain::configuration::AssignmentConfiguration;
use crate::domain::types::ConfigStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct AssignmentConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentConfigRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或整体保存配置
    pub fn save(&self, config: &AssignmentConfiguration) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let json = serde_json::to_string(config)?;
        conn.execute(
            r#"
            INSERT INTO assignment_config (
                id, title, match_group, status, error_message, config_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                match_group = excluded.match_group,
                status = excluded.status,
                error_message = excluded.error_message,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
            params![
                config.id,
                config.title,
                config.match_group,
                config.status.as_str(),
                config.error_message,
                json,
                config.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<AssignmentConfiguration>> {
        let conn = self.get_conn()?;
        conn.query_row(
            "SELECT config_json, status, error_message, updated_at FROM assignment_config WHERE id = ?1",
            params![id],
            map_config_row,
        )
        .optional()?
        .transpose()
    }

    /// 按 id 读取，不存在时返回 NotFound
    pub fn get(&self, id: &str) -> RepositoryResult<AssignmentConfiguration> {
        self.find_by_id(id)?
            .ok_or_else(|| RepositoryError::not_found("AssignmentConfiguration", id))
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<AssignmentConfiguration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT config_json, status, error_message, updated_at FROM assignment_config ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], map_config_row)?;
        rows.map(|r| r.map_err(RepositoryError::from).and_then(|c| c)).collect()
    }

    pub fn list_by_match_group(&self, match_group: &str) -> RepositoryResult<Vec<AssignmentConfiguration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT config_json, status, error_message, updated_at
            FROM assignment_config
            WHERE match_group = ?1
            ORDER BY created_at, id
            "#,
        )?;
        let rows = stmt.query_map(params![match_group], map_config_row)?;
        rows.map(|r| r.map_err(RepositoryError::from).and_then(|c| c)).collect()
    }

    /// 比较并设置状态
    ///
    /// # 返回
    /// - Err(InvalidStateTransition): 当前状态不是 expected
    pub fn compare_and_set_status(
        &self,
        id: &str,
        expected: ConfigStatus,
        next: ConfigStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE assignment_config
            SET status = ?1, error_message = ?2, updated_at = ?3
            WHERE id = ?4 AND status = ?5
            "#,
            params![
                next.as_str(),
                error_message,
                Utc::now().to_rfc3339(),
                id,
                expected.as_str()
            ],
        )?;
        if updated == 1 {
            return Ok(());
        }

        let actual: Option<String> = conn
            .query_row(
                "SELECT status FROM assignment_config WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match actual {
            None => Err(RepositoryError::not_found("AssignmentConfiguration", id)),
            Some(actual) => Err(RepositoryError::InvalidStateTransition {
                from: actual,
                to: next.as_str().to_string(),
            }),
        }
    }

    /// 记录随机化求解的期望分比例
    pub fn set_fraction_of_opt(&self, id: &str, fraction: Option<f64>) -> RepositoryResult<()> {
        let mut config = self.get(id)?;
        config.randomized_fraction_of_opt = fraction;
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE assignment_config SET config_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&config)?, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }
}

fn map_config_row(row: &Row) -> rusqlite::Result<RepositoryResult<AssignmentConfiguration>> {
    let json: String = row.get(0)?;
    let status: String = row.get(1)?;
    let error_message: Option<String> = row.get(2)?;
    let updated_at: String = row.get(3)?;
    Ok(decode_config(&json, &status, error_message, &updated_at))
}

/// 状态列与错误信息覆盖 JSON 中的值
fn decode_config(
    json: &str,
    status: &str,
    error_message: Option<String>,
    updated_at: &str,
) -> RepositoryResult<AssignmentConfiguration> {
    let mut config: AssignmentConfiguration = serde_json::from_str(json)?;
    config.status = status.parse().map_err(|e: String| RepositoryError::FieldValueError {
        field: "status".to_string(),
        message: e,
    })?;
    config.error_message = error_message;
    if let Ok(ts) = DateTime::parse_from_rfc3339(updated_at) {
        config.updated_at = ts.with_timezone(&Utc);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::domain::configuration::ConfigurationContent;

    fn repo() -> AssignmentConfigRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        AssignmentConfigRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn config() -> AssignmentConfiguration {
        AssignmentConfiguration::from_content(ConfigurationContent {
            title: "rev-1".into(),
            match_group: "V/Reviewers".into(),
            paper_invitation: "V/-/Submission".into(),
            user_demand: "2".into(),
            max_papers: "3".into(),
            min_papers: "0".into(),
            alternates: "1".into(),
            solver: "FairFlow".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let repo = repo();
        let cfg = config();
        repo.save(&cfg).unwrap();

        let loaded = repo.get(&cfg.id).unwrap();
        assert_eq!(loaded.title, "rev-1");
        assert_eq!(loaded.status, ConfigStatus::Initialized);
        assert_eq!(repo.list_by_match_group("V/Reviewers").unwrap().len(), 1);
        assert!(repo.find_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_compare_and_set_status() {
        let repo = repo();
        let cfg = config();
        repo.save(&cfg).unwrap();

        repo.compare_and_set_status(&cfg.id, ConfigStatus::Initialized, ConfigStatus::Queued, None)
            .unwrap();
        let err = repo
            .compare_and_set_status(&cfg.id, ConfigStatus::Initialized, ConfigStatus::Queued, None)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { ref from, .. } if from == "Queued"));

        repo.compare_and_set_status(&cfg.id, ConfigStatus::Queued, ConfigStatus::Running, None)
            .unwrap();
        repo.compare_and_set_status(&cfg.id, ConfigStatus::Running, ConfigStatus::Error, Some("boom"))
            .unwrap();
        let loaded = repo.get(&cfg.id).unwrap();
        assert_eq!(loaded.status, ConfigStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_fraction_of_opt() {
        let repo = repo();
        let cfg = config();
        repo.save(&cfg).unwrap();
        repo.set_fraction_of_opt(&cfg.id, Some(0.93)).unwrap();
        assert_eq!(repo.get(&cfg.id).unwrap().randomized_fraction_of_opt, Some(0.93));
    }
}
