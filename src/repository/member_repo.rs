// ==========================================
// 评审分配引擎 - 委员会组成员 / 成员档案仓储
// ==========================================
// 说明: group_member 同时保存委员会组（匹配组）与单篇投稿委员会组
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::member::{Member, Profile};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// GroupRepository - 组成员
// ==========================================
pub struct GroupRepository {
    conn: Arc<Mutex<Connection>>,
}

impl GroupRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 添加成员
    ///
    /// # 返回
    /// - true: 新增；false: 已是成员
    pub fn add_member(&self, group_id: &str, member_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "INSERT OR IGNORE INTO group_member (group_id, member_id) VALUES (?1, ?2)",
            params![group_id, member_id],
        )?;
        Ok(n > 0)
    }

    /// 移除成员
    ///
    /// # 返回
    /// - true: 已移除；false: 原本不是成员
    pub fn remove_member(&self, group_id: &str, member_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "DELETE FROM group_member WHERE group_id = ?1 AND member_id = ?2",
            params![group_id, member_id],
        )?;
        Ok(n > 0)
    }

    pub fn is_member(&self, group_id: &str, member_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM group_member WHERE group_id = ?1 AND member_id = ?2",
            params![group_id, member_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 组成员 id（按加入顺序）
    pub fn list_member_ids(&self, group_id: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT member_id FROM group_member WHERE group_id = ?1 ORDER BY added_at, rowid",
        )?;
        let rows = stmt.query_map(params![group_id], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// 组成员
    pub fn list_members(&self, group_id: &str) -> RepositoryResult<Vec<Member>> {
        Ok(self
            .list_member_ids(group_id)?
            .iter()
            .map(|id| Member::new(id, group_id))
            .collect())
    }
}

// ==========================================
// ProfileRepository - 成员档案
// ==========================================
pub struct ProfileRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProfileRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn upsert(&self, profile: &Profile) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO profile (id, profile_json) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET profile_json = excluded.profile_json
            "#,
            params![profile.id, serde_json::to_string(profile)?],
        )?;
        Ok(())
    }

    /// 批量读取档案（不存在的 id 跳过）
    pub fn find_many(&self, ids: &[String]) -> RepositoryResult<Vec<Profile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT profile_json FROM profile WHERE id = ?1")?;
        let mut profiles = Vec::with_capacity(ids.len());
        for id in ids {
            let mut rows = stmt.query(params![id])?;
            if let Some(row) = rows.next()? {
                let json: String = row.get(0)?;
                profiles.push(serde_json::from_str(&json)?);
            }
        }
        Ok(profiles)
    }
}
