// ==========================================
// 评审分配引擎 - 部署日志仓储
// ==========================================
// 职责: 记录部署过程中的每次组成员/边变更，供撤销与回滚按逆序重放
// 红线: 日志只追加，撤销完成后整体清除
// ==========================================

use crate::domain::edge::Edge;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 部署动作
#[derive(Debug, Clone, PartialEq)]
pub enum JournalAction {
    /// 成员加入组
    MemberAdded { group_id: String, member_id: String },
    /// 成员移出组（覆写部署）
    MemberRemoved { group_id: String, member_id: String },
    /// 写入边
    EdgeInserted { edge: Edge },
    /// 删除边（覆写部署，撤销时恢复原边）
    EdgeDeleted { edge: Edge },
}

impl JournalAction {
    fn tag(&self) -> &'static str {
        match self {
            JournalAction::MemberAdded { .. } => "MEMBER_ADDED",
            JournalAction::MemberRemoved { .. } => "MEMBER_REMOVED",
            JournalAction::EdgeInserted { .. } => "EDGE_INSERTED",
            JournalAction::EdgeDeleted { .. } => "EDGE_DELETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub seq: i64,
    pub config_id: String,
    pub action: JournalAction,
}

pub struct DeploymentJournalRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DeploymentJournalRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn append(&self, config_id: &str, action: &JournalAction) -> RepositoryResult<i64> {
        let (group_id, member_id, edge_json) = match action {
            JournalAction::MemberAdded {
                group_id,
                member_id,
            }
            | JournalAction::MemberRemoved {
                group_id,
                member_id,
            } => (Some(group_id.as_str()), Some(member_id.as_str()), None),
            JournalAction::EdgeInserted { edge } | JournalAction::EdgeDeleted { edge } => {
                (None, None, Some(serde_json::to_string(edge)?))
            }
        };
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO deployment_journal (config_id, action, group_id, member_id, edge_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![config_id, action.tag(), group_id, member_id, edge_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按写入顺序列出某配置的日志
    pub fn list_by_config(&self, config_id: &str) -> RepositoryResult<Vec<JournalEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT seq, config_id, action, group_id, member_id, edge_json
            FROM deployment_journal
            WHERE config_id = ?1
            ORDER BY seq ASC
            "#,
        )?;
        let rows = stmt.query_map(params![config_id], map_entry_row)?;
        rows.map(|r| r.map_err(RepositoryError::from).and_then(|e| e))
            .collect()
    }

    pub fn clear(&self, config_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "DELETE FROM deployment_journal WHERE config_id = ?1",
            params![config_id],
        )?;
        Ok(n)
    }

    /// 删除某序号之后的日志（回滚完成后使用）
    pub fn truncate_after(&self, config_id: &str, seq: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "DELETE FROM deployment_journal WHERE config_id = ?1 AND seq > ?2",
            params![config_id, seq],
        )?;
        Ok(n)
    }
}

fn map_entry_row(row: &Row) -> rusqlite::Result<RepositoryResult<JournalEntry>> {
    let seq: i64 = row.get(0)?;
    let config_id: String = row.get(1)?;
    let tag: String = row.get(2)?;
    let group_id: Option<String> = row.get(3)?;
    let member_id: Option<String> = row.get(4)?;
    let edge_json: Option<String> = row.get(5)?;
    Ok(decode_action(&tag, group_id, member_id, edge_json).map(|action| JournalEntry {
        seq,
        config_id,
        action,
    }))
}

fn decode_action(
    tag: &str,
    group_id: Option<String>,
    member_id: Option<String>,
    edge_json: Option<String>,
) -> RepositoryResult<JournalAction> {
    let missing = |field: &str| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("{} 日志缺少字段", tag),
    };
    match tag {
        "MEMBER_ADDED" | "MEMBER_REMOVED" => {
            let group_id = group_id.ok_or_else(|| missing("group_id"))?;
            let member_id = member_id.ok_or_else(|| missing("member_id"))?;
            Ok(if tag == "MEMBER_ADDED" {
                JournalAction::MemberAdded {
                    group_id,
                    member_id,
                }
            } else {
                JournalAction::MemberRemoved {
                    group_id,
                    member_id,
                }
            })
        }
        "EDGE_INSERTED" | "EDGE_DELETED" => {
            let json = edge_json.ok_or_else(|| missing("edge_json"))?;
            let edge: Edge = serde_json::from_str(&json)?;
            Ok(if tag == "EDGE_INSERTED" {
                JournalAction::EdgeInserted { edge }
            } else {
                JournalAction::EdgeDeleted { edge }
            })
        }
        other => Err(RepositoryError::FieldValueError {
            field: "action".to_string(),
            message: format!("未知部署动作: {}", other),
        }),
    }
}
