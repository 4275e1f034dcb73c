// ==========================================
// 评审分配引擎 - 边记录仓储
// ==========================================
// 覆盖: 冲突 / 亲和度 / 评分 / 容量覆写 / 需求覆写 / 分配边
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::edge::Edge;
use crate::domain::types::EdgeKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const EDGE_COLUMNS: &str = "id, invitation_id, kind, head, tail, weight, label, config_id, \
                            signatures, readers, writers, created_at";

pub struct EdgeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EdgeRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, edge: &Edge) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_edge(&conn, edge)
    }

    /// 批量写入（单事务）
    ///
    /// # 返回
    /// - 写入条数
    pub fn insert_batch(&self, edges: &[Edge]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        for edge in edges {
            insert_edge(&tx, edge)?;
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(edges.len())
    }

    pub fn delete_by_id(&self, id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let n = conn.execute("DELETE FROM edge WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// 删除某配置产生的某类边（丢弃 Proposed / Alternate 结果）
    pub fn delete_by_config(&self, config_id: &str, kind: EdgeKind) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "DELETE FROM edge WHERE config_id = ?1 AND kind = ?2",
            params![config_id, kind.as_db_str()],
        )?;
        Ok(n)
    }

    pub fn list_by_invitation(&self, invitation_id: &str) -> RepositoryResult<Vec<Edge>> {
        self.query(
            &format!(
                "SELECT {} FROM edge WHERE invitation_id = ?1 ORDER BY head, tail, created_at",
                EDGE_COLUMNS
            ),
            &[&invitation_id],
        )
    }

    pub fn list_by_config(&self, config_id: &str, kind: EdgeKind) -> RepositoryResult<Vec<Edge>> {
        self.query(
            &format!(
                "SELECT {} FROM edge WHERE config_id = ?1 AND kind = ?2 ORDER BY head, tail",
                EDGE_COLUMNS
            ),
            &[&config_id, &kind.as_db_str()],
        )
    }

    /// 某投稿在某 invitation 下的全部边
    pub fn list_by_head(&self, invitation_id: &str, head: &str) -> RepositoryResult<Vec<Edge>> {
        self.query(
            &format!(
                "SELECT {} FROM edge WHERE invitation_id = ?1 AND head = ?2 ORDER BY tail, created_at",
                EDGE_COLUMNS
            ),
            &[&invitation_id, &head],
        )
    }

    /// 某成员在某 invitation 下的全部边
    pub fn list_by_tail(&self, invitation_id: &str, tail: &str) -> RepositoryResult<Vec<Edge>> {
        self.query(
            &format!(
                "SELECT {} FROM edge WHERE invitation_id = ?1 AND tail = ?2 ORDER BY head, created_at",
                EDGE_COLUMNS
            ),
            &[&invitation_id, &tail],
        )
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> RepositoryResult<Vec<Edge>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, map_edge_row)?;
        rows.map(|r| r.map_err(RepositoryError::from).and_then(|e| e))
            .collect()
    }
}

fn insert_edge(conn: &Connection, edge: &Edge) -> RepositoryResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO edge ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            EDGE_COLUMNS
        ),
        params![
            edge.id,
            edge.invitation_id,
            edge.kind.as_db_str(),
            edge.head,
            edge.tail,
            edge.weight,
            edge.label,
            edge.config_id,
            serde_json::to_string(&edge.signatures)?,
            serde_json::to_string(&edge.readers)?,
            serde_json::to_string(&edge.writers)?,
            edge.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn map_edge_row(row: &Row) -> rusqlite::Result<RepositoryResult<Edge>> {
    let kind_raw: String = row.get(2)?;
    let signatures: String = row.get(8)?;
    let readers: String = row.get(9)?;
    let writers: String = row.get(10)?;
    let created_at: String = row.get(11)?;

    let id: String = row.get(0)?;
    let invitation_id: String = row.get(1)?;
    let head: String = row.get(3)?;
    let tail: String = row.get(4)?;
    let weight: f64 = row.get(5)?;
    let label: Option<String> = row.get(6)?;
    let config_id: Option<String> = row.get(7)?;

    Ok(decode_edge(
        EdgeParts {
            id,
            invitation_id,
            head,
            tail,
            weight,
            label,
            config_id,
        },
        &kind_raw,
        [&signatures, &readers, &writers],
        &created_at,
    ))
}

struct EdgeParts {
    id: String,
    invitation_id: String,
    head: String,
    tail: String,
    weight: f64,
    label: Option<String>,
    config_id: Option<String>,
}

fn decode_edge(
    parts: EdgeParts,
    kind_raw: &str,
    acl: [&str; 3],
    created_at: &str,
) -> RepositoryResult<Edge> {
    let kind = EdgeKind::from_db_str(kind_raw).ok_or_else(|| RepositoryError::FieldValueError {
        field: "kind".to_string(),
        message: format!("未知边类型: {}", kind_raw),
    })?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: "created_at".to_string(),
            message: e.to_string(),
        })?;
    Ok(Edge {
        id: parts.id,
        invitation_id: parts.invitation_id,
        kind,
        head: parts.head,
        tail: parts.tail,
        weight: parts.weight,
        label: parts.label,
        config_id: parts.config_id,
        signatures: serde_json::from_str(acl[0])?,
        readers: serde_json::from_str(acl[1])?,
        writers: serde_json::from_str(acl[2])?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn repo() -> EdgeRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        EdgeRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_insert_and_query() {
        let repo = repo();
        let edges = vec![
            Edge::new(EdgeKind::ProposedAssignment, "V/Reviewers", "V", "P1", "~A1", 0.9)
                .with_label("rev-1")
                .with_config("c1"),
            Edge::new(EdgeKind::ProposedAssignment, "V/Reviewers", "V", "P2", "~A1", 0.4)
                .with_label("rev-1")
                .with_config("c1"),
            Edge::new(EdgeKind::Conflict, "V/Reviewers", "V", "P1", "~B1", -1.0),
        ];
        assert_eq!(repo.insert_batch(&edges).unwrap(), 3);

        let proposed = repo.list_by_config("c1", EdgeKind::ProposedAssignment).unwrap();
        assert_eq!(proposed.len(), 2);
        assert_eq!(proposed[0].label.as_deref(), Some("rev-1"));
        assert_eq!(proposed[0].readers, vec!["V".to_string(), "~A1".to_string()]);

        let by_head = repo
            .list_by_head("V/Reviewers/-/Conflict", "P1")
            .unwrap();
        assert_eq!(by_head.len(), 1);
        assert_eq!(by_head[0].weight, -1.0);

        assert_eq!(repo.list_by_tail("V/Reviewers/-/Proposed_Assignment", "~A1").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_by_config() {
        let repo = repo();
        let edge = Edge::new(EdgeKind::Alternate, "V/Reviewers", "V", "P1", "~A1", 0.5).with_config("c1");
        repo.insert(&edge).unwrap();
        assert_eq!(repo.delete_by_config("c1", EdgeKind::Alternate).unwrap(), 1);
        assert!(!repo.delete_by_id(&edge.id).unwrap());
    }
}
