// ==========================================
// 评审分配引擎 - 投稿仓储 / 评审台账仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::paper::Paper;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// PaperRepository - 投稿
// ==========================================
pub struct PaperRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PaperRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新投稿（invitation 为投稿所属的 paper_invitation）
    pub fn upsert(&self, paper: &Paper, invitation: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO paper (id, number, venue_id, invitation, author_ids)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                number = excluded.number,
                venue_id = excluded.venue_id,
                invitation = excluded.invitation,
                author_ids = excluded.author_ids
            "#,
            params![
                paper.id,
                paper.number,
                paper.venue_id,
                invitation,
                serde_json::to_string(&paper.author_ids)?,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Paper>> {
        let conn = self.get_conn()?;
        conn.query_row(
            "SELECT id, number, venue_id, author_ids FROM paper WHERE id = ?1",
            params![id],
            map_paper_row,
        )
        .optional()?
        .transpose()
    }

    /// 按投稿编号升序列出某 invitation 下的投稿
    pub fn list_by_invitation(&self, invitation: &str) -> RepositoryResult<Vec<Paper>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, number, venue_id, author_ids FROM paper WHERE invitation = ?1 ORDER BY number, id",
        )?;
        let rows = stmt.query_map(params![invitation], map_paper_row)?;
        rows.map(|r| r.map_err(RepositoryError::from).and_then(|p| p))
            .collect()
    }
}

fn map_paper_row(row: &Row) -> rusqlite::Result<RepositoryResult<Paper>> {
    let id: String = row.get(0)?;
    let number: u32 = row.get(1)?;
    let venue_id: String = row.get(2)?;
    let author_ids: String = row.get(3)?;
    Ok(serde_json::from_str(&author_ids)
        .map(|authors| Paper::new(&id, number, &venue_id).with_authors(authors))
        .map_err(RepositoryError::from))
}

// ==========================================
// ReviewLedgerRepository - 已提交评审台账
// ==========================================
// 用途: 已有评审的投稿拒绝覆写部署
pub struct ReviewLedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReviewLedgerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn post_review(&self, paper_id: &str, member_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO review_ledger (paper_id, member_id) VALUES (?1, ?2)",
            params![paper_id, member_id],
        )?;
        Ok(())
    }

    pub fn has_reviews(&self, paper_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM review_ledger WHERE paper_id = ?1",
            params![paper_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn shared() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn test_upsert_and_list_ordered_by_number() {
        let repo = PaperRepository::new(shared());
        repo.upsert(&Paper::new("P2", 2, "V"), "V/-/Submission").unwrap();
        repo.upsert(
            &Paper::new("P1", 1, "V").with_authors(vec!["~Au1".into()]),
            "V/-/Submission",
        )
        .unwrap();
        repo.upsert(&Paper::new("X9", 9, "W"), "W/-/Submission").unwrap();

        let papers = repo.list_by_invitation("V/-/Submission").unwrap();
        assert_eq!(papers.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["P1", "P2"]);
        assert_eq!(papers[0].author_ids, vec!["~Au1".to_string()]);

        repo.upsert(&Paper::new("P2", 5, "V"), "V/-/Submission").unwrap();
        assert_eq!(repo.find_by_id("P2").unwrap().unwrap().number, 5);
        assert!(repo.find_by_id("P3").unwrap().is_none());
    }

    #[test]
    fn test_review_ledger() {
        let ledger = ReviewLedgerRepository::new(shared());
        assert!(!ledger.has_reviews("P1").unwrap());
        ledger.post_review("P1", "~R1").unwrap();
        ledger.post_review("P1", "~R1").unwrap();
        assert!(ledger.has_reviews("P1").unwrap());
    }
}
