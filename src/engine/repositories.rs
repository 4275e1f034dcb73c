// ==========================================
// 评审分配引擎 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合编排器与部署管理器所需的所有 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    AssignmentConfigRepository, DeploymentJournalRepository, EdgeRepository, GroupRepository,
    PaperRepository, ProfileRepository, ReviewLedgerRepository, RunQueueRepository,
};

/// 分配引擎仓储集合
///
/// 所有仓储共享同一个连接
#[derive(Clone)]
pub struct AssignmentRepositories {
    pub config_repo: Arc<AssignmentConfigRepository>,
    pub edge_repo: Arc<EdgeRepository>,
    pub paper_repo: Arc<PaperRepository>,
    pub group_repo: Arc<GroupRepository>,
    pub profile_repo: Arc<ProfileRepository>,
    pub ledger_repo: Arc<ReviewLedgerRepository>,
    pub journal_repo: Arc<DeploymentJournalRepository>,
    pub queue_repo: Arc<RunQueueRepository>,
}

impl AssignmentRepositories {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            config_repo: Arc::new(AssignmentConfigRepository::new(conn.clone())),
            edge_repo: Arc::new(EdgeRepository::new(conn.clone())),
            paper_repo: Arc::new(PaperRepository::new(conn.clone())),
            group_repo: Arc::new(GroupRepository::new(conn.clone())),
            profile_repo: Arc::new(ProfileRepository::new(conn.clone())),
            ledger_repo: Arc::new(ReviewLedgerRepository::new(conn.clone())),
            journal_repo: Arc::new(DeploymentJournalRepository::new(conn.clone())),
            queue_repo: Arc::new(RunQueueRepository::new(conn)),
        }
    }
}
