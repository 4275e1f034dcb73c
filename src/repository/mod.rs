// ==========================================
// 评审分配引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod configuration_repo;
pub mod edge_repo;
pub mod error;
pub mod journal_repo;
pub mod member_repo;
pub mod paper_repo;
pub mod queue_repo;

// 重导出核心仓储
pub use configuration_repo::AssignmentConfigRepository;
pub use edge_repo::EdgeRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use journal_repo::{DeploymentJournalRepository, JournalAction, JournalEntry};
pub use member_repo::{GroupRepository, ProfileRepository};
pub use paper_repo::{PaperRepository, ReviewLedgerRepository};
pub use queue_repo::{RunQueueCounts, RunQueueRepository, RunTask, RunTaskStatus};
