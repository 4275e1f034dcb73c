// ==========================================
// 评审分配引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 校验失败 / 无解 / 求解故障 / 取消 / 部署冲突 / 状态转换 / 存储
// ==========================================

use crate::domain::error::ValidationError;
use crate::domain::types::ConfigStatus;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ===== 校验（运行不会进入 Running）=====
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ===== 求解结果 =====
    #[error("无可行解: {reason}")]
    NoSolution { reason: String },

    #[error("求解器故障: {0}")]
    SolverFault(String),

    #[error("求解已取消")]
    Cancelled,

    // ===== 部署 =====
    #[error("部署冲突: 投稿 {paper_id} 已有其他配置 ({other_config}) 的部署分配")]
    DeploymentConflict { paper_id: String, other_config: String },

    #[error("已有评审意见提交，不能覆盖分配: {0}")]
    ReviewsPosted(String),

    // ===== 生命周期 =====
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: ConfigStatus, to: ConfigStatus },

    #[error("配置 {0} 已有排队或运行中的求解任务")]
    RunConflict(String),

    // ===== 协作方 =====
    #[error("冲突计算失败: {0}")]
    ConflictComputation(String),

    // ===== 存储 =====
    #[error("记录未找到: {0}")]
    NotFound(String),

    #[error("存储失败: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn no_solution(reason: impl Into<String>) -> Self {
        EngineError::NoSolution {
            reason: reason.into(),
        }
    }

    /// 运行结束后对应的配置状态（仅求解类错误）
    pub fn terminal_status(&self) -> Option<ConfigStatus> {
        match self {
            EngineError::NoSolution { .. } => Some(ConfigStatus::NoSolution),
            EngineError::SolverFault(_) => Some(ConfigStatus::Error),
            EngineError::Cancelled => Some(ConfigStatus::Cancelled),
            _ => None,
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                EngineError::NotFound(format!("{} {}", entity, id))
            }
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<ImportError> for EngineError {
    fn from(err: ImportError) -> Self {
        EngineError::ConflictComputation(err.to_string())
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
