// ==========================================
// 评审分配引擎 - API层错误类型
// ==========================================
// 职责: 把各层错误转换为面向用户的错误分类
// 分类: 校验 / 无解 / 求解故障 / 部署冲突 / 运行冲突 / 状态转换 / 未找到 / 数据库
// ==========================================

use crate::domain::error::ValidationError;
use crate::engine::error::EngineError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入与校验
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 求解
    // ==========================================
    #[error("无可行解: {0}")]
    NoSolution(String),

    #[error("求解器故障: {0}")]
    SolverFault(String),

    #[error("求解已取消")]
    Cancelled,

    #[error("运行冲突: {0}")]
    RunConflict(String),

    // ==========================================
    // 部署与生命周期
    // ==========================================
    #[error("部署冲突: paper={paper_id}, other_config={other_config}")]
    DeploymentConflict { paper_id: String, other_config: String },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 数据访问
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::SerializationError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => ApiError::ValidationError(e.to_string()),
            EngineError::NoSolution { reason } => ApiError::NoSolution(reason),
            EngineError::SolverFault(msg) => ApiError::SolverFault(msg),
            EngineError::Cancelled => ApiError::Cancelled,
            EngineError::DeploymentConflict {
                paper_id,
                other_config,
            } => ApiError::DeploymentConflict {
                paper_id,
                other_config,
            },
            EngineError::ReviewsPosted(paper_id) => ApiError::BusinessRuleViolation(format!(
                "投稿 {} 已有评审意见，不能覆盖分配",
                paper_id
            )),
            EngineError::InvalidStateTransition { from, to } => ApiError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            EngineError::RunConflict(config_id) => ApiError::RunConflict(config_id),
            EngineError::ConflictComputation(msg) => ApiError::ImportError(msg),
            EngineError::NotFound(what) => ApiError::NotFound(what),
            EngineError::Storage(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::ImportError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ConfigStatus;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "AssignmentConfiguration".to_string(),
            id: "c1".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("AssignmentConfiguration"));
                assert!(msg.contains("c1"));
            }
            _ => panic!("Expected NotFound"),
        }

        let api_err: ApiError = RepositoryError::LockError("poisoned".into()).into();
        assert!(matches!(api_err, ApiError::DatabaseConnectionError(_)));
    }

    #[test]
    fn test_engine_error_conversion() {
        let api_err: ApiError = EngineError::Validation(ValidationError::EmptyMatchGroup(
            "V/Reviewers".into(),
        ))
        .into();
        match api_err {
            ApiError::ValidationError(msg) => assert!(msg.contains("V/Reviewers")),
            _ => panic!("Expected ValidationError"),
        }

        let api_err: ApiError = EngineError::InvalidStateTransition {
            from: ConfigStatus::Deployed,
            to: ConfigStatus::Queued,
        }
        .into();
        match api_err {
            ApiError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "Deployed");
                assert_eq!(to, "Queued");
            }
            _ => panic!("Expected InvalidStateTransition"),
        }

        let api_err: ApiError = EngineError::DeploymentConflict {
            paper_id: "P1".into(),
            other_config: "c0".into(),
        }
        .into();
        assert!(matches!(api_err, ApiError::DeploymentConflict { .. }));
    }
}
