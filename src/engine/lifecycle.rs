// ==========================================
// 评审分配引擎 - 配置生命周期状态机
// ==========================================
// Initialized → Queued → Running → {Complete | Error | No Solution | Cancelled}
// Queued → Error（构图校验失败）
// Complete → Deploying → {Deployed | Deployment Error}
// Deployed → Undeploying → {Initialized | Undeployment Error}
// ==========================================
// 红线: 同一配置最多一个 Queued/Running
// 红线: 部署只能从 Complete 出发；已部署配置必须先撤销才能重新求解
// 红线: Error 为终态，只能通过显式 reset 回到 Initialized
// ==========================================

use crate::domain::types::ConfigStatus;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{HookRegistry, LifecycleEvent};
use crate::repository::configuration_repo::AssignmentConfigRepository;
use crate::repository::error::RepositoryError;

use ConfigStatus::*;

/// 状态转换是否合法
pub fn can_transition(from: ConfigStatus, to: ConfigStatus) -> bool {
    matches!(
        (from, to),
        // 求解
        (Initialized | Complete | NoSolution | Cancelled, Queued)
            | (Queued, Running)
            | (Queued, Cancelled)
            // 构图校验失败，运行不进入 Running
            | (Queued, Error)
            | (Running, Complete | Error | NoSolution | Cancelled)
            // 部署
            | (Complete, Deploying)
            | (Deploying, Deployed | DeploymentError)
            | (DeploymentError, Deploying)
            // 撤销
            | (Deployed, Undeploying)
            | (Undeploying, Initialized | UndeploymentError)
            | (UndeploymentError, Undeploying)
            // 人工重置
            | (Complete | Error | NoSolution | Cancelled | DeploymentError, Initialized)
    )
}

/// 执行状态转换
///
/// # 返回
/// - Ok(to): 转换合法
/// - Err(InvalidStateTransition): 转换非法
pub fn transition(from: ConfigStatus, to: ConfigStatus) -> EngineResult<ConfigStatus> {
    if can_transition(from, to) {
        tracing::debug!(from = %from, to = %to, "状态转换");
        Ok(to)
    } else {
        Err(EngineError::InvalidStateTransition { from, to })
    }
}

/// 提交求解前的检查
///
/// - Queued/Running: RunConflict（不重复排队）
/// - 其余非法来源（Deployed、Error 等）: InvalidStateTransition
pub fn check_solvable(config_id: &str, status: ConfigStatus) -> EngineResult<()> {
    if status.is_active_run() {
        return Err(EngineError::RunConflict(config_id.to_string()));
    }
    transition(status, Queued).map(|_| ())
}

/// 部署前的检查（DeploymentError 允许重试）
pub fn check_deployable(status: ConfigStatus) -> EngineResult<()> {
    transition(status, Deploying).map(|_| ())
}

/// 撤销部署前的检查
///
/// # 返回
/// - Ok(true): 需要执行撤销
/// - Ok(false): 配置未部署，撤销为空操作
pub fn check_undeployable(status: ConfigStatus) -> EngineResult<bool> {
    match status {
        Deployed | UndeploymentError => Ok(true),
        Deploying | Undeploying => Err(EngineError::InvalidStateTransition {
            from: status,
            to: Undeploying,
        }),
        _ => Ok(false),
    }
}

/// 人工重置到 Initialized
pub fn reset(status: ConfigStatus) -> EngineResult<ConfigStatus> {
    transition(status, Initialized)
}

/// 求解错误 → 运行终态
pub fn run_outcome_status(result: &EngineResult<()>) -> ConfigStatus {
    match result {
        Ok(()) => Complete,
        Err(e) => e.terminal_status().unwrap_or(Error),
    }
}

/// 校验并持久化状态转换（compare-and-set），成功后触发 status_changed
///
/// # 返回
/// - Err(InvalidStateTransition): 转换非法，或存储中的状态已不是 from
pub fn commit_transition(
    repo: &AssignmentConfigRepository,
    hooks: &HookRegistry,
    config_id: &str,
    from: ConfigStatus,
    to: ConfigStatus,
    error_message: Option<&str>,
) -> EngineResult<()> {
    transition(from, to)?;
    repo.compare_and_set_status(config_id, from, to, error_message)
        .map_err(|e| match e {
            RepositoryError::InvalidStateTransition { from: actual, .. } => {
                match actual.parse::<ConfigStatus>() {
                    Ok(actual) => EngineError::InvalidStateTransition { from: actual, to },
                    Err(msg) => EngineError::Storage(msg),
                }
            }
            other => other.into(),
        })?;
    tracing::info!(config_id, from = %from, to = %to, "配置状态已更新");
    hooks.fire(&LifecycleEvent::status_changed(config_id, from, to));
    Ok(())
}
