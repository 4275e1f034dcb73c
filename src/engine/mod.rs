// ==========================================
// 评审分配引擎 - 引擎层
// ==========================================
// 职责: 约束图构建、求解调度、生命周期、部署
// 红线: Engine 不拼 SQL，存储访问全部经过 Repository
// ==========================================

pub mod deployment;
pub mod error;
pub mod events;
pub mod graph_builder;
pub mod group_template;
pub mod lifecycle;
pub mod orchestrator;
pub mod repositories;
pub mod solver;

// 重导出核心引擎
pub use deployment::{DeployOptions, DeploymentManager, DeploymentOutcome, UndeploymentOutcome};
pub use error::{EngineError, EngineResult};
pub use events::{HookRegistry, LifecycleEvent, LifecycleEventType, LifecycleHook, LoggingHook};
pub use graph_builder::{BuildReport, ConstraintGraph, GraphBuilder, GraphInputs};
pub use group_template::{GroupContext, GroupTemplate};
pub use orchestrator::{solve_matching, AssignmentOrchestrator, MatchingResult, RunOutcome};
pub use repositories::AssignmentRepositories;
pub use solver::{Assignment, CancellationFlag, SolverParams};
