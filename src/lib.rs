// ==========================================
// 评审分配引擎 - 核心库
// ==========================================
// 职责: 委员会成员与投稿的约束匹配、求解生命周期、部署与撤销
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 构图、求解、生命周期、部署
pub mod engine;

// 导入层 - 评分/冲突文件与冲突计算
pub mod importer;

// 配置层 - 引擎设置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// 服务层 - 求解任务调度
pub mod service;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CommitteeRole, ConfigStatus, EdgeKind, SolverKind, YesNo};

// 领域实体
pub use domain::{
    AssignmentConfiguration, AssignmentEdge, ConfigurationContent, Edge, Member, Paper, Profile,
};

// 引擎
pub use engine::{
    solve_matching, AssignmentOrchestrator, DeployOptions, DeploymentManager, EngineError,
    EngineResult, GraphBuilder, MatchingResult, RunOutcome,
};

// API
pub use api::{ApiError, ApiResult, MatchingApi};

// 服务
pub use service::RunScheduler;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "评审分配引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
