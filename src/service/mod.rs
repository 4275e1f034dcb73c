// ==========================================
// 评审分配引擎 - 后台服务层
// ==========================================
// 职责: 求解任务的异步调度
// ==========================================

pub mod run_queue;

pub use run_queue::{CancelOutcome, RunScheduler};
