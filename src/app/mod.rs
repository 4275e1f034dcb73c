// ==========================================
// 评审分配引擎 - 应用层
// ==========================================
// 职责: 装配引擎组件,供命令行与后台 worker 使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
