// ==========================================
// 评审分配引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供命令行与后台服务调用
// ==========================================

pub mod error;
pub mod matching_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use matching_api::{
    venue_of, ConfigurationStatusView, DatasetEdge, DatasetSummary, MatchingApi, MatchingDataset,
};
