// ==========================================
// 评审分配引擎 - 配置层
// ==========================================
// 职责: 引擎设置、评分聚合规格、持久化覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod score_spec;
pub mod settings;
pub mod settings_reader;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager};
pub use score_spec::{ScoreSourceSpec, ScoreSpecification};
pub use settings::{EngineSettings, COMMON_EMAIL_DOMAINS};
pub use settings_reader::{SettingsReader, SettingsResult, StaticSettingsReader};
