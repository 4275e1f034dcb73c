// ==========================================
// 评审分配引擎 - 导入层（冲突与评分提供方）
// ==========================================
// 职责: 外部数据 → 冲突边、亲和度边、容量覆写
// 支持: Excel, CSV
// ==========================================

pub mod conflict_policy;
pub mod error;
pub mod file_parser;
pub mod reduced_load;
pub mod score_importer;

// 重导出核心类型
pub use conflict_policy::{
    policy_from_settings, subdomains, ConflictComputer, ConflictPolicy, DefaultConflictPolicy,
    ProfileInfo, RecentConflictPolicy, SacTransfer,
};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRow, UniversalFileParser};
pub use reduced_load::{apply_reduced_loads, LoadChange, RecruitmentResponse};
pub use score_importer::{normalize_score, ImportReport, RowRejection, ScoreImporter};
