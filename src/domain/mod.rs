// ==========================================
// 评审分配引擎 - 领域模型层
// ==========================================
// 职责: 定义投稿、成员、边、容量、配置等约束模型
// 红线: 不含数据访问逻辑,不含求解逻辑
// ==========================================

pub mod capacity;
pub mod configuration;
pub mod edge;
pub mod error;
pub mod member;
pub mod paper;
pub mod types;

// 重导出核心类型
pub use capacity::{CapacityOverride, LoadConstraint, MemberCapacity, PaperDemand};
pub use configuration::{AssignmentConfiguration, ConfigurationContent, NumberField};
pub use edge::{AffinityEdge, AssignmentEdge, ConflictEdge, Edge, ScoreEdge, EXCLUSION_WEIGHT};
pub use error::ValidationError;
pub use member::{Member, Profile};
pub use paper::Paper;
pub use types::{CommitteeRole, ConfigStatus, EdgeKind, SolverKind, YesNo};
