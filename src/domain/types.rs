// ==========================================
// 评审分配引擎 - 领域类型定义
// ==========================================
// 职责: 求解器种类、配置状态、边类型、委员会角色
// 红线: 序列化字符串与外部文档字段值保持一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 求解器种类 (Solver Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverKind {
    MinMax,
    FairFlow,
    Randomized,
    FairSequence,
    PerturbedMaximization,
}

impl SolverKind {
    pub const ALL: [SolverKind; 5] = [
        SolverKind::MinMax,
        SolverKind::FairFlow,
        SolverKind::Randomized,
        SolverKind::FairSequence,
        SolverKind::PerturbedMaximization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::MinMax => "MinMax",
            SolverKind::FairFlow => "FairFlow",
            SolverKind::Randomized => "Randomized",
            SolverKind::FairSequence => "FairSequence",
            SolverKind::PerturbedMaximization => "PerturbedMaximization",
        }
    }

    /// 是否包含随机性（同输入多次运行结果可能不同）
    pub fn is_randomized(&self) -> bool {
        matches!(
            self,
            SolverKind::Randomized | SolverKind::PerturbedMaximization
        )
    }
}

impl Default for SolverKind {
    fn default() -> Self {
        SolverKind::MinMax
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "MinMax" => Ok(SolverKind::MinMax),
            "FairFlow" => Ok(SolverKind::FairFlow),
            "Randomized" => Ok(SolverKind::Randomized),
            "FairSequence" => Ok(SolverKind::FairSequence),
            "PerturbedMaximization" => Ok(SolverKind::PerturbedMaximization),
            other => Err(format!("未知求解器: {}", other)),
        }
    }
}

// ==========================================
// 配置状态 (Configuration Status)
// ==========================================
// 序列化格式: 与配置文档 status 字段枚举值一致（含空格）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigStatus {
    #[serde(rename = "Initialized")]
    Initialized,
    #[serde(rename = "Queued")]
    Queued,
    #[serde(rename = "Running")]
    Running,
    #[serde(rename = "Complete")]
    Complete,
    #[serde(rename = "Error")]
    Error,
    #[serde(rename = "No Solution")]
    NoSolution,
    #[serde(rename = "Cancelled")]
    Cancelled,
    #[serde(rename = "Deploying")]
    Deploying,
    #[serde(rename = "Deployed")]
    Deployed,
    #[serde(rename = "Deployment Error")]
    DeploymentError,
    #[serde(rename = "Undeploying")]
    Undeploying,
    #[serde(rename = "Undeployment Error")]
    UndeploymentError,
}

impl ConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Initialized => "Initialized",
            ConfigStatus::Queued => "Queued",
            ConfigStatus::Running => "Running",
            ConfigStatus::Complete => "Complete",
            ConfigStatus::Error => "Error",
            ConfigStatus::NoSolution => "No Solution",
            ConfigStatus::Cancelled => "Cancelled",
            ConfigStatus::Deploying => "Deploying",
            ConfigStatus::Deployed => "Deployed",
            ConfigStatus::DeploymentError => "Deployment Error",
            ConfigStatus::Undeploying => "Undeploying",
            ConfigStatus::UndeploymentError => "Undeployment Error",
        }
    }

    /// 求解任务是否处于活动状态（排队或运行中）
    pub fn is_active_run(&self) -> bool {
        matches!(self, ConfigStatus::Queued | ConfigStatus::Running)
    }

    /// 求解是否已结束（终态）
    pub fn is_run_terminal(&self) -> bool {
        matches!(
            self,
            ConfigStatus::Complete
                | ConfigStatus::Error
                | ConfigStatus::NoSolution
                | ConfigStatus::Cancelled
        )
    }
}

impl Default for ConfigStatus {
    fn default() -> Self {
        ConfigStatus::Initialized
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConfigStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Initialized" => Ok(ConfigStatus::Initialized),
            "Queued" => Ok(ConfigStatus::Queued),
            "Running" => Ok(ConfigStatus::Running),
            "Complete" => Ok(ConfigStatus::Complete),
            "Error" => Ok(ConfigStatus::Error),
            "No Solution" => Ok(ConfigStatus::NoSolution),
            "Cancelled" => Ok(ConfigStatus::Cancelled),
            "Deploying" => Ok(ConfigStatus::Deploying),
            "Deployed" => Ok(ConfigStatus::Deployed),
            "Deployment Error" => Ok(ConfigStatus::DeploymentError),
            "Undeploying" => Ok(ConfigStatus::Undeploying),
            "Undeployment Error" => Ok(ConfigStatus::UndeploymentError),
            other => Err(format!("未知配置状态: {}", other)),
        }
    }
}

// ==========================================
// Yes/No 枚举 (allow_zero_score_assignments)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn is_yes(&self) -> bool {
        *self == YesNo::Yes
    }
}

impl Default for YesNo {
    fn default() -> Self {
        YesNo::Yes
    }
}

impl FromStr for YesNo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Yes" => Ok(YesNo::Yes),
            "No" => Ok(YesNo::No),
            other => Err(format!("期望 Yes 或 No，实际 {}", other)),
        }
    }
}

// ==========================================
// 边类型 (Edge Kind)
// ==========================================
// 每种边对应匹配组下的一个 invitation: {match_group}/-/{suffix}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Conflict,
    Affinity,
    AggregateScore,
    CustomMaxPapers,
    CustomUserDemand,
    ProposedAssignment,
    DeployedAssignment,
    Alternate,
}

impl EdgeKind {
    pub fn invitation_suffix(&self) -> &'static str {
        match self {
            EdgeKind::Conflict => "Conflict",
            EdgeKind::Affinity => "Affinity_Score",
            EdgeKind::AggregateScore => "Aggregate_Score",
            EdgeKind::CustomMaxPapers => "Custom_Max_Papers",
            EdgeKind::CustomUserDemand => "Custom_User_Demands",
            EdgeKind::ProposedAssignment => "Proposed_Assignment",
            EdgeKind::DeployedAssignment => "Assignment",
            EdgeKind::Alternate => "Alternate_Assignment",
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            EdgeKind::Conflict => "CONFLICT",
            EdgeKind::Affinity => "AFFINITY",
            EdgeKind::AggregateScore => "AGGREGATE_SCORE",
            EdgeKind::CustomMaxPapers => "CUSTOM_MAX_PAPERS",
            EdgeKind::CustomUserDemand => "CUSTOM_USER_DEMAND",
            EdgeKind::ProposedAssignment => "PROPOSED_ASSIGNMENT",
            EdgeKind::DeployedAssignment => "DEPLOYED_ASSIGNMENT",
            EdgeKind::Alternate => "ALTERNATE",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "CONFLICT" => Some(EdgeKind::Conflict),
            "AFFINITY" => Some(EdgeKind::Affinity),
            "AGGREGATE_SCORE" => Some(EdgeKind::AggregateScore),
            "CUSTOM_MAX_PAPERS" => Some(EdgeKind::CustomMaxPapers),
            "CUSTOM_USER_DEMAND" => Some(EdgeKind::CustomUserDemand),
            "PROPOSED_ASSIGNMENT" => Some(EdgeKind::ProposedAssignment),
            "DEPLOYED_ASSIGNMENT" => Some(EdgeKind::DeployedAssignment),
            "ALTERNATE" => Some(EdgeKind::Alternate),
            _ => None,
        }
    }

    /// 生成匹配组下的 invitation id
    pub fn invitation_id(&self, match_group: &str) -> String {
        format!("{}/-/{}", match_group, self.invitation_suffix())
    }

    /// 权重合法区间（冲突 ≥ -1，亲和度 [0,1]，容量/需求为 [0,100] 的整数值）
    pub fn weight_range(&self) -> (f64, f64) {
        match self {
            EdgeKind::Conflict => (-1.0, f64::MAX),
            EdgeKind::Affinity => (0.0, 1.0),
            EdgeKind::CustomMaxPapers | EdgeKind::CustomUserDemand => (0.0, 100.0),
            _ => (f64::MIN, f64::MAX),
        }
    }

    /// 是否要求整数值权重
    pub fn requires_integer_weight(&self) -> bool {
        matches!(self, EdgeKind::CustomMaxPapers | EdgeKind::CustomUserDemand)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

// ==========================================
// 委员会角色 (Committee Role)
// ==========================================
// 由匹配组 id 的最后一段推断
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitteeRole {
    Reviewers,
    AreaChairs,
    SeniorAreaChairs,
    Other(String),
}

impl CommitteeRole {
    pub fn from_group_id(group_id: &str) -> Self {
        let name = group_id.rsplit('/').next().unwrap_or(group_id);
        match name {
            "Reviewers" => CommitteeRole::Reviewers,
            "Area_Chairs" => CommitteeRole::AreaChairs,
            "Senior_Area_Chairs" => CommitteeRole::SeniorAreaChairs,
            other => CommitteeRole::Other(other.to_string()),
        }
    }

    /// 单篇投稿下的委员会组名
    pub fn committee_name(&self) -> &str {
        match self {
            CommitteeRole::Reviewers => "Reviewers",
            CommitteeRole::AreaChairs => "Area_Chairs",
            CommitteeRole::SeniorAreaChairs => "Senior_Area_Chairs",
            CommitteeRole::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for CommitteeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.committee_name())
    }
}
