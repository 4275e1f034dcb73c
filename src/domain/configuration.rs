// ==========================================
// 评审分配引擎 - 分配配置领域模型
// ==========================================
// 职责: 匹配运行描述符（原始字段 → 类型化配置）
// 红线: min_papers ≤ max_papers；alternates ≥ 0
// ==========================================

use crate::config::score_spec::ScoreSpecification;
use crate::domain::error::ValidationError;
use crate::domain::types::{CommitteeRole, ConfigStatus, SolverKind, YesNo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 标题最大长度
pub const MAX_TITLE_LEN: usize = 250;

/// 默认坏匹配阈值
pub const DEFAULT_BAD_MATCH_THRESHOLDS: [f64; 3] = [0.1, 0.3, 0.5];

// ==========================================
// 原始字段（来自配置表单，整数以字符串提交）
// ==========================================

/// 数值字段：表单中可能是数字也可能是字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    Number(f64),
    Text(String),
}

impl NumberField {
    fn as_text(&self) -> String {
        match self {
            NumberField::Number(n) => n.to_string(),
            NumberField::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationContent {
    pub title: String,
    pub match_group: String,
    pub paper_invitation: String,
    #[serde(default)]
    pub alternate_group: Option<String>,
    pub user_demand: String,
    pub max_papers: String,
    pub min_papers: String,
    pub alternates: String,
    pub solver: String,
    #[serde(default)]
    pub allow_zero_score_assignments: Option<String>,
    #[serde(default)]
    pub randomized_probability_limits: Option<NumberField>,
    #[serde(default)]
    pub perturbedmaximization_perturbation: Option<NumberField>,
    #[serde(default)]
    pub perturbedmaximization_bad_match_thresholds: Option<Vec<f64>>,
    #[serde(default)]
    pub scores_specification: Option<serde_json::Value>,
    #[serde(default)]
    pub randomized_seed: Option<u64>,
}

// ==========================================
// AssignmentConfiguration - 类型化配置
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfiguration {
    pub id: String,
    pub title: String,
    pub match_group: String,
    pub paper_invitation: String,
    pub alternate_group: Option<String>,

    // ===== 容量参数 =====
    pub user_demand: u32,
    pub max_papers: u32,
    pub min_papers: u32,
    pub alternates: u32,

    // ===== 求解参数 =====
    pub solver: SolverKind,
    pub allow_zero_score_assignments: YesNo,
    pub randomized_probability_limits: f64,
    pub perturbedmaximization_perturbation: f64,
    pub perturbedmaximization_bad_match_thresholds: Vec<f64>,
    pub scores_specification: Option<ScoreSpecification>,
    pub randomized_seed: Option<u64>,

    // ===== 运行结果 =====
    pub status: ConfigStatus,
    pub error_message: Option<String>,
    pub randomized_fraction_of_opt: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentConfiguration {
    /// 校验原始字段并生成配置（状态为 Initialized）
    pub fn from_content(content: ConfigurationContent) -> Result<Self, ValidationError> {
        let title = content.title.trim().to_string();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::field(
                "title",
                format!("长度必须在 1..={} 之间", MAX_TITLE_LEN),
            ));
        }
        if content.match_group.trim().is_empty() {
            return Err(ValidationError::field("match_group", "不能为空"));
        }

        let user_demand = parse_int_string("user_demand", &content.user_demand)?;
        let max_papers = parse_int_string("max_papers", &content.max_papers)?;
        let min_papers = parse_int_string("min_papers", &content.min_papers)?;
        let alternates = parse_int_string("alternates", &content.alternates)?;
        if min_papers > max_papers {
            return Err(ValidationError::CapacityBounds {
                min: min_papers,
                max: max_papers,
            });
        }

        let solver: SolverKind = content
            .solver
            .parse()
            .map_err(|e: String| ValidationError::field("solver", e))?;

        let allow_zero_score_assignments = match content.allow_zero_score_assignments.as_deref() {
            None | Some("") => YesNo::Yes,
            Some(v) => v
                .parse()
                .map_err(|e: String| ValidationError::field("allow_zero_score_assignments", e))?,
        };

        let randomized_probability_limits = parse_float_field(
            "randomized_probability_limits",
            content.randomized_probability_limits.as_ref(),
            1.0,
        )?;
        if !(randomized_probability_limits > 0.0 && randomized_probability_limits <= 1.0) {
            return Err(ValidationError::field(
                "randomized_probability_limits",
                "必须在 (0, 1] 之间",
            ));
        }

        let perturbation = parse_float_field(
            "perturbedmaximization_perturbation",
            content.perturbedmaximization_perturbation.as_ref(),
            1.0,
        )?;
        if !(0.0..=1.0).contains(&perturbation) {
            return Err(ValidationError::field(
                "perturbedmaximization_perturbation",
                "必须在 [0, 1] 之间",
            ));
        }

        let thresholds = content
            .perturbedmaximization_bad_match_thresholds
            .unwrap_or_else(|| DEFAULT_BAD_MATCH_THRESHOLDS.to_vec());
        validate_thresholds(&thresholds)?;

        let scores_specification = match content.scores_specification {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(ScoreSpecification::from_json(value).map_err(|e| {
                ValidationError::field("scores_specification", e.to_string())
            })?),
        };

        let alternate_group = content
            .alternate_group
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title,
            match_group: content.match_group.trim().to_string(),
            paper_invitation: content.paper_invitation.trim().to_string(),
            alternate_group,
            user_demand,
            max_papers,
            min_papers,
            alternates,
            solver,
            allow_zero_score_assignments,
            randomized_probability_limits,
            perturbedmaximization_perturbation: perturbation,
            perturbedmaximization_bad_match_thresholds: thresholds,
            scores_specification,
            randomized_seed: content.randomized_seed,
            status: ConfigStatus::Initialized,
            error_message: None,
            randomized_fraction_of_opt: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 会议ID（匹配组 id 去掉最后一段）
    pub fn venue_id(&self) -> &str {
        match self.match_group.rfind('/') {
            Some(idx) => &self.match_group[..idx],
            None => &self.match_group,
        }
    }

    pub fn committee_role(&self) -> CommitteeRole {
        CommitteeRole::from_group_id(&self.match_group)
    }

    /// 是否为档案对档案的匹配（heads 来自备选组）
    pub fn matches_profiles(&self) -> bool {
        self.alternate_group.is_some()
    }
}

// ==========================================
// 字段解析辅助函数
// ==========================================

/// 解析 "[0-9]+" 形式的整数字符串
pub fn parse_int_string(field: &str, raw: &str) -> Result<u32, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::field(
            field,
            format!("期望非负整数字符串，实际 '{}'", raw),
        ));
    }
    trimmed
        .parse::<u32>()
        .map_err(|e| ValidationError::field(field, e.to_string()))
}

fn parse_float_field(
    field: &str,
    raw: Option<&NumberField>,
    default: f64,
) -> Result<f64, ValidationError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let text = raw.as_text();
    if text.is_empty() {
        return Ok(default);
    }
    let value: f64 = text
        .parse()
        .map_err(|_| ValidationError::field(field, format!("期望浮点数，实际 '{}'", text)))?;
    if !value.is_finite() {
        return Err(ValidationError::field(field, "必须为有限数"));
    }
    Ok(value)
}

fn validate_thresholds(thresholds: &[f64]) -> Result<(), ValidationError> {
    const FIELD: &str = "perturbedmaximization_bad_match_thresholds";
    for t in thresholds {
        if !t.is_finite() || *t < 0.0 || *t > 1.0 {
            return Err(ValidationError::field(FIELD, format!("阈值 {} 不在 [0, 1]", t)));
        }
    }
    if thresholds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ValidationError::field(FIELD, "阈值必须严格递增"));
    }
    Ok(())
}
