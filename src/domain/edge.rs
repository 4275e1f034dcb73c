// ==========================================
// 评审分配引擎 - 边记录领域模型
// ==========================================
// 职责: 冲突/亲和度/容量/分配边的统一记录与类型化视图
// 红线: 冲突边 weight = -1 即硬排除
// ==========================================

use crate::domain::error::ValidationError;
use crate::domain::types::EdgeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 硬排除的冲突权重
pub const EXCLUSION_WEIGHT: f64 = -1.0;

// ==========================================
// Edge - 边记录（外部接口格式）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub invitation_id: String,
    pub kind: EdgeKind,
    pub head: String, // 投稿ID（或 SAC 匹配中的 AC 档案ID）
    pub tail: String, // 成员档案ID
    pub weight: f64,
    #[serde(default)]
    pub label: Option<String>,
    /// 产生该边的分配配置（仅分配类边）
    #[serde(default)]
    pub config_id: Option<String>,
    pub signatures: Vec<String>,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// 创建边记录（读者为会议与成员本人，写者/签名为会议）
    pub fn new(
        kind: EdgeKind,
        match_group: &str,
        venue_id: &str,
        head: &str,
        tail: &str,
        weight: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invitation_id: kind.invitation_id(match_group),
            kind,
            head: head.to_string(),
            tail: tail.to_string(),
            weight,
            label: None,
            config_id: None,
            signatures: vec![venue_id.to_string()],
            readers: vec![venue_id.to_string(), tail.to_string()],
            writers: vec![venue_id.to_string()],
            created_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_config(mut self, config_id: &str) -> Self {
        self.config_id = Some(config_id.to_string());
        self
    }

    /// 按边类型校验权重
    pub fn validate_weight(&self) -> Result<(), ValidationError> {
        let (min, max) = self.kind.weight_range();
        let integral_ok = !self.kind.requires_integer_weight() || self.weight.fract() == 0.0;
        if !self.weight.is_finite() || self.weight < min || self.weight > max || !integral_ok {
            return Err(ValidationError::InvalidWeight {
                kind: self.kind.to_string(),
                head: self.head.clone(),
                tail: self.tail.clone(),
                weight: self.weight,
            });
        }
        Ok(())
    }
}

// ==========================================
// 类型化视图
// ==========================================

/// 冲突边
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEdge {
    pub paper_id: String,
    pub member_id: String,
    pub weight: f64,
    #[serde(default)]
    pub label: Option<String>,
}

impl ConflictEdge {
    pub fn exclusion(paper_id: &str, member_id: &str) -> Self {
        Self {
            paper_id: paper_id.to_string(),
            member_id: member_id.to_string(),
            weight: EXCLUSION_WEIGHT,
            label: Some("Conflict".to_string()),
        }
    }

    /// weight = -1 为硬排除，非负权重仅作提示
    pub fn is_exclusion(&self) -> bool {
        self.weight <= EXCLUSION_WEIGHT
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.weight.is_finite() || self.weight < EXCLUSION_WEIGHT {
            return Err(ValidationError::InvalidWeight {
                kind: EdgeKind::Conflict.to_string(),
                head: self.paper_id.clone(),
                tail: self.member_id.clone(),
                weight: self.weight,
            });
        }
        Ok(())
    }
}

/// 亲和度边
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityEdge {
    pub paper_id: String,
    pub member_id: String,
    pub weight: f64,
}

impl AffinityEdge {
    pub fn new(paper_id: &str, member_id: &str, weight: f64) -> Self {
        Self {
            paper_id: paper_id.to_string(),
            member_id: member_id.to_string(),
            weight,
        }
    }
}

/// 通用评分边（按评分来源区分：亲和度、投标、推荐等）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEdge {
    /// 评分来源（invitation id）
    pub source: String,
    pub paper_id: String,
    pub member_id: String,
    #[serde(default)]
    pub weight: Option<f64>,
    /// 标签型评分（如投标 "Very High"）
    #[serde(default)]
    pub label: Option<String>,
}

impl ScoreEdge {
    pub fn weighted(source: &str, paper_id: &str, member_id: &str, weight: f64) -> Self {
        Self {
            source: source.to_string(),
            paper_id: paper_id.to_string(),
            member_id: member_id.to_string(),
            weight: Some(weight),
            label: None,
        }
    }

    pub fn labelled(source: &str, paper_id: &str, member_id: &str, label: &str) -> Self {
        Self {
            source: source.to_string(),
            paper_id: paper_id.to_string(),
            member_id: member_id.to_string(),
            weight: None,
            label: Some(label.to_string()),
        }
    }
}

/// 分配边（Proposed / Deployed / Alternate）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentEdge {
    pub paper_id: String,
    pub member_id: String,
    pub weight: f64,
    pub label: String,
}

impl AssignmentEdge {
    pub fn to_edge(
        &self,
        kind: EdgeKind,
        match_group: &str,
        venue_id: &str,
        config_id: &str,
    ) -> Edge {
        Edge::new(
            kind,
            match_group,
            venue_id,
            &self.paper_id,
            &self.member_id,
            self.weight,
        )
        .with_label(&self.label)
        .with_config(config_id)
    }

    pub fn from_edge(edge: &Edge) -> Self {
        Self {
            paper_id: edge.head.clone(),
            member_id: edge.tail.clone(),
            weight: edge.weight,
            label: edge.label.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_readers_include_tail() {
        let edge = Edge::new(EdgeKind::Affinity, "V/Reviewers", "V", "P1", "~R1", 0.5);
        assert_eq!(edge.invitation_id, "V/Reviewers/-/Affinity_Score");
        assert_eq!(edge.readers, vec!["V".to_string(), "~R1".to_string()]);
        assert!(edge.validate_weight().is_ok());
    }

    #[test]
    fn test_edge_weight_ranges() {
        let bad_affinity = Edge::new(EdgeKind::Affinity, "G", "V", "P1", "~R1", 1.2);
        assert!(bad_affinity.validate_weight().is_err());

        let fractional_capacity = Edge::new(EdgeKind::CustomMaxPapers, "G", "V", "G", "~R1", 2.5);
        assert!(fractional_capacity.validate_weight().is_err());

        let too_large = Edge::new(EdgeKind::CustomUserDemand, "G", "V", "P1", "G", 101.0);
        assert!(too_large.validate_weight().is_err());

        let conflict = Edge::new(EdgeKind::Conflict, "G", "V", "P1", "~R1", -1.0);
        assert!(conflict.validate_weight().is_ok());
    }

    #[test]
    fn test_conflict_exclusion() {
        assert!(ConflictEdge::exclusion("P1", "~R1").is_exclusion());
        let soft = ConflictEdge {
            paper_id: "P1".into(),
            member_id: "~R1".into(),
            weight: 0.3,
            label: None,
        };
        assert!(!soft.is_exclusion());
        assert!(soft.validate().is_ok());

        let invalid = ConflictEdge {
            weight: -2.0,
            ..soft
        };
        assert!(invalid.validate().is_err());
    }
}
