// ==========================================
// 评审分配引擎 - 容量领域模型
// ==========================================
// 红线: 容量约束优先于评分
// 用途: 成员负载上下限、投稿需求人数
// ==========================================

use crate::domain::error::ValidationError;
use serde::{Deserialize, Serialize};

// ==========================================
// CapacityOverride - 成员容量覆写
// ==========================================
// 来源: Custom_Max_Papers 边、招募阶段的减负（reduced load）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityOverride {
    #[serde(default)]
    pub min_papers: Option<u32>,
    #[serde(default)]
    pub max_papers: Option<u32>,
}

impl CapacityOverride {
    pub fn max_only(max_papers: u32) -> Self {
        Self {
            min_papers: None,
            max_papers: Some(max_papers),
        }
    }

    /// 只允许降低上限（减负不会提高负载）
    pub fn lower_max(&mut self, max_papers: u32) -> bool {
        match self.max_papers {
            Some(current) if current <= max_papers => false,
            _ => {
                self.max_papers = Some(max_papers);
                true
            }
        }
    }
}

// ==========================================
// MemberCapacity - 成员节点容量
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCapacity {
    pub min_papers: u32,
    pub max_papers: u32,
}

impl MemberCapacity {
    /// 全局默认值 + 覆写解析
    ///
    /// 覆写把上限压到默认下限以下时，下限随之降低（容量覆写优先）
    pub fn resolve(
        default_min: u32,
        default_max: u32,
        override_: Option<&CapacityOverride>,
    ) -> Result<Self, ValidationError> {
        let max_papers = override_
            .and_then(|o| o.max_papers)
            .unwrap_or(default_max);
        let explicit_min = override_.and_then(|o| o.min_papers);
        let min_papers = match explicit_min {
            Some(min) => min,
            None => default_min.min(max_papers),
        };
        if min_papers > max_papers {
            return Err(ValidationError::CapacityBounds {
                min: min_papers,
                max: max_papers,
            });
        }
        Ok(Self {
            min_papers,
            max_papers,
        })
    }
}

// ==========================================
// PaperDemand - 投稿节点需求
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDemand {
    pub user_demand: u32,
    pub alternates: u32,
}

// ==========================================
// Trait: LoadConstraint
// ==========================================
// 用途: 求解器对节点负载的约束检查接口
pub trait LoadConstraint {
    /// 检查是否还能再接收一个分配
    fn can_accept(&self, current_load: u32) -> bool;

    /// 检查当前负载是否满足下限
    fn meets_minimum(&self, current_load: u32) -> bool;

    /// 剩余容量
    fn remaining(&self, current_load: u32) -> u32;
}

impl LoadConstraint for MemberCapacity {
    fn can_accept(&self, current_load: u32) -> bool {
        current_load < self.max_papers
    }

    fn meets_minimum(&self, current_load: u32) -> bool {
        current_load >= self.min_papers
    }

    fn remaining(&self, current_load: u32) -> u32 {
        self.max_papers.saturating_sub(current_load)
    }
}

impl LoadConstraint for PaperDemand {
    fn can_accept(&self, current_load: u32) -> bool {
        current_load < self.user_demand
    }

    /// 投稿需求必须被完全满足
    fn meets_minimum(&self, current_load: u32) -> bool {
        current_load >= self.user_demand
    }

    fn remaining(&self, current_load: u32) -> u32 {
        self.user_demand.saturating_sub(current_load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_defaults_without_override() {
        let cap = MemberCapacity::resolve(1, 5, None).unwrap();
        assert_eq!(cap, MemberCapacity { min_papers: 1, max_papers: 5 });
    }

    #[test]
    fn test_resolve_override_lowers_min_with_max() {
        let o = CapacityOverride::max_only(0);
        let cap = MemberCapacity::resolve(2, 5, Some(&o)).unwrap();
        assert_eq!(cap.max_papers, 0);
        assert_eq!(cap.min_papers, 0);
    }

    #[test]
    fn test_resolve_rejects_explicit_inverted_bounds() {
        let o = CapacityOverride {
            min_papers: Some(4),
            max_papers: Some(2),
        };
        assert!(matches!(
            MemberCapacity::resolve(0, 5, Some(&o)),
            Err(ValidationError::CapacityBounds { min: 4, max: 2 })
        ));
    }

    #[test]
    fn test_lower_max_never_raises() {
        let mut o = CapacityOverride::max_only(3);
        assert!(!o.lower_max(5));
        assert_eq!(o.max_papers, Some(3));
        assert!(o.lower_max(1));
        assert_eq!(o.max_papers, Some(1));
    }

    #[test]
    fn test_load_constraint() {
        let cap = MemberCapacity { min_papers: 1, max_papers: 2 };
        assert!(cap.can_accept(1));
        assert!(!cap.can_accept(2));
        assert!(!cap.meets_minimum(0));
        assert_eq!(cap.remaining(1), 1);

        let demand = PaperDemand { user_demand: 3, alternates: 0 };
        assert!(!demand.meets_minimum(2));
        assert!(demand.meets_minimum(3));
    }
}
