// ==========================================
// 评审分配引擎 - 委员会成员领域模型
// ==========================================
// 职责: 成员身份、成员档案（冲突计算输入）
// 红线: 成员相等性只看身份（profile_id）
// ==========================================

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

// ==========================================
// Member - 委员会成员
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub profile_id: String,       // 档案ID（边的 tail）
    pub group_membership: String, // 所属委员会组（如 .../Reviewers）
}

impl Member {
    pub fn new(profile_id: &str, group_membership: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            group_membership: group_membership.to_string(),
        }
    }

    /// 是否已关联档案（档案 id 以 ~ 开头，邮箱成员没有档案）
    pub fn has_profile(&self) -> bool {
        self.profile_id.starts_with('~')
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.profile_id == other.profile_id
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.profile_id.hash(state);
    }
}

// ==========================================
// 档案明细（冲突策略的输入）
// ==========================================

/// 任职经历
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub institution_domain: String,
    #[serde(default)]
    pub start_year: Option<i32>,
    /// None 表示至今
    #[serde(default)]
    pub end_year: Option<i32>,
}

/// 人际关系
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relation {
    pub email: String,
    /// Coauthor / Coworker / Advisor ...
    pub relation: String,
    #[serde(default)]
    pub end_year: Option<i32>,
}

/// 论文发表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    #[serde(default)]
    pub year: Option<i32>,
}

/// 成员档案
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub publications: Vec<Publication>,
}

impl Profile {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.emails.push(email.to_string());
        self
    }

    pub fn with_history(mut self, domain: &str, end_year: Option<i32>) -> Self {
        self.history.push(HistoryEntry {
            institution_domain: domain.to_string(),
            start_year: None,
            end_year,
        });
        self
    }

    pub fn with_relation(mut self, email: &str, relation: &str, end_year: Option<i32>) -> Self {
        self.relations.push(Relation {
            email: email.to_string(),
            relation: relation.to_string(),
            end_year,
        });
        self
    }

    pub fn with_publication(mut self, id: &str, year: Option<i32>) -> Self {
        self.publications.push(Publication {
            id: id.to_string(),
            year,
        });
        self
    }

    /// 所有可用于身份匹配的标识（档案ID + 邮箱）
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.emails.iter().map(|e| e.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_member_equality_by_identity() {
        let a = Member::new("~Ada_Lovelace1", "V/Reviewers");
        let b = Member::new("~Ada_Lovelace1", "V/Area_Chairs");
        assert_eq!(a, b);

        let set: HashSet<Member> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_email_member_has_no_profile() {
        assert!(!Member::new("someone@example.org", "V/Reviewers").has_profile());
        assert!(Member::new("~Some_One1", "V/Reviewers").has_profile());
    }
}
