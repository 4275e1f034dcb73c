// ==========================================
// 评审分配引擎 - 投稿领域模型
// ==========================================
// 红线: 一轮匹配内投稿不可变
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Paper - 投稿
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,       // 投稿ID（边的 head）
    pub number: u32,      // 投稿编号（用于组 id）
    pub venue_id: String, // 所属会议
    /// 作者ID列表（用于冲突计算）
    #[serde(default)]
    pub author_ids: Vec<String>,
}

impl Paper {
    pub fn new(id: &str, number: u32, venue_id: &str) -> Self {
        Self {
            id: id.to_string(),
            number,
            venue_id: venue_id.to_string(),
            author_ids: Vec::new(),
        }
    }

    pub fn with_authors(mut self, author_ids: Vec<String>) -> Self {
        self.author_ids = author_ids;
        self
    }

    /// 以成员档案作为匹配对象（SAC 对 AC 的匹配中，head 是 AC 档案）
    pub fn from_profile(profile_id: &str, position: u32, venue_id: &str) -> Self {
        Self::new(profile_id, position, venue_id)
    }
}
