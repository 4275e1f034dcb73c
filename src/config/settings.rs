// ==========================================
// 评审分配引擎 - 引擎设置
// ==========================================
// 职责: 各组件构造时按引用传入的显式设置（不使用全局可变状态）
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 常见免费邮箱域名（不参与机构冲突判定）
pub const COMMON_EMAIL_DOMAINS: [&str; 13] = [
    "gmail.com",
    "qq.com",
    "126.com",
    "163.com",
    "outlook.com",
    "hotmail.com",
    "yahoo.com",
    "foxmail.com",
    "aol.com",
    "msn.com",
    "ymail.com",
    "googlemail.com",
    "live.com",
];

/// 引擎设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    // ===== 容量默认值 =====
    pub default_user_demand: u32,
    pub default_max_papers: u32,
    pub default_min_papers: u32,
    pub default_alternates: u32,

    // ===== 冲突策略 =====
    /// None 表示使用全部历史
    pub conflict_lookback_years: Option<i32>,
    pub common_email_domains: Vec<String>,

    // ===== 求解器 =====
    /// Randomized 求解器分数松弛的分辨率（每单位流量拆成多少份）
    pub randomized_resolution: u32,

    // ===== 调度 =====
    pub worker_poll_interval_ms: u64,
    pub max_parallel_runs: usize,

    // ===== 部署 =====
    /// 单篇投稿委员会组 id 模板
    pub committee_group_template: String,

    // ===== 生命周期钩子（事件名 → 钩子名列表）=====
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<String>>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_user_demand: 3,
            default_max_papers: 5,
            default_min_papers: 0,
            default_alternates: 5,
            conflict_lookback_years: None,
            common_email_domains: COMMON_EMAIL_DOMAINS.iter().map(|d| d.to_string()).collect(),
            randomized_resolution: 100,
            worker_poll_interval_ms: 1_000,
            max_parallel_runs: 2,
            committee_group_template: "{venue_id}/Submission{number}/{committee}".to_string(),
            hooks: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms.max(10))
    }

    /// 某个生命周期事件上登记的钩子名
    pub fn hooks_for(&self, event: &str) -> &[String] {
        self.hooks.get(event).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
