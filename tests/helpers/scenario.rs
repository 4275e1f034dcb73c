// ==========================================
// 集成测试场景构建器
// ==========================================
// 职责: 临时数据库上的 AppState、数据集与配置构建
// ==========================================

use std::collections::BTreeMap;

use committee_assignment::api::{DatasetEdge, MatchingDataset};
use committee_assignment::app::AppState;
use committee_assignment::domain::{ConfigurationContent, EdgeKind, Paper, Profile};
use tempfile::TempDir;

pub const VENUE: &str = "V";
pub const REVIEWERS: &str = "V/Reviewers";
pub const PAPER_INVITATION: &str = "V/-/Submission";

// ==========================================
// 测试环境
// ==========================================

/// 临时目录上的完整应用状态
pub struct TestEnv {
    pub state: AppState,
    pub db_path: String,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("assignment.db").to_string_lossy().to_string();
        let state = AppState::new(db_path.clone()).await.unwrap();
        Self {
            state,
            db_path,
            _dir: dir,
        }
    }

    /// 同一数据库重新装配（模拟进程重启）
    pub async fn reopen(self) -> Self {
        let Self { state, db_path, _dir } = self;
        drop(state);
        let state = AppState::new(db_path.clone()).await.unwrap();
        Self { state, db_path, _dir }
    }

    /// 组成员（排序后）
    pub fn members(&self, group: &str) -> Vec<String> {
        let mut ids = self.state.repos.group_repo.list_member_ids(group).unwrap();
        ids.sort();
        ids
    }

    /// 配置的分配边 (paper, member)，排序后
    pub fn pairs(&self, config_id: &str, kind: EdgeKind) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .state
            .matching_api
            .list_assignments(config_id, kind)
            .unwrap()
            .into_iter()
            .map(|e| (e.paper_id, e.member_id))
            .collect();
        pairs.sort();
        pairs
    }
}

pub fn pair(p: &str, m: &str) -> (String, String) {
    (p.to_string(), m.to_string())
}

pub fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

// ==========================================
// 数据集构建器
// ==========================================

pub struct DatasetBuilder {
    match_group: String,
    dataset: MatchingDataset,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self {
            match_group: REVIEWERS.to_string(),
            dataset: MatchingDataset {
                paper_invitation: PAPER_INVITATION.to_string(),
                papers: Vec::new(),
                groups: BTreeMap::new(),
                profiles: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    /// 添加编号为 1..=n 的投稿 P1..Pn
    pub fn papers(mut self, n: u32) -> Self {
        for number in 1..=n {
            self.dataset
                .papers
                .push(Paper::new(&format!("P{}", number), number, VENUE));
        }
        self
    }

    pub fn member(mut self, profile_id: &str) -> Self {
        self.dataset
            .groups
            .entry(self.match_group.clone())
            .or_default()
            .push(profile_id.to_string());
        self.dataset.profiles.push(Profile::new(profile_id));
        self
    }

    pub fn members(mut self, profile_ids: &[&str]) -> Self {
        for id in profile_ids {
            self = self.member(id);
        }
        self
    }

    pub fn affinity(self, paper: &str, member: &str, weight: f64) -> Self {
        self.edge(EdgeKind::Affinity, paper, member, weight)
    }

    /// 排除型冲突
    pub fn conflict(self, paper: &str, member: &str) -> Self {
        self.edge(EdgeKind::Conflict, paper, member, -1.0)
    }

    /// 成员容量覆写（head 为匹配组，tail 为档案ID）
    pub fn custom_max(self, member: &str, max_papers: u32) -> Self {
        let head = self.match_group.clone();
        self.edge(EdgeKind::CustomMaxPapers, &head, member, max_papers as f64)
    }

    fn edge(mut self, kind: EdgeKind, head: &str, tail: &str, weight: f64) -> Self {
        self.dataset.edges.push(DatasetEdge {
            kind,
            match_group: self.match_group.clone(),
            invitation_id: None,
            head: head.to_string(),
            tail: tail.to_string(),
            weight,
            label: None,
        });
        self
    }

    pub fn build(self) -> MatchingDataset {
        self.dataset
    }
}

// ==========================================
// 配置构建
// ==========================================

pub fn content(title: &str, solver: &str, user_demand: u32, max_papers: u32) -> ConfigurationContent {
    ConfigurationContent {
        title: title.to_string(),
        match_group: REVIEWERS.to_string(),
        paper_invitation: PAPER_INVITATION.to_string(),
        user_demand: user_demand.to_string(),
        max_papers: max_papers.to_string(),
        min_papers: "0".to_string(),
        alternates: "0".to_string(),
        solver: solver.to_string(),
        ..Default::default()
    }
}
