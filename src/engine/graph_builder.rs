// ==========================================
// 评审分配引擎 - 约束图构建
// ==========================================
// 职责: 投稿 × 成员 → 带权二部图（容量、排除、聚合评分）
// 红线: 冲突 weight = -1 的组合直接从图中移除
// 红线: 图构建一次后不可变，求解器只读
// ==========================================

use crate::config::settings::EngineSettings;
use crate::domain::capacity::{CapacityOverride, MemberCapacity, PaperDemand};
use crate::domain::configuration::AssignmentConfiguration;
use crate::domain::edge::{AffinityEdge, ConflictEdge, ScoreEdge};
use crate::domain::error::ValidationError;
use crate::domain::member::Member;
use crate::domain::paper::Paper;
use crate::domain::types::EdgeKind;
use crate::engine::error::EngineResult;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

// ==========================================
// 输入
// ==========================================

/// 构建约束图所需的全部协作方数据
#[derive(Debug, Clone, Default)]
pub struct GraphInputs {
    pub papers: Vec<Paper>,
    pub members: Vec<Member>,
    /// 备选组成员（配置了 alternate_group 时作为 heads）
    pub alternate_members: Option<Vec<Member>>,
    pub conflicts: Vec<ConflictEdge>,
    /// 全部评分来源的评分边（亲和度、投标、推荐）
    pub scores: Vec<ScoreEdge>,
    /// 人工指定的组合评分（覆盖聚合结果，0 分也保持可行）
    pub manual_scores: Vec<AffinityEdge>,
    /// 成员档案ID → 容量覆写
    pub member_overrides: HashMap<String, CapacityOverride>,
    /// 投稿ID → 需求覆写
    pub paper_demands: HashMap<String, u32>,
}

// ==========================================
// 输出
// ==========================================

#[derive(Debug, Clone, Serialize)]
pub struct PaperNode {
    pub paper: Paper,
    pub demand: PaperDemand,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberNode {
    pub member: Member,
    pub capacity: MemberCapacity,
}

/// 可行组合（下标指向 papers / members）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pair {
    pub paper: usize,
    pub member: usize,
    pub score: f64,
}

/// 构建报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// 没有档案ID的成员（不以 ~ 开头）
    pub no_profiles: Vec<String>,
    pub duplicates_removed: usize,
    pub excluded_by_conflict: usize,
    pub excluded_by_zero_score: usize,
    pub feasible_pairs: usize,
}

/// 约束图
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintGraph {
    pub papers: Vec<PaperNode>,
    pub members: Vec<MemberNode>,
    /// 按 (paper, member) 升序
    pub pairs: Vec<Pair>,
    pub report: BuildReport,
    #[serde(skip)]
    paper_adjacency: Vec<Vec<usize>>,
    #[serde(skip)]
    pair_lookup: HashMap<(usize, usize), usize>,
}

impl ConstraintGraph {
    /// 某篇投稿的可行组合下标
    pub fn pairs_of_paper(&self, paper: usize) -> &[usize] {
        self.paper_adjacency
            .get(paper)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn pair(&self, paper: usize, member: usize) -> Option<&Pair> {
        self.pair_lookup.get(&(paper, member)).map(|&i| &self.pairs[i])
    }

    pub fn is_feasible(&self, paper: usize, member: usize) -> bool {
        self.pair_lookup.contains_key(&(paper, member))
    }

    pub fn total_demand(&self) -> u64 {
        self.papers.iter().map(|p| p.demand.user_demand as u64).sum()
    }

    pub fn total_max_capacity(&self) -> u64 {
        self.members.iter().map(|m| m.capacity.max_papers as u64).sum()
    }

    pub fn total_min_load(&self) -> u64 {
        self.members.iter().map(|m| m.capacity.min_papers as u64).sum()
    }

    pub fn paper_index(&self, paper_id: &str) -> Option<usize> {
        self.papers.iter().position(|p| p.paper.id == paper_id)
    }

    pub fn member_index(&self, profile_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m.member.profile_id == profile_id)
    }

    fn new(papers: Vec<PaperNode>, members: Vec<MemberNode>, pairs: Vec<Pair>, report: BuildReport) -> Self {
        let mut paper_adjacency = vec![Vec::new(); papers.len()];
        let mut pair_lookup = HashMap::with_capacity(pairs.len());
        for (i, pair) in pairs.iter().enumerate() {
            paper_adjacency[pair.paper].push(i);
            pair_lookup.insert((pair.paper, pair.member), i);
        }
        Self {
            papers,
            members,
            pairs,
            report,
            paper_adjacency,
            pair_lookup,
        }
    }
}

// ==========================================
// GraphBuilder - 约束图构建器
// ==========================================
pub struct GraphBuilder<'a> {
    settings: &'a EngineSettings,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(settings: &'a EngineSettings) -> Self {
        Self { settings }
    }

    /// 构建约束图
    ///
    /// # 返回
    /// - Err(Validation(EmptyMatchGroup)): 匹配组为空
    /// - Err(Validation(EmptyAlternateGroup)): 配置了备选组但备选组为空
    /// - Err(Validation(NoPapers)): 无投稿
    #[instrument(skip(self, config, inputs), fields(
        config_id = %config.id,
        papers = inputs.papers.len(),
        members = inputs.members.len()
    ))]
    pub fn build(&self, config: &AssignmentConfiguration, inputs: &GraphInputs) -> EngineResult<ConstraintGraph> {
        let mut report = BuildReport::default();

        // ===== 1. 成员（按身份去重，保持输入顺序）=====
        if inputs.members.is_empty() {
            return Err(ValidationError::EmptyMatchGroup(config.match_group.clone()).into());
        }
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(inputs.members.len());
        for member in &inputs.members {
            if !seen.insert(member.profile_id.as_str()) {
                report.duplicates_removed += 1;
                continue;
            }
            if !member.has_profile() {
                report.no_profiles.push(member.profile_id.clone());
            }
            let capacity = MemberCapacity::resolve(
                config.min_papers,
                config.max_papers,
                inputs.member_overrides.get(&member.profile_id),
            )?;
            members.push(MemberNode {
                member: member.clone(),
                capacity,
            });
        }
        if !report.no_profiles.is_empty() {
            tracing::warn!(count = report.no_profiles.len(), "部分成员没有档案ID");
        }

        // ===== 2. 投稿（或备选组成员作为 heads）=====
        let heads: Vec<Paper> = match &config.alternate_group {
            Some(group) => {
                let alternates = inputs.alternate_members.as_deref().unwrap_or(&[]);
                if alternates.is_empty() {
                    return Err(ValidationError::EmptyAlternateGroup(group.clone()).into());
                }
                let mut seen = HashSet::new();
                alternates
                    .iter()
                    .filter(|m| seen.insert(m.profile_id.as_str()))
                    .enumerate()
                    .map(|(i, m)| Paper::from_profile(&m.profile_id, i as u32 + 1, config.venue_id()))
                    .collect()
            }
            None => {
                if inputs.papers.is_empty() {
                    return Err(ValidationError::NoPapers(config.paper_invitation.clone()).into());
                }
                inputs.papers.clone()
            }
        };

        let papers: Vec<PaperNode> = heads
            .into_iter()
            .map(|paper| {
                let user_demand = inputs
                    .paper_demands
                    .get(&paper.id)
                    .copied()
                    .unwrap_or(config.user_demand);
                PaperNode {
                    paper,
                    demand: PaperDemand {
                        user_demand,
                        alternates: config.alternates,
                    },
                }
            })
            .collect();

        // ===== 3. 排除与评分 =====
        let exclusions: HashSet<(&str, &str)> = inputs
            .conflicts
            .iter()
            .filter(|c| c.is_exclusion())
            .map(|c| (c.paper_id.as_str(), c.member_id.as_str()))
            .collect();

        let scorer = PairScorer::new(config, inputs);
        let allow_zero = config.allow_zero_score_assignments.is_yes();

        let mut pairs = Vec::new();
        for (pi, p) in papers.iter().enumerate() {
            for (mi, m) in members.iter().enumerate() {
                let key = (p.paper.id.as_str(), m.member.profile_id.as_str());
                if exclusions.contains(&key) {
                    report.excluded_by_conflict += 1;
                    continue;
                }
                let (score, manual) = scorer.score(key.0, key.1);
                if !allow_zero && !manual && score <= 0.0 {
                    report.excluded_by_zero_score += 1;
                    continue;
                }
                pairs.push(Pair {
                    paper: pi,
                    member: mi,
                    score,
                });
            }
        }
        report.feasible_pairs = pairs.len();

        tracing::info!(
            papers = papers.len(),
            members = members.len(),
            feasible_pairs = report.feasible_pairs,
            excluded_by_conflict = report.excluded_by_conflict,
            excluded_by_zero_score = report.excluded_by_zero_score,
            "约束图构建完成"
        );
        tracing::debug!(resolution = self.settings.randomized_resolution, "构建设置");

        Ok(ConstraintGraph::new(papers, members, pairs, report))
    }
}

// ==========================================
// PairScorer - 组合评分聚合
// ==========================================
// 无评分规格: 分数 = 亲和度（缺失为 0）
// 有评分规格: Σ weight_s · value_s
struct PairScorer<'a> {
    config: &'a AssignmentConfiguration,
    affinity_source: String,
    by_source: HashMap<&'a str, HashMap<(&'a str, &'a str), &'a ScoreEdge>>,
    manual: HashMap<(&'a str, &'a str), f64>,
}

impl<'a> PairScorer<'a> {
    fn new(config: &'a AssignmentConfiguration, inputs: &'a GraphInputs) -> Self {
        let mut by_source: HashMap<&str, HashMap<(&str, &str), &ScoreEdge>> = HashMap::new();
        for edge in &inputs.scores {
            by_source
                .entry(edge.source.as_str())
                .or_default()
                .insert((edge.paper_id.as_str(), edge.member_id.as_str()), edge);
        }
        let manual = inputs
            .manual_scores
            .iter()
            .map(|e| ((e.paper_id.as_str(), e.member_id.as_str()), e.weight))
            .collect();
        Self {
            config,
            affinity_source: EdgeKind::Affinity.invitation_id(&config.match_group),
            by_source,
            manual,
        }
    }

    /// 返回 (分数, 是否人工指定)
    fn score(&self, paper_id: &str, member_id: &str) -> (f64, bool) {
        if let Some(&w) = self.manual.get(&(paper_id, member_id)) {
            return (w, true);
        }
        let lookup = |source: &str| {
            self.by_source
                .get(source)
                .and_then(|m| m.get(&(paper_id, member_id)).copied())
        };

        let score = match &self.config.scores_specification {
            Some(spec) if !spec.is_empty() => spec
                .sources
                .iter()
                .map(|(source, s)| s.weight * s.value_of(lookup(source)))
                .sum(),
            _ => lookup(&self.affinity_source)
                .and_then(|e| e.weight)
                .unwrap_or(0.0),
        };
        (score, false)
    }
}
