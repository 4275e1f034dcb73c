use crate::config::settings::EngineSettings;
use crate::domain::capacity::LoadConstraint;
use crate::domain::configuration::{AssignmentConfiguration, DEFAULT_BAD_MATCH_THRESHOLDS};
use crate::domain::edge::AssignmentEdge;
use crate::domain::types::SolverKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ==========================================
// CancellationFlag - 协作式取消标志
// ==========================================
// 求解器在主循环的迭代边界检查，不做强制中断
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 迭代边界检查
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ==========================================
// SolverParams - 求解参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverParams {
    /// Randomized: 单个组合被选中的概率上限 Q ∈ (0,1]
    pub probability_limit: f64,
    /// PerturbedMaximization: 扰动强度 ∈ [0,1]
    pub perturbation: f64,
    /// PerturbedMaximization: 坏匹配分档阈值（严格递增）
    pub bad_match_thresholds: Vec<f64>,
    /// 随机种子（None 时取系统熵）
    pub seed: Option<u64>,
    /// Randomized: 分数流的精度 K（每单位拆成 K 份）
    pub resolution: u32,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            probability_limit: 1.0,
            perturbation: 1.0,
            bad_match_thresholds: DEFAULT_BAD_MATCH_THRESHOLDS.to_vec(),
            seed: None,
            resolution: 100,
        }
    }
}

impl SolverParams {
    pub fn from_config(config: &AssignmentConfiguration, settings: &EngineSettings) -> Self {
        Self {
            probability_limit: config.randomized_probability_limits,
            perturbation: config.perturbedmaximization_perturbation,
            bad_match_thresholds: config.perturbedmaximization_bad_match_thresholds.clone(),
            seed: config.randomized_seed,
            resolution: settings.randomized_resolution.max(1),
        }
    }
}

// ==========================================
// Assignment - 求解结果
// ==========================================

/// 选中的组合（下标指向约束图）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssignedPair {
    pub paper: usize,
    pub member: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub solver: SolverKind,
    /// 按 (paper, member) 升序
    pub pairs: Vec<AssignedPair>,
    /// 总分（原始组合分，不含扰动）
    pub objective: f64,
    pub iterations: u64,
    /// 仅 Randomized: 期望分 / 最优分
    pub randomized_fraction_of_opt: Option<f64>,
}

impl Assignment {
    /// 由约束图中可行组合的下标生成结果
    pub(crate) fn from_pair_indices(
        solver: SolverKind,
        graph: &ConstraintGraph,
        indices: impl IntoIterator<Item = usize>,
        iterations: u64,
    ) -> Self {
        let mut pairs: Vec<AssignedPair> = indices
            .into_iter()
            .map(|i| {
                let p = graph.pairs[i];
                AssignedPair {
                    paper: p.paper,
                    member: p.member,
                    score: p.score,
                }
            })
            .collect();
        pairs.sort_by(|a, b| (a.paper, a.member).cmp(&(b.paper, b.member)));
        let objective = pairs.iter().map(|p| p.score).sum();
        Self {
            solver,
            pairs,
            objective,
            iterations,
            randomized_fraction_of_opt: None,
        }
    }

    pub fn paper_loads(&self, graph: &ConstraintGraph) -> Vec<u32> {
        let mut loads = vec![0u32; graph.papers.len()];
        for p in &self.pairs {
            loads[p.paper] += 1;
        }
        loads
    }

    pub fn member_loads(&self, graph: &ConstraintGraph) -> Vec<u32> {
        let mut loads = vec![0u32; graph.members.len()];
        for p in &self.pairs {
            loads[p.member] += 1;
        }
        loads
    }

    pub fn is_assigned(&self, paper: usize, member: usize) -> bool {
        self.pairs
            .binary_search_by(|p| (p.paper, p.member).cmp(&(paper, member)))
            .is_ok()
    }

    /// 转换为分配边（head = 投稿ID, tail = 成员档案ID）
    pub fn to_edges(&self, graph: &ConstraintGraph, label: &str) -> Vec<AssignmentEdge> {
        self.pairs
            .iter()
            .map(|p| AssignmentEdge {
                paper_id: graph.papers[p.paper].paper.id.clone(),
                member_id: graph.members[p.member].member.profile_id.clone(),
                weight: p.score,
                label: label.to_string(),
            })
            .collect()
    }
}

// ==========================================
// Trait: Solver
// ==========================================
pub trait Solver: Send + Sync {
    fn kind(&self) -> SolverKind;

    /// 求解
    ///
    /// # 返回
    /// - Err(NoSolution): 容量与排除约束下无法满足全部投稿需求
    /// - Err(SolverFault): 数值溢出等内部故障
    /// - Err(Cancelled): 迭代边界检测到取消
    fn solve(
        &self,
        graph: &ConstraintGraph,
        params: &SolverParams,
        cancel: &CancellationFlag,
    ) -> EngineResult<Assignment>;
}

/// 校验求解结果满足全部硬约束
///
/// 不可行组合、重复组合、超上限属于求解器故障；需求或下限未满足属于无解
pub(crate) fn verify_assignment(graph: &ConstraintGraph, assignment: &Assignment) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(assignment.pairs.len());
    for p in &assignment.pairs {
        if !graph.is_feasible(p.paper, p.member) {
            return Err(EngineError::SolverFault(format!(
                "输出了不可行组合: paper={} member={}",
                graph.papers[p.paper].paper.id, graph.members[p.member].member.profile_id
            )));
        }
        if !seen.insert((p.paper, p.member)) {
            return Err(EngineError::SolverFault("输出了重复组合".to_string()));
        }
    }

    for (node, load) in graph.papers.iter().zip(assignment.paper_loads(graph)) {
        if load > node.demand.user_demand {
            return Err(EngineError::SolverFault(format!(
                "投稿 {} 分配数 {} 超过需求 {}",
                node.paper.id, load, node.demand.user_demand
            )));
        }
        if !node.demand.meets_minimum(load) {
            return Err(EngineError::no_solution(format!(
                "投稿 {} 需求 {} 仅满足 {}",
                node.paper.id, node.demand.user_demand, load
            )));
        }
    }

    for (node, load) in graph.members.iter().zip(assignment.member_loads(graph)) {
        if load > node.capacity.max_papers {
            return Err(EngineError::SolverFault(format!(
                "成员 {} 负载 {} 超过上限 {}",
                node.member.profile_id, load, node.capacity.max_papers
            )));
        }
        if !node.capacity.meets_minimum(load) {
            return Err(EngineError::no_solution(format!(
                "成员 {} 负载 {} 低于下限 {}",
                node.member.profile_id, load, node.capacity.min_papers
            )));
        }
    }
    Ok(())
}

/// 总需求与总容量的快速可行性判断
pub(crate) fn precheck_capacity(graph: &ConstraintGraph) -> EngineResult<()> {
    let demand = graph.total_demand();
    let capacity = graph.total_max_capacity();
    if demand > capacity {
        return Err(EngineError::no_solution(format!(
            "总需求 {} 超过成员总容量 {}",
            demand, capacity
        )));
    }
    let min_load = graph.total_min_load();
    if min_load > demand {
        return Err(EngineError::no_solution(format!(
            "成员负载下限之和 {} 超过总需求 {}",
            min_load, demand
        )));
    }
    Ok(())
}
