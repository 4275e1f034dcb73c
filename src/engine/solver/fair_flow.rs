// ==========================================
// FairFlow - 负载均衡优先的流求解器
// ==========================================
// 阶段 1: 以平均负载为中心的负载带 [⌊avg⌋-w, ⌈avg⌉+w]，w 从 0 逐步放宽直至可行
// 阶段 2: 在可行负载带内最大化总分
// 负载带放宽到成员原始上下限仍不可行 → NoSolution
// ==========================================

use super::flow::{solve_flow, FlowProblem, LOAD_WEIGHT};
use super::types::{precheck_capacity, verify_assignment, Assignment, CancellationFlag, Solver, SolverParams};
use crate::domain::types::SolverKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use tracing::instrument;

pub struct FairFlowSolver {
    // 无状态求解器
}

impl FairFlowSolver {
    pub fn new() -> Self {
        Self {}
    }

    /// 宽度 w 下每个成员的负载带（不越过原始上下限）
    fn band(graph: &ConstraintGraph, width: i64) -> (Vec<i64>, Vec<i64>, bool) {
        let members = graph.members.len().max(1) as i64;
        let demand = graph.total_demand() as i64;
        let floor_avg = demand / members;
        let ceil_avg = (demand + members - 1) / members;

        let mut lower = Vec::with_capacity(graph.members.len());
        let mut upper = Vec::with_capacity(graph.members.len());
        let mut at_bounds = true;
        for node in &graph.members {
            let min = node.capacity.min_papers as i64;
            let max = node.capacity.max_papers as i64;
            let lo = (floor_avg - width).max(min).min(max);
            let hi = (ceil_avg + width).min(max).max(lo);
            if lo != min || hi != max {
                at_bounds = false;
            }
            lower.push(lo);
            upper.push(hi);
        }
        (lower, upper, at_bounds)
    }
}

impl Default for FairFlowSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for FairFlowSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::FairFlow
    }

    #[instrument(skip_all, fields(solver = "FairFlow", papers = graph.papers.len(), members = graph.members.len()))]
    fn solve(
        &self,
        graph: &ConstraintGraph,
        _params: &SolverParams,
        cancel: &CancellationFlag,
    ) -> EngineResult<Assignment> {
        precheck_capacity(graph)?;

        let mut width: i64 = 0;
        let mut iterations: u64 = 0;
        loop {
            cancel.check()?;
            let (lower, upper, at_bounds) = Self::band(graph, width);

            let mut problem = FlowProblem::integral(graph, LOAD_WEIGHT);
            problem.member_lower = lower;
            problem.member_upper = upper;
            let outcome = solve_flow(&problem, cancel)?;
            iterations += outcome.iterations;

            if outcome.is_feasible(&problem) {
                tracing::info!(band_width = width, "负载带可行");
                let assignment = Assignment::from_pair_indices(
                    SolverKind::FairFlow,
                    graph,
                    outcome.selected_pairs(),
                    iterations,
                );
                verify_assignment(graph, &assignment)?;
                return Ok(assignment);
            }
            if at_bounds {
                return Err(EngineError::no_solution(outcome.shortfall(&problem)));
            }
            tracing::debug!(band_width = width, "负载带不可行，放宽");
            width += 1;
        }
    }
}
