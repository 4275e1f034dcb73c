// ==========================================
// MinMax - 最小费用流求解器
// ==========================================
// 目标: 总分最大，其次成员负载尽量均匀（凸负载费用）
// 确定性: 相同约束图输出相同
// ==========================================

use super::flow::{solve_flow, FlowProblem, LOAD_WEIGHT};
use super::types::{precheck_capacity, verify_assignment, Assignment, CancellationFlag, Solver, SolverParams};
use crate::domain::types::SolverKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use tracing::instrument;

pub struct MinMaxSolver {
    // 无状态求解器
}

impl MinMaxSolver {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for MinMaxSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for MinMaxSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::MinMax
    }

    #[instrument(skip_all, fields(solver = "MinMax", papers = graph.papers.len(), members = graph.members.len()))]
    fn solve(
        &self,
        graph: &ConstraintGraph,
        _params: &SolverParams,
        cancel: &CancellationFlag,
    ) -> EngineResult<Assignment> {
        precheck_capacity(graph)?;

        let problem = FlowProblem::integral(graph, LOAD_WEIGHT);
        let outcome = solve_flow(&problem, cancel)?;
        if !outcome.is_feasible(&problem) {
            return Err(EngineError::no_solution(outcome.shortfall(&problem)));
        }

        let assignment = Assignment::from_pair_indices(
            SolverKind::MinMax,
            graph,
            outcome.selected_pairs(),
            outcome.iterations,
        );
        verify_assignment(graph, &assignment)?;
        Ok(assignment)
    }
}
