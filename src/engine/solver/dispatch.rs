use super::fair_flow::FairFlowSolver;
use super::fair_sequence::FairSequenceSolver;
use super::minmax::MinMaxSolver;
use super::perturbed::PerturbedMaximizationSolver;
use super::randomized::RandomizedSolver;
use super::types::{Assignment, CancellationFlag, Solver, SolverParams};
use crate::domain::types::SolverKind;
use crate::engine::error::EngineResult;
use crate::engine::graph_builder::ConstraintGraph;
use std::time::Instant;
use tracing::instrument;

/// 按求解器种类取实现
pub fn dispatch(kind: SolverKind) -> Box<dyn Solver> {
    match kind {
        SolverKind::MinMax => Box::new(MinMaxSolver::new()),
        SolverKind::FairFlow => Box::new(FairFlowSolver::new()),
        SolverKind::FairSequence => Box::new(FairSequenceSolver::new()),
        SolverKind::Randomized => Box::new(RandomizedSolver::new()),
        SolverKind::PerturbedMaximization => Box::new(PerturbedMaximizationSolver::new()),
    }
}

/// 调度求解（记录耗时、目标值、迭代次数）
#[instrument(skip(graph, params, cancel), fields(solver = %kind))]
pub fn solve(
    graph: &ConstraintGraph,
    kind: SolverKind,
    params: &SolverParams,
    cancel: &CancellationFlag,
) -> EngineResult<Assignment> {
    let started = Instant::now();
    tracing::info!(
        papers = graph.papers.len(),
        members = graph.members.len(),
        feasible_pairs = graph.pairs.len(),
        "求解开始"
    );

    let result = dispatch(kind).solve(graph, params, cancel);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(assignment) => tracing::info!(
            elapsed_ms,
            objective = assignment.objective,
            iterations = assignment.iterations,
            assigned = assignment.pairs.len(),
            "求解完成"
        ),
        Err(e) => tracing::warn!(elapsed_ms, error = %e, "求解未得到分配"),
    }
    result
}
