// ==========================================
// PerturbedMaximization - 分档扰动最大化
// ==========================================
// 扰动分 = 档位(s) + (1-p)·ŝ + p·u，u ~ U[0,1)
// 档位(s) = 不超过 s 的坏匹配阈值个数（档位之间不会被扰动反超）
// ŝ: 分数超出 [0,1]（评分规格聚合）时按全图极值线性归一到 [0,1]，档内差距不超过档间距
// p = 0 时完全确定，p = 1 时档内完全随机
// ==========================================

use super::flow::{solve_flow, FlowProblem, LOAD_WEIGHT};
use super::randomized::seeded_rng;
use super::types::{precheck_capacity, verify_assignment, Assignment, CancellationFlag, Solver, SolverParams};
use crate::domain::types::SolverKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use rand::Rng;
use tracing::instrument;

pub struct PerturbedMaximizationSolver {
    // 无状态求解器
}

impl PerturbedMaximizationSolver {
    pub fn new() -> Self {
        Self {}
    }

    /// 分数所在档位
    pub(crate) fn tier(score: f64, thresholds: &[f64]) -> usize {
        thresholds.iter().filter(|&&t| t <= score).count()
    }

    /// 档内分量（保持顺序，落在 [0,1]）
    pub(crate) fn within_tier(scores: &[f64]) -> Vec<f64> {
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if scores.is_empty() || (min >= 0.0 && max <= 1.0) {
            return scores.to_vec();
        }
        let span = max - min;
        scores
            .iter()
            .map(|&s| if span > f64::EPSILON { (s - min) / span } else { 0.0 })
            .collect()
    }
}

impl Default for PerturbedMaximizationSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for PerturbedMaximizationSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::PerturbedMaximization
    }

    #[instrument(skip_all, fields(
        solver = "PerturbedMaximization",
        papers = graph.papers.len(),
        members = graph.members.len(),
        perturbation = params.perturbation
    ))]
    fn solve(
        &self,
        graph: &ConstraintGraph,
        params: &SolverParams,
        cancel: &CancellationFlag,
    ) -> EngineResult<Assignment> {
        precheck_capacity(graph)?;

        let p = params.perturbation.clamp(0.0, 1.0);
        let mut rng = seeded_rng(params.seed);
        let mut problem = FlowProblem::integral(graph, LOAD_WEIGHT);
        let raw: Vec<f64> = graph.pairs.iter().map(|pair| pair.score).collect();
        let within = Self::within_tier(&raw);
        problem.pair_scores = raw
            .iter()
            .zip(&within)
            .map(|(&score, &normalized)| {
                let tier = Self::tier(score, &params.bad_match_thresholds) as f64;
                let noise = if p > 0.0 { rng.gen::<f64>() } else { 0.0 };
                tier + (1.0 - p) * normalized + p * noise
            })
            .collect();

        let outcome = solve_flow(&problem, cancel)?;
        if !outcome.is_feasible(&problem) {
            return Err(EngineError::no_solution(outcome.shortfall(&problem)));
        }

        let assignment = Assignment::from_pair_indices(
            SolverKind::PerturbedMaximization,
            graph,
            outcome.selected_pairs(),
            outcome.iterations,
        );
        verify_assignment(graph, &assignment)?;
        Ok(assignment)
    }
}
