// ==========================================
// Randomized - 概率上限随机化求解器
// ==========================================
// 1. 以精度 K 求分数松弛: 容量 ×K，每个组合容量 ⌊Q·K⌋（选中概率 ≤ Q）
// 2. 二部图相依舍入（dependent rounding）: 边际概率不变，投稿人数精确满足
// 3. 记录 期望分 / 确定性最优分 = randomized_fraction_of_opt
// Q = 1 时退化为 MinMax
// ==========================================

use super::flow::{solve_flow, FlowProblem};
use super::minmax::MinMaxSolver;
use super::types::{precheck_capacity, verify_assignment, Assignment, CancellationFlag, Solver, SolverParams};
use crate::domain::types::SolverKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::instrument;

pub struct RandomizedSolver {
    // 无状态求解器
}

impl RandomizedSolver {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for RandomizedSolver {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl Solver for RandomizedSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::Randomized
    }

    #[instrument(skip_all, fields(
        solver = "Randomized",
        papers = graph.papers.len(),
        members = graph.members.len(),
        probability_limit = params.probability_limit
    ))]
    fn solve(
        &self,
        graph: &ConstraintGraph,
        params: &SolverParams,
        cancel: &CancellationFlag,
    ) -> EngineResult<Assignment> {
        precheck_capacity(graph)?;

        if params.probability_limit >= 1.0 {
            let mut assignment = MinMaxSolver::new().solve(graph, params, cancel)?;
            assignment.solver = SolverKind::Randomized;
            assignment.randomized_fraction_of_opt = Some(1.0);
            return Ok(assignment);
        }

        // ===== 确定性最优 =====
        let opt_problem = FlowProblem::integral(graph, 0);
        let opt = solve_flow(&opt_problem, cancel)?;
        if !opt.is_feasible(&opt_problem) {
            return Err(EngineError::no_solution(opt.shortfall(&opt_problem)));
        }
        let opt_score: f64 = opt.selected_pairs().map(|i| graph.pairs[i].score).sum();

        // ===== 分数松弛 =====
        let k = params.resolution.max(1) as i64;
        let scale = |v: u32| (v as i64).checked_mul(k).ok_or_else(overflow);
        let mut problem = FlowProblem::integral(graph, 0);
        problem.member_lower = graph
            .members
            .iter()
            .map(|m| scale(m.capacity.min_papers))
            .collect::<EngineResult<_>>()?;
        problem.member_upper = graph
            .members
            .iter()
            .map(|m| scale(m.capacity.max_papers))
            .collect::<EngineResult<_>>()?;
        problem.paper_demand = graph
            .papers
            .iter()
            .map(|p| scale(p.demand.user_demand))
            .collect::<EngineResult<_>>()?;
        problem.pair_capacity = ((params.probability_limit * k as f64).floor() as i64).clamp(1, k);

        let relaxed = solve_flow(&problem, cancel)?;
        if !relaxed.is_feasible(&problem) {
            return Err(EngineError::no_solution(format!(
                "概率上限 {} 下无可行分数解: {}",
                params.probability_limit,
                relaxed.shortfall(&problem)
            )));
        }

        let expected: f64 = graph
            .pairs
            .iter()
            .zip(&relaxed.pair_flow)
            .map(|(pair, &f)| pair.score * f as f64 / k as f64)
            .sum();
        let fraction = if opt_score.abs() < f64::EPSILON {
            1.0
        } else {
            expected / opt_score
        };

        // ===== 相依舍入 =====
        let mut rng = seeded_rng(params.seed);
        let mut flows = relaxed.pair_flow.clone();
        let rounds = dependent_rounding(graph, &mut flows, k, &mut rng, cancel)?;

        let selected = flows
            .iter()
            .enumerate()
            .filter(|(_, f)| **f == k)
            .map(|(i, _)| i);
        let mut assignment = Assignment::from_pair_indices(
            SolverKind::Randomized,
            graph,
            selected,
            opt.iterations + relaxed.iterations + rounds,
        );
        assignment.randomized_fraction_of_opt = Some(fraction);
        verify_assignment(graph, &assignment)?;
        audit_fraction(fraction, params.probability_limit);

        tracing::info!(
            expected_score = expected,
            opt_score,
            fraction_of_opt = fraction,
            "随机化求解完成"
        );
        Ok(assignment)
    }
}

/// 期望分占最优分的比例低于概率上限时告警，供审计
///
/// # 返回
/// - true: 比例不低于上限
pub(crate) fn audit_fraction(fraction: f64, probability_limit: f64) -> bool {
    if fraction + 1e-9 < probability_limit {
        tracing::warn!(
            fraction_of_opt = fraction,
            probability_limit,
            "随机化期望分占最优分比例低于概率上限"
        );
        return false;
    }
    true
}

fn overflow() -> EngineError {
    EngineError::SolverFault("随机化容量放大溢出".to_string())
}

/// 二部图相依舍入
///
/// 每轮在分数边（流量不是 K 的倍数）构成的子图中找一个环或极大路径，
/// 交替加减使至少一条边变为整数。投稿的分数边度数不会为 1，
/// 因此路径端点都是成员，投稿人数保持不变。
///
/// # 返回
/// - 舍入轮数
fn dependent_rounding(
    graph: &ConstraintGraph,
    flows: &mut [i64],
    k: i64,
    rng: &mut StdRng,
    cancel: &CancellationFlag,
) -> EngineResult<u64> {
    let member_count = graph.members.len();
    let vertex_count = member_count + graph.papers.len();
    let ends = |e: usize| (graph.pairs[e].member, member_count + graph.pairs[e].paper);

    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    let mut frac_degree = vec![0usize; vertex_count];
    for e in 0..graph.pairs.len() {
        let (a, b) = ends(e);
        incident[a].push(e);
        incident[b].push(e);
        if flows[e] % k != 0 {
            frac_degree[a] += 1;
            frac_degree[b] += 1;
        }
    }

    let mut rounds = 0u64;
    loop {
        cancel.check()?;
        let start = frac_degree
            .iter()
            .position(|&d| d == 1)
            .or_else(|| frac_degree.iter().position(|&d| d > 0));
        let Some(start) = start else {
            return Ok(rounds);
        };
        rounds += 1;

        // ===== 找环或极大路径 =====
        let mut visited: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut walk_edges: Vec<usize> = Vec::new();
        let mut current = start;
        let mut came_by: Option<usize> = None;
        let chain: Vec<usize> = loop {
            let next = incident[current]
                .iter()
                .copied()
                .find(|&e| flows[e] % k != 0 && Some(e) != came_by);
            let Some(e) = next else {
                break walk_edges;
            };
            let (a, b) = ends(e);
            let other = if a == current { b } else { a };
            walk_edges.push(e);
            if let Some(&pos) = visited.get(&other) {
                break walk_edges.split_off(pos);
            }
            visited.insert(other, walk_edges.len());
            came_by = Some(e);
            current = other;
        };
        if chain.is_empty() {
            return Err(EngineError::SolverFault("相依舍入出现孤立分数边".to_string()));
        }

        // ===== 交替调整 =====
        let residue = |e: usize| flows[e].rem_euclid(k);
        let mut alpha = i64::MAX;
        let mut beta = i64::MAX;
        for (i, &e) in chain.iter().enumerate() {
            let r = residue(e);
            if i % 2 == 0 {
                alpha = alpha.min(k - r);
                beta = beta.min(r);
            } else {
                alpha = alpha.min(r);
                beta = beta.min(k - r);
            }
        }
        let raise_even = rng.gen_range(0..alpha + beta) < beta;
        for (i, &e) in chain.iter().enumerate() {
            let even = i % 2 == 0;
            let delta = if raise_even {
                if even {
                    alpha
                } else {
                    -alpha
                }
            } else if even {
                -beta
            } else {
                beta
            };
            flows[e] += delta;
            if flows[e] % k == 0 {
                let (a, b) = ends(e);
                frac_degree[a] -= 1;
                frac_degree[b] -= 1;
            }
        }
    }
}
