// ==========================================
// 评审分配引擎 - 最小费用流内核
// ==========================================
// 网络: 源点 → 成员（负载上下限） → 投稿（可行组合，费用 = -分数） → 汇点（需求）
// 算法: 逐次最短路（Bellman-Ford 初始势 + Dijkstra）
// 红线: 全部整数费用运算使用 checked_*，溢出即求解故障
// ==========================================

use super::types::CancellationFlag;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// 分数 → 整数费用的放大倍数（保留 4 位小数）
pub(crate) const SCORE_SCALE: f64 = 10_000.0;

/// 成员第 k 个单位负载的边际费用系数（凸费用，负载均衡的次要目标）
pub(crate) const LOAD_WEIGHT: i64 = 1;

/// 浮点分数可转换的最大绝对值
const MAX_ABS_SCORE: f64 = 1.0e12;

const SOURCE: usize = 0;
const SINK: usize = 1;

/// 分数转费用（越高分费用越低）
pub(crate) fn score_cost(score: f64) -> EngineResult<i64> {
    if !score.is_finite() || score.abs() > MAX_ABS_SCORE {
        return Err(EngineError::SolverFault(format!("分数超出可计算范围: {}", score)));
    }
    Ok(-((score * SCORE_SCALE).round() as i64))
}

fn overflow() -> EngineError {
    EngineError::SolverFault("费用计算数值溢出".to_string())
}

// ==========================================
// FlowProblem - 流网络参数
// ==========================================
pub(crate) struct FlowProblem<'a> {
    pub graph: &'a ConstraintGraph,
    pub member_lower: Vec<i64>,
    pub member_upper: Vec<i64>,
    pub paper_demand: Vec<i64>,
    /// 每个可行组合的容量（整数解为 1）
    pub pair_capacity: i64,
    /// 每个可行组合用于优化的分数（与 graph.pairs 对齐）
    pub pair_scores: Vec<f64>,
    /// 0 表示不加负载均衡费用
    pub load_weight: i64,
}

impl<'a> FlowProblem<'a> {
    /// 使用约束图原始容量与分数的整数问题
    pub fn integral(graph: &'a ConstraintGraph, load_weight: i64) -> Self {
        Self {
            graph,
            member_lower: graph.members.iter().map(|m| m.capacity.min_papers as i64).collect(),
            member_upper: graph.members.iter().map(|m| m.capacity.max_papers as i64).collect(),
            paper_demand: graph.papers.iter().map(|p| p.demand.user_demand as i64).collect(),
            pair_capacity: 1,
            pair_scores: graph.pairs.iter().map(|p| p.score).collect(),
            load_weight,
        }
    }

    pub fn total_demand(&self) -> i64 {
        self.paper_demand.iter().sum()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FlowOutcome {
    /// 与 graph.pairs 对齐
    pub pair_flow: Vec<i64>,
    pub member_flow: Vec<i64>,
    pub flow: i64,
    pub iterations: u64,
}

impl FlowOutcome {
    /// 需求全部满足且成员下限全部满足
    pub fn is_feasible(&self, problem: &FlowProblem<'_>) -> bool {
        self.flow == problem.total_demand()
            && self
                .member_flow
                .iter()
                .zip(&problem.member_lower)
                .all(|(f, lo)| f >= lo)
    }

    /// 流量为正的组合下标
    pub fn selected_pairs(&self) -> impl Iterator<Item = usize> + '_ {
        self.pair_flow
            .iter()
            .enumerate()
            .filter(|(_, f)| **f > 0)
            .map(|(i, _)| i)
    }

    /// 不满足时的原因
    pub fn shortfall(&self, problem: &FlowProblem<'_>) -> String {
        if self.flow < problem.total_demand() {
            return format!("仅满足需求 {}/{}", self.flow, problem.total_demand());
        }
        let below = self
            .member_flow
            .iter()
            .zip(&problem.member_lower)
            .filter(|(f, lo)| f < lo)
            .count();
        format!("{} 名成员无法达到负载下限", below)
    }
}

// ==========================================
// 残量网络
// ==========================================
#[derive(Debug, Clone)]
struct Arc {
    to: usize,
    rev: usize,
    cap: i64,
    cost: i64,
}

struct Network {
    adj: Vec<Vec<Arc>>,
}

impl Network {
    fn new(nodes: usize) -> Self {
        Self {
            adj: vec![Vec::new(); nodes],
        }
    }

    fn add_arc(&mut self, from: usize, to: usize, cap: i64, cost: i64) -> (usize, usize) {
        let fwd = self.adj[from].len();
        let bwd = self.adj[to].len();
        self.adj[from].push(Arc { to, rev: bwd, cap, cost });
        self.adj[to].push(Arc {
            to: from,
            rev: fwd,
            cap: 0,
            cost: -cost,
        });
        (from, fwd)
    }

    fn bellman_ford(&self, source: usize) -> EngineResult<Vec<Option<i64>>> {
        let n = self.adj.len();
        let mut dist: Vec<Option<i64>> = vec![None; n];
        dist[source] = Some(0);
        for _ in 0..n {
            let mut changed = false;
            for u in 0..n {
                let Some(du) = dist[u] else { continue };
                for arc in self.adj[u].iter().filter(|a| a.cap > 0) {
                    let nd = du.checked_add(arc.cost).ok_or_else(overflow)?;
                    if dist[arc.to].map_or(true, |d| nd < d) {
                        dist[arc.to] = Some(nd);
                        changed = true;
                    }
                }
            }
            if !changed {
                return Ok(dist);
            }
        }
        Err(EngineError::SolverFault("残量网络存在负环".to_string()))
    }

    /// 约化费用下的最短路（前驱: 节点, 弧下标）
    fn dijkstra(
        &self,
        source: usize,
        potential: &[Option<i64>],
    ) -> EngineResult<(Vec<Option<i64>>, Vec<Option<(usize, usize)>>)> {
        let n = self.adj.len();
        let mut dist: Vec<Option<i64>> = vec![None; n];
        let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        dist[source] = Some(0);
        heap.push(Reverse((0i64, source)));

        while let Some(Reverse((d, u))) = heap.pop() {
            if dist[u].map_or(false, |best| d > best) {
                continue;
            }
            let Some(hu) = potential[u] else { continue };
            for (idx, arc) in self.adj[u].iter().enumerate() {
                if arc.cap <= 0 {
                    continue;
                }
                let Some(hv) = potential[arc.to] else { continue };
                let reduced = arc
                    .cost
                    .checked_add(hu)
                    .and_then(|c| c.checked_sub(hv))
                    .ok_or_else(overflow)?;
                let nd = d.checked_add(reduced.max(0)).ok_or_else(overflow)?;
                if dist[arc.to].map_or(true, |best| nd < best) {
                    dist[arc.to] = Some(nd);
                    prev[arc.to] = Some((u, idx));
                    heap.push(Reverse((nd, arc.to)));
                }
            }
        }
        Ok((dist, prev))
    }
}

// ==========================================
// 求解入口
// ==========================================

/// 最小费用最大流（流量上限为总需求）
///
/// 成员下限通过 -BIG 费用的弧强制优先使用，BIG 大于任意增广路的费用绝对值
pub(crate) fn solve_flow(problem: &FlowProblem<'_>, cancel: &CancellationFlag) -> EngineResult<FlowOutcome> {
    let graph = problem.graph;
    let member_count = graph.members.len();
    let paper_count = graph.papers.len();
    let member_node = |m: usize| 2 + m;
    let paper_node = |p: usize| 2 + member_count + p;

    let pair_costs = problem
        .pair_scores
        .iter()
        .map(|&s| score_cost(s))
        .collect::<EngineResult<Vec<i64>>>()?;

    // ===== 计算 BIG =====
    let mut bound: i64 = 1;
    for c in &pair_costs {
        bound = bound.checked_add(c.abs()).ok_or_else(overflow)?;
    }
    if problem.load_weight > 0 {
        for &hi in &problem.member_upper {
            let top = hi.checked_mul(problem.load_weight).ok_or_else(overflow)?;
            let sum = top.checked_mul(hi).ok_or_else(overflow)?;
            bound = bound.checked_add(sum).ok_or_else(overflow)?;
        }
    }
    let big = bound;

    // ===== 建网 =====
    let mut net = Network::new(2 + member_count + paper_count);
    for m in 0..member_count {
        let lo = problem.member_lower[m].min(problem.member_upper[m]);
        let hi = problem.member_upper[m];
        if lo > 0 {
            net.add_arc(SOURCE, member_node(m), lo, -big);
        }
        if problem.load_weight == 0 {
            if hi > lo {
                net.add_arc(SOURCE, member_node(m), hi - lo, 0);
            }
        } else {
            for k in lo..hi {
                let cost = k.checked_mul(problem.load_weight).ok_or_else(overflow)?;
                net.add_arc(SOURCE, member_node(m), 1, cost);
            }
        }
    }
    let mut pair_arcs = Vec::with_capacity(graph.pairs.len());
    for (i, pair) in graph.pairs.iter().enumerate() {
        pair_arcs.push(net.add_arc(
            member_node(pair.member),
            paper_node(pair.paper),
            problem.pair_capacity,
            pair_costs[i],
        ));
    }
    for (p, &demand) in problem.paper_demand.iter().enumerate() {
        if demand > 0 {
            net.add_arc(paper_node(p), SINK, demand, 0);
        }
    }

    // ===== 逐次最短路增广 =====
    let target = problem.total_demand();
    let mut potential = net.bellman_ford(SOURCE)?;
    let mut flow: i64 = 0;
    let mut iterations: u64 = 0;

    while flow < target {
        cancel.check()?;
        let (dist, prev) = net.dijkstra(SOURCE, &potential)?;
        if dist[SINK].is_none() {
            break;
        }
        for (h, d) in potential.iter_mut().zip(&dist) {
            if let (Some(hv), Some(dv)) = (h.as_mut(), d) {
                *hv = hv.checked_add(*dv).ok_or_else(overflow)?;
            }
        }

        let mut push = target - flow;
        let mut v = SINK;
        while let Some((u, idx)) = prev[v] {
            push = push.min(net.adj[u][idx].cap);
            v = u;
        }
        let mut v = SINK;
        while let Some((u, idx)) = prev[v] {
            let rev = net.adj[u][idx].rev;
            net.adj[u][idx].cap -= push;
            net.adj[v][rev].cap += push;
            v = u;
        }
        flow += push;
        iterations += 1;
    }

    let pair_flow: Vec<i64> = pair_arcs
        .iter()
        .map(|&(node, idx)| problem.pair_capacity - net.adj[node][idx].cap)
        .collect();
    let mut member_flow = vec![0i64; member_count];
    for (pair, f) in graph.pairs.iter().zip(&pair_flow) {
        member_flow[pair.member] += f;
    }

    tracing::debug!(flow, target, iterations, "最小费用流增广完成");
    Ok(FlowOutcome {
        pair_flow,
        member_flow,
        flow,
        iterations,
    })
}
