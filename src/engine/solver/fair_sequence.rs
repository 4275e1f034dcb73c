// ==========================================
// FairSequence - 轮转贪心求解器
// ==========================================
// 每一轮按当前负载升序（同负载按成员顺序）依次让成员挑选
// 其可行、未满员投稿中分数最高者（同分取投稿顺序靠前者）
// 轮转结束后仍有缺额的投稿用增广路补齐；低于下限的成员沿交替路径接手投稿
// 确定性: 无随机性，相同约束图输出相同
// ==========================================

use super::types::{precheck_capacity, verify_assignment, Assignment, CancellationFlag, Solver, SolverParams};
use crate::domain::capacity::LoadConstraint;
use crate::domain::types::SolverKind;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph_builder::ConstraintGraph;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use tracing::instrument;

pub struct FairSequenceSolver {
    // 无状态求解器
}

impl FairSequenceSolver {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for FairSequenceSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 求解过程中的可变状态
struct SequenceState<'g> {
    graph: &'g ConstraintGraph,
    /// 成员 → 可行组合（分数降序，同分投稿升序）
    member_pairs: Vec<Vec<usize>>,
    chosen: Vec<bool>,
    paper_load: Vec<u32>,
    member_load: Vec<u32>,
    iterations: u64,
}

impl<'g> SequenceState<'g> {
    fn new(graph: &'g ConstraintGraph) -> Self {
        let mut member_pairs = vec![Vec::new(); graph.members.len()];
        for (i, pair) in graph.pairs.iter().enumerate() {
            member_pairs[pair.member].push(i);
        }
        for list in &mut member_pairs {
            list.sort_by(|&a, &b| {
                let (pa, pb) = (&graph.pairs[a], &graph.pairs[b]);
                pb.score
                    .partial_cmp(&pa.score)
                    .unwrap_or(Ordering::Equal)
                    .then(pa.paper.cmp(&pb.paper))
            });
        }
        Self {
            graph,
            member_pairs,
            chosen: vec![false; graph.pairs.len()],
            paper_load: vec![0; graph.papers.len()],
            member_load: vec![0; graph.members.len()],
            iterations: 0,
        }
    }

    fn paper_open(&self, paper: usize) -> bool {
        self.graph.papers[paper].demand.can_accept(self.paper_load[paper])
    }

    fn member_open(&self, member: usize) -> bool {
        self.graph.members[member].capacity.can_accept(self.member_load[member])
    }

    fn select(&mut self, pair: usize) {
        let p = self.graph.pairs[pair];
        self.chosen[pair] = true;
        self.paper_load[p.paper] += 1;
        self.member_load[p.member] += 1;
    }

    fn deselect(&mut self, pair: usize) {
        let p = self.graph.pairs[pair];
        self.chosen[pair] = false;
        self.paper_load[p.paper] -= 1;
        self.member_load[p.member] -= 1;
    }

    // ===== 阶段 1: 轮转挑选 =====
    fn round_robin(&mut self, cancel: &CancellationFlag) -> EngineResult<()> {
        loop {
            cancel.check()?;
            self.iterations += 1;

            let mut order: Vec<usize> = (0..self.graph.members.len())
                .filter(|&m| self.member_open(m))
                .collect();
            order.sort_by_key(|&m| (self.member_load[m], m));

            let mut progressed = false;
            for m in order {
                let pick = self.member_pairs[m]
                    .iter()
                    .copied()
                    .find(|&i| !self.chosen[i] && self.paper_open(self.graph.pairs[i].paper));
                if let Some(i) = pick {
                    self.select(i);
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    // ===== 阶段 2: 增广路补齐缺额 =====
    fn fill_demand(&mut self, cancel: &CancellationFlag) -> EngineResult<()> {
        for p in 0..self.graph.papers.len() {
            while self.paper_open(p) {
                cancel.check()?;
                self.iterations += 1;
                if !self.augment(p) {
                    return Err(EngineError::no_solution(format!(
                        "投稿 {} 需求 {} 无法满足",
                        self.graph.papers[p].paper.id, self.graph.papers[p].demand.user_demand
                    )));
                }
            }
        }
        Ok(())
    }

    /// 为投稿 start 增加一名成员；路径上的中间投稿人数不变
    fn augment(&mut self, start: usize) -> bool {
        let graph = self.graph;
        // 投稿 r → (上一投稿 q, 新增组合 (q,m), 移除组合 (r,m))
        let mut parent: HashMap<usize, (usize, usize, usize)> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        parent.insert(start, (start, usize::MAX, usize::MAX));

        while let Some(q) = queue.pop_front() {
            for &i in graph.pairs_of_paper(q) {
                if self.chosen[i] {
                    continue;
                }
                let m = graph.pairs[i].member;
                if self.member_open(m) {
                    self.select(i);
                    let mut cur = q;
                    while cur != start {
                        let (prev, add, remove) = parent[&cur];
                        self.deselect(remove);
                        self.select(add);
                        cur = prev;
                    }
                    return true;
                }
                for &j in &self.member_pairs[m] {
                    let r = graph.pairs[j].paper;
                    if self.chosen[j] && r != q && !parent.contains_key(&r) {
                        parent.insert(r, (q, i, j));
                        queue.push_back(r);
                    }
                }
            }
        }
        false
    }

    // ===== 阶段 3: 交替路径补足成员下限 =====
    fn lift_minimums(&mut self, cancel: &CancellationFlag) -> EngineResult<()> {
        for m in 0..self.graph.members.len() {
            while !self.graph.members[m].capacity.meets_minimum(self.member_load[m]) {
                cancel.check()?;
                self.iterations += 1;
                if !self.lift(m) {
                    return Err(EngineError::no_solution(format!(
                        "成员 {} 无法达到负载下限 {}",
                        self.graph.members[m].member.profile_id,
                        self.graph.members[m].capacity.min_papers
                    )));
                }
            }
        }
        Ok(())
    }

    /// 为成员 start 增加一篇投稿
    ///
    /// start 接手 y1 的投稿，y1 再接手 y2 的投稿……直到让出方负载高于下限；
    /// 中间成员负载不变，投稿人数不变
    fn lift(&mut self, start: usize) -> bool {
        let graph = self.graph;
        // 让出方 y → (接手方 x, 新增组合 (p,x), 移除组合 (p,y))
        let mut parent: HashMap<usize, (usize, usize, usize)> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        parent.insert(start, (start, usize::MAX, usize::MAX));

        while let Some(x) = queue.pop_front() {
            let candidates = self.member_pairs[x].clone();
            for i in candidates {
                if self.chosen[i] {
                    continue;
                }
                for &j in graph.pairs_of_paper(graph.pairs[i].paper) {
                    let y = graph.pairs[j].member;
                    if !self.chosen[j] || parent.contains_key(&y) {
                        continue;
                    }
                    parent.insert(y, (x, i, j));
                    if self.member_load[y] > graph.members[y].capacity.min_papers {
                        let mut cur = y;
                        while cur != start {
                            let (prev, add, remove) = parent[&cur];
                            self.deselect(remove);
                            self.select(add);
                            cur = prev;
                        }
                        return true;
                    }
                    queue.push_back(y);
                }
            }
        }
        false
    }
}

impl Solver for FairSequenceSolver {
    fn kind(&self) -> SolverKind {
        SolverKind::FairSequence
    }

    #[instrument(skip_all, fields(solver = "FairSequence", papers = graph.papers.len(), members = graph.members.len()))]
    fn solve(
        &self,
        graph: &ConstraintGraph,
        _params: &SolverParams,
        cancel: &CancellationFlag,
    ) -> EngineResult<Assignment> {
        precheck_capacity(graph)?;

        let mut state = SequenceState::new(graph);
        state.round_robin(cancel)?;
        state.fill_demand(cancel)?;
        state.lift_minimums(cancel)?;

        let selected: Vec<usize> = state
            .chosen
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(i, _)| i)
            .collect();
        let assignment =
            Assignment::from_pair_indices(SolverKind::FairSequence, graph, selected, state.iterations);
        verify_assignment(graph, &assignment)?;
        Ok(assignment)
    }
}
