use super::types::{AssignedPair, Assignment};
use crate::engine::graph_builder::ConstraintGraph;
use std::cmp::Ordering;

/// 备选成员: 每篇投稿取未分配的可行成员中分数最高的 alternates 个
///
/// 同分按成员顺序，结果按 (paper, 名次) 排列
pub fn select_alternates(graph: &ConstraintGraph, assignment: &Assignment) -> Vec<AssignedPair> {
    let mut alternates = Vec::new();
    for (paper, node) in graph.papers.iter().enumerate() {
        let wanted = node.demand.alternates as usize;
        if wanted == 0 {
            continue;
        }
        let mut candidates: Vec<AssignedPair> = graph
            .pairs_of_paper(paper)
            .iter()
            .map(|&i| graph.pairs[i])
            .filter(|pair| !assignment.is_assigned(pair.paper, pair.member))
            .map(|pair| AssignedPair {
                paper: pair.paper,
                member: pair.member,
                score: pair.score,
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.member.cmp(&b.member))
        });
        alternates.extend(candidates.into_iter().take(wanted));
    }
    alternates
}
