use super::*;
use crate::config::settings::EngineSettings;
use crate::domain::configuration::{AssignmentConfiguration, ConfigurationContent};
use crate::domain::edge::{ConflictEdge, ScoreEdge};
use crate::domain::member::Member;
use crate::domain::paper::Paper;
use crate::domain::types::SolverKind;
use crate::engine::error::EngineError;
use crate::engine::graph_builder::{ConstraintGraph, GraphBuilder, GraphInputs};
use std::collections::HashMap;

// ==========================================
// 测试辅助函数
// ==========================================

const GROUP: &str = "V/Reviewers";

struct Fixture {
    papers: Vec<&'static str>,
    members: Vec<&'static str>,
    scores: Vec<(&'static str, &'static str, f64)>,
    conflicts: Vec<(&'static str, &'static str)>,
    demand: u32,
    min: u32,
    max: u32,
    alternates: u32,
    allow_zero: bool,
}

impl Fixture {
    fn new(papers: Vec<&'static str>, members: Vec<&'static str>) -> Self {
        Self {
            papers,
            members,
            scores: Vec::new(),
            conflicts: Vec::new(),
            demand: 1,
            min: 0,
            max: 1,
            alternates: 0,
            allow_zero: true,
        }
    }

    fn graph(&self) -> ConstraintGraph {
        let config = AssignmentConfiguration::from_content(ConfigurationContent {
            title: "solver-test".into(),
            match_group: GROUP.into(),
            paper_invitation: "V/-/Submission".into(),
            user_demand: self.demand.to_string(),
            max_papers: self.max.to_string(),
            min_papers: self.min.to_string(),
            alternates: self.alternates.to_string(),
            solver: "MinMax".into(),
            allow_zero_score_assignments: Some(if self.allow_zero { "Yes" } else { "No" }.into()),
            ..Default::default()
        })
        .unwrap();
        let affinity = format!("{}/-/Affinity_Score", GROUP);
        let inputs = GraphInputs {
            papers: self
                .papers
                .iter()
                .enumerate()
                .map(|(i, p)| Paper::new(p, i as u32 + 1, "V"))
                .collect(),
            members: self.members.iter().map(|m| Member::new(m, GROUP)).collect(),
            conflicts: self
                .conflicts
                .iter()
                .map(|(p, m)| ConflictEdge::exclusion(p, m))
                .collect(),
            scores: self
                .scores
                .iter()
                .map(|(p, m, s)| ScoreEdge::weighted(&affinity, p, m, *s))
                .collect(),
            member_overrides: HashMap::new(),
            ..Default::default()
        };
        GraphBuilder::new(&EngineSettings::default())
            .build(&config, &inputs)
            .unwrap()
    }
}

fn assigned_ids(graph: &ConstraintGraph, assignment: &Assignment) -> Vec<(String, String)> {
    assignment
        .to_edges(graph, "t")
        .into_iter()
        .map(|e| (e.paper_id, e.member_id))
        .collect()
}

fn run(graph: &ConstraintGraph, kind: SolverKind, params: &SolverParams) -> Result<Assignment, EngineError> {
    solve(graph, kind, params, &CancellationFlag::new())
}

fn seeded(seed: u64) -> SolverParams {
    SolverParams {
        seed: Some(seed),
        ..Default::default()
    }
}

/// 3 篇投稿 × 4 名成员，含冲突
fn conflicted_fixture() -> Fixture {
    let mut f = Fixture::new(vec!["P1", "P2", "P3"], vec!["~A1", "~B1", "~C1", "~D1"]);
    f.demand = 2;
    f.min = 1;
    f.max = 2;
    let grid = [
        ("P1", "~A1", 0.9),
        ("P1", "~B1", 0.7),
        ("P1", "~C1", 0.4),
        ("P1", "~D1", 0.2),
        ("P2", "~A1", 0.8),
        ("P2", "~B1", 0.3),
        ("P2", "~C1", 0.6),
        ("P2", "~D1", 0.5),
        ("P3", "~A1", 0.95),
        ("P3", "~B1", 0.1),
        ("P3", "~C1", 0.2),
        ("P3", "~D1", 0.85),
    ];
    f.scores = grid.to_vec();
    f.conflicts = vec![("P1", "~A1"), ("P3", "~D1")];
    f
}

// ==========================================
// 场景测试
// ==========================================

#[test]
fn test_minmax_picks_two_highest_and_skips_zero() {
    let mut f = Fixture::new(vec!["P1"], vec!["~A1", "~B1", "~C1"]);
    f.demand = 2;
    f.allow_zero = false;
    f.scores = vec![("P1", "~A1", 0.9), ("P1", "~B1", 0.5), ("P1", "~C1", 0.0)];
    let graph = f.graph();

    let assignment = run(&graph, SolverKind::MinMax, &SolverParams::default()).unwrap();
    assert_eq!(
        assigned_ids(&graph, &assignment),
        vec![
            ("P1".to_string(), "~A1".to_string()),
            ("P1".to_string(), "~B1".to_string())
        ]
    );
    assert!((assignment.objective - 1.4).abs() < 1e-9);
}

#[test]
fn test_every_solver_respects_exclusions_and_capacity() {
    let f = conflicted_fixture();
    let graph = f.graph();

    for kind in SolverKind::ALL {
        let params = SolverParams {
            probability_limit: 0.7,
            ..seeded(7)
        };
        let assignment = run(&graph, kind, &params)
            .unwrap_or_else(|e| panic!("{} 求解失败: {}", kind, e));
        let edges = assigned_ids(&graph, &assignment);

        assert!(!edges.contains(&("P1".to_string(), "~A1".to_string())), "{}", kind);
        assert!(!edges.contains(&("P3".to_string(), "~D1".to_string())), "{}", kind);
        assert!(assignment.paper_loads(&graph).iter().all(|&l| l == 2), "{}", kind);
        assert!(
            assignment.member_loads(&graph).iter().all(|&l| (1..=2).contains(&l)),
            "{}",
            kind
        );
    }
}

#[test]
fn test_minmax_and_fair_sequence_are_deterministic() {
    let graph = conflicted_fixture().graph();
    for kind in [SolverKind::MinMax, SolverKind::FairSequence] {
        let first = run(&graph, kind, &SolverParams::default()).unwrap();
        for _ in 0..5 {
            let again = run(&graph, kind, &SolverParams::default()).unwrap();
            assert_eq!(first.pairs, again.pairs, "{}", kind);
        }
    }
}

#[test]
fn test_insufficient_capacity_is_no_solution() {
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1"]);
    f.scores = vec![("P1", "~A1", 0.5), ("P2", "~A1", 0.5)];
    let graph = f.graph();

    for kind in SolverKind::ALL {
        let err = run(&graph, kind, &seeded(1)).unwrap_err();
        assert!(matches!(err, EngineError::NoSolution { .. }), "{}: {:?}", kind, err);
    }
}

#[test]
fn test_conflicts_leaving_paper_uncovered_is_no_solution() {
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1", "~B1"]);
    f.max = 2;
    f.conflicts = vec![("P1", "~A1"), ("P1", "~B1")];
    let graph = f.graph();

    for kind in SolverKind::ALL {
        let err = run(&graph, kind, &seeded(1)).unwrap_err();
        assert!(matches!(err, EngineError::NoSolution { .. }), "{}: {:?}", kind, err);
    }
}

#[test]
fn test_cancelled_before_first_iteration() {
    let graph = conflicted_fixture().graph();
    let cancel = CancellationFlag::new();
    cancel.cancel();
    for kind in SolverKind::ALL {
        let err = solve(&graph, kind, &seeded(3), &cancel).unwrap_err();
        assert_eq!(err, EngineError::Cancelled, "{}", kind);
    }
}

// ==========================================
// 策略差异
// ==========================================

#[test]
fn test_fair_flow_trades_score_for_balance() {
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1", "~B1"]);
    f.max = 2;
    f.scores = vec![
        ("P1", "~A1", 0.9),
        ("P2", "~A1", 0.9),
        ("P1", "~B1", 0.1),
        ("P2", "~B1", 0.2),
    ];
    let graph = f.graph();

    let minmax = run(&graph, SolverKind::MinMax, &SolverParams::default()).unwrap();
    assert_eq!(minmax.member_loads(&graph), vec![2, 0]);

    let fair = run(&graph, SolverKind::FairFlow, &SolverParams::default()).unwrap();
    assert_eq!(fair.member_loads(&graph), vec![1, 1]);
    // 均衡前提下仍取高分组合: A→P1, B→P2
    assert_eq!(
        assigned_ids(&graph, &fair),
        vec![
            ("P1".to_string(), "~A1".to_string()),
            ("P2".to_string(), "~B1".to_string())
        ]
    );
}

#[test]
fn test_fair_sequence_repairs_greedy_dead_end() {
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1", "~B1"]);
    f.scores = vec![("P1", "~A1", 0.9), ("P2", "~A1", 0.8), ("P1", "~B1", 0.5)];
    f.conflicts = vec![("P2", "~B1")];
    let graph = f.graph();

    let assignment = run(&graph, SolverKind::FairSequence, &SolverParams::default()).unwrap();
    assert_eq!(
        assigned_ids(&graph, &assignment),
        vec![
            ("P1".to_string(), "~B1".to_string()),
            ("P2".to_string(), "~A1".to_string())
        ]
    );
}

#[test]
fn test_fair_sequence_least_loaded_member_picks_first() {
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1", "~B1"]);
    f.max = 2;
    f.scores = vec![
        ("P1", "~A1", 0.9),
        ("P2", "~A1", 0.8),
        ("P1", "~B1", 0.7),
        ("P2", "~B1", 0.1),
    ];
    let graph = f.graph();

    // 第一轮 A 取 P1，B 只能取 P2
    let assignment = run(&graph, SolverKind::FairSequence, &SolverParams::default()).unwrap();
    assert_eq!(assignment.member_loads(&graph), vec![1, 1]);
    assert!(assignment.is_assigned(0, 0));
    assert!(assignment.is_assigned(1, 1));
}

#[test]
fn test_fair_sequence_lifts_minimum_through_swap_chain() {
    // 轮转后 B 持有 P2、P3，C 持有 P1，A 只能评审 P1 且负载为 0:
    // A 接手 C 的 P1，C 再接手 B 的 P2
    let mut f = Fixture::new(vec!["P1", "P2", "P3"], vec!["~B1", "~C1", "~A1"]);
    f.min = 1;
    f.max = 2;
    f.scores = vec![
        ("P1", "~B1", 0.1),
        ("P2", "~B1", 0.9),
        ("P3", "~B1", 0.8),
        ("P1", "~C1", 0.9),
        ("P2", "~C1", 0.5),
        ("P3", "~C1", 0.4),
        ("P1", "~A1", 0.5),
    ];
    f.conflicts = vec![("P2", "~A1"), ("P3", "~A1")];
    let graph = f.graph();

    assert!(run(&graph, SolverKind::MinMax, &SolverParams::default()).is_ok());
    let assignment = run(&graph, SolverKind::FairSequence, &SolverParams::default()).unwrap();
    assert_eq!(assignment.member_loads(&graph), vec![1, 1, 1]);
    let mut pairs = assigned_ids(&graph, &assignment);
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("P1".to_string(), "~A1".to_string()),
            ("P2".to_string(), "~C1".to_string()),
            ("P3".to_string(), "~B1".to_string())
        ]
    );
}

// ==========================================
// 随机化求解器
// ==========================================

#[test]
fn test_randomized_respects_probability_limit() {
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1", "~B1", "~C1", "~D1"]);
    f.scores = vec![
        ("P1", "~A1", 1.0),
        ("P1", "~B1", 0.9),
        ("P1", "~C1", 0.2),
        ("P1", "~D1", 0.1),
        ("P2", "~A1", 0.1),
        ("P2", "~B1", 0.2),
        ("P2", "~C1", 0.9),
        ("P2", "~D1", 1.0),
    ];
    let graph = f.graph();

    let runs = 400;
    let mut hits: HashMap<(usize, usize), u32> = HashMap::new();
    let mut total_score = 0.0;
    let mut fraction = 0.0;
    for seed in 0..runs {
        let params = SolverParams {
            probability_limit: 0.5,
            ..seeded(seed)
        };
        let a = run(&graph, SolverKind::Randomized, &params).unwrap();
        assert_eq!(a.paper_loads(&graph), vec![1, 1]);
        fraction = a.randomized_fraction_of_opt.unwrap();
        total_score += a.objective;
        for p in &a.pairs {
            *hits.entry((p.paper, p.member)).or_default() += 1;
        }
    }

    // 期望分 = 0.5·(1.0+0.9) + 0.5·(1.0+0.9) = 1.9，最优 = 2.0
    assert!((fraction - 0.95).abs() < 1e-9);
    for (_, count) in hits {
        assert!(count as f64 / runs as f64 <= 0.5 + 0.08);
    }
    let mean = total_score / runs as f64;
    assert!((mean - 1.9).abs() < 0.05, "mean={}", mean);
}

#[test]
fn test_randomized_fraction_audited_against_limit() {
    assert!(randomized::audit_fraction(0.95, 0.5));
    assert!(randomized::audit_fraction(0.5, 0.5));
    assert!(!randomized::audit_fraction(0.4, 0.5));
}

#[test]
fn test_randomized_same_seed_same_output() {
    let graph = conflicted_fixture().graph();
    let params = SolverParams {
        probability_limit: 0.7,
        ..seeded(42)
    };
    let a = run(&graph, SolverKind::Randomized, &params).unwrap();
    let b = run(&graph, SolverKind::Randomized, &params).unwrap();
    assert_eq!(a.pairs, b.pairs);
}

#[test]
fn test_randomized_unit_limit_matches_minmax() {
    let graph = conflicted_fixture().graph();
    let minmax = run(&graph, SolverKind::MinMax, &SolverParams::default()).unwrap();
    let randomized = run(&graph, SolverKind::Randomized, &seeded(5)).unwrap();
    assert_eq!(minmax.pairs, randomized.pairs);
    assert_eq!(randomized.randomized_fraction_of_opt, Some(1.0));
}

// ==========================================
// 分档扰动
// ==========================================

#[test]
fn test_perturbed_never_crosses_tiers() {
    let mut f = Fixture::new(vec!["P1"], vec!["~A1", "~B1"]);
    f.scores = vec![("P1", "~A1", 0.05), ("P1", "~B1", 0.35)];
    let graph = f.graph();

    for seed in 0..50 {
        let a = run(&graph, SolverKind::PerturbedMaximization, &seeded(seed)).unwrap();
        assert!(a.is_assigned(0, 1));
    }
}

#[test]
fn test_perturbed_zero_perturbation_is_deterministic() {
    let graph = conflicted_fixture().graph();
    let params = |seed| SolverParams {
        perturbation: 0.0,
        ..seeded(seed)
    };
    let a = run(&graph, SolverKind::PerturbedMaximization, &params(1)).unwrap();
    let b = run(&graph, SolverKind::PerturbedMaximization, &params(2)).unwrap();
    assert_eq!(a.pairs, b.pairs);
}

#[test]
fn test_perturbed_tiers_outweigh_wide_aggregate_scores() {
    // 聚合分超出 [0,1]: 按原始分 {P1-A, P2-B} 总分更高，但 P2-B 落在第 1 档
    let mut f = Fixture::new(vec!["P1", "P2"], vec!["~A1", "~B1"]);
    f.scores = vec![
        ("P1", "~A1", 5.0),
        ("P2", "~B1", 0.2),
        ("P1", "~B1", 0.6),
        ("P2", "~A1", 0.6),
    ];
    let graph = f.graph();
    let params = SolverParams {
        perturbation: 0.0,
        ..seeded(3)
    };

    let a = run(&graph, SolverKind::PerturbedMaximization, &params).unwrap();
    assert!(a.is_assigned(0, 1));
    assert!(a.is_assigned(1, 0));
}

#[test]
fn test_within_tier_component_normalized_only_outside_unit_range() {
    assert_eq!(
        PerturbedMaximizationSolver::within_tier(&[0.2, 0.9]),
        vec![0.2, 0.9]
    );
    assert_eq!(
        PerturbedMaximizationSolver::within_tier(&[-1.0, 1.0, 3.0]),
        vec![0.0, 0.5, 1.0]
    );
    assert_eq!(PerturbedMaximizationSolver::within_tier(&[2.0, 2.0]), vec![0.0, 0.0]);
}

#[test]
fn test_tier_counts_thresholds_at_or_below() {
    let t = [0.1, 0.3, 0.5];
    assert_eq!(PerturbedMaximizationSolver::tier(0.05, &t), 0);
    assert_eq!(PerturbedMaximizationSolver::tier(0.3, &t), 2);
    assert_eq!(PerturbedMaximizationSolver::tier(0.9, &t), 3);
}

// ==========================================
// 备选成员
// ==========================================

#[test]
fn test_alternates_are_top_unassigned_feasible() {
    let mut f = Fixture::new(vec!["P1"], vec!["~A1", "~B1", "~C1", "~D1"]);
    f.alternates = 2;
    f.scores = vec![
        ("P1", "~A1", 0.9),
        ("P1", "~B1", 0.4),
        ("P1", "~C1", 0.6),
        ("P1", "~D1", 0.8),
    ];
    f.conflicts = vec![("P1", "~D1")];
    let graph = f.graph();

    let assignment = run(&graph, SolverKind::MinMax, &SolverParams::default()).unwrap();
    let alternates = select_alternates(&graph, &assignment);
    let members: Vec<usize> = alternates.iter().map(|a| a.member).collect();
    assert_eq!(members, vec![2, 1]);
}
