use super::*;
use crate::db::ensure_schema;
use crate::domain::configuration::ConfigurationContent;
use crate::domain::error::ValidationError;
use crate::domain::paper::Paper;
use crate::engine::events::LifecycleHook;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 测试辅助函数
// ==========================================

const REVIEWERS: &str = "V/Reviewers";

struct RecordingHook {
    seen: Mutex<Vec<(LifecycleEventType, ConfigStatus)>>,
}

impl LifecycleHook for RecordingHook {
    fn name(&self) -> &str {
        "record"
    }

    fn on_event(&self, event: &LifecycleEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.seen.lock().unwrap().push((event.event_type, event.to));
        Ok(())
    }
}

struct Fixture {
    repos: AssignmentRepositories,
    orchestrator: AssignmentOrchestrator,
    recorder: Arc<RecordingHook>,
}

fn fixture() -> Fixture {
    let conn = Connection::open_in_memory().unwrap();
    ensure_schema(&conn).unwrap();
    let repos = AssignmentRepositories::from_connection(Arc::new(Mutex::new(conn)));

    let recorder = Arc::new(RecordingHook {
        seen: Mutex::new(Vec::new()),
    });
    let bindings: BTreeMap<String, Vec<String>> =
        [("run_finished".to_string(), vec!["record".to_string()])]
            .into_iter()
            .collect();
    let mut hooks = HookRegistry::new(bindings);
    hooks.register(recorder.clone());

    let orchestrator = AssignmentOrchestrator::new(repos.clone(), &EngineSettings::default(), hooks);
    Fixture {
        repos,
        orchestrator,
        recorder,
    }
}

impl Fixture {
    fn config(&self, user_demand: &str, max_papers: &str, alternates: &str) -> String {
        let config = AssignmentConfiguration::from_content(ConfigurationContent {
            title: "rev-run".into(),
            match_group: REVIEWERS.into(),
            paper_invitation: "V/-/Submission".into(),
            user_demand: user_demand.into(),
            max_papers: max_papers.into(),
            min_papers: "0".into(),
            alternates: alternates.into(),
            solver: "MinMax".into(),
            ..Default::default()
        })
        .unwrap();
        self.repos.config_repo.save(&config).unwrap();
        config.id
    }

    /// P1/P2 + ~A1/~B1，亲和度 0.9/0.5/0.5/0.0
    fn seed_basic(&self) {
        for number in 1..=2 {
            self.repos
                .paper_repo
                .upsert(&Paper::new(&format!("P{}", number), number, "V"), "V/-/Submission")
                .unwrap();
        }
        for member in ["~A1", "~B1"] {
            self.repos.group_repo.add_member(REVIEWERS, member).unwrap();
        }
        for (p, m, w) in [("P1", "~A1", 0.9), ("P1", "~B1", 0.5), ("P2", "~A1", 0.5), ("P2", "~B1", 0.0)] {
            self.edge(EdgeKind::Affinity, p, m, w);
        }
    }

    fn edge(&self, kind: EdgeKind, head: &str, tail: &str, weight: f64) {
        let edge = Edge::new(kind, REVIEWERS, "V", head, tail, weight);
        self.repos.edge_repo.insert(&edge).unwrap();
    }

    fn pairs(&self, config_id: &str, kind: EdgeKind) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .repos
            .edge_repo
            .list_by_config(config_id, kind)
            .unwrap()
            .into_iter()
            .map(|e| (e.head, e.tail))
            .collect();
        pairs.sort();
        pairs
    }

    fn status(&self, config_id: &str) -> ConfigStatus {
        self.repos.config_repo.get(config_id).unwrap().status
    }
}

fn pair(p: &str, m: &str) -> (String, String) {
    (p.to_string(), m.to_string())
}

// ==========================================
// 提交与运行
// ==========================================

#[test]
fn test_submit_and_run_writes_proposed_and_alternates() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "1");

    let task_id = f.orchestrator.submit(&c).unwrap();
    assert_eq!(f.status(&c), ConfigStatus::Queued);
    assert!(f.repos.queue_repo.find_by_id(&task_id).unwrap().is_some());

    let outcome = f.orchestrator.run(&c, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.status, ConfigStatus::Complete);
    assert_eq!(outcome.assigned, 2);
    assert!((outcome.objective.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(f.status(&c), ConfigStatus::Complete);

    assert_eq!(
        f.pairs(&c, EdgeKind::ProposedAssignment),
        vec![pair("P1", "~B1"), pair("P2", "~A1")]
    );
    assert_eq!(
        f.pairs(&c, EdgeKind::Alternate),
        vec![pair("P1", "~A1"), pair("P2", "~B1")]
    );
    let labels: Vec<Option<String>> = f
        .repos
        .edge_repo
        .list_by_config(&c, EdgeKind::ProposedAssignment)
        .unwrap()
        .into_iter()
        .map(|e| e.label)
        .collect();
    assert!(labels.iter().all(|l| l.as_deref() == Some("rev-run")));

    assert_eq!(
        *f.recorder.seen.lock().unwrap(),
        vec![(LifecycleEventType::RunFinished, ConfigStatus::Complete)]
    );
}

#[test]
fn test_rerun_replaces_previous_proposals() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");

    f.orchestrator.submit(&c).unwrap();
    f.orchestrator.run(&c, &CancellationFlag::new()).unwrap();
    f.orchestrator.submit(&c).unwrap();
    f.orchestrator.run(&c, &CancellationFlag::new()).unwrap();

    assert_eq!(f.pairs(&c, EdgeKind::ProposedAssignment).len(), 2);
    assert!(f.pairs(&c, EdgeKind::Alternate).is_empty());
}

#[test]
fn test_submit_rejects_empty_match_group() {
    let f = fixture();
    f.repos
        .paper_repo
        .upsert(&Paper::new("P1", 1, "V"), "V/-/Submission")
        .unwrap();
    let c = f.config("1", "1", "0");

    assert_eq!(
        f.orchestrator.submit(&c),
        Err(EngineError::Validation(ValidationError::EmptyMatchGroup(
            REVIEWERS.to_string()
        )))
    );
    assert_eq!(f.status(&c), ConfigStatus::Initialized);
    assert!(f.repos.queue_repo.find_active_by_config(&c).unwrap().is_none());
}

#[test]
fn test_second_submit_is_run_conflict() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");

    f.orchestrator.submit(&c).unwrap();
    assert_eq!(
        f.orchestrator.submit(&c),
        Err(EngineError::RunConflict(c.clone()))
    );
}

#[test]
fn test_validation_failure_at_run_never_reaches_running() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");
    f.orchestrator.submit(&c).unwrap();

    // 提交后匹配组被清空
    f.repos.group_repo.remove_member(REVIEWERS, "~A1").unwrap();
    f.repos.group_repo.remove_member(REVIEWERS, "~B1").unwrap();

    let outcome = f.orchestrator.run(&c, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.status, ConfigStatus::Error);
    let stored = f.repos.config_repo.get(&c).unwrap();
    assert_eq!(stored.status, ConfigStatus::Error);
    assert!(stored.error_message.unwrap().contains(REVIEWERS));

    // Error 只能通过 reset 离开
    assert!(f.orchestrator.submit(&c).is_err());
    assert_eq!(f.orchestrator.reset(&c).unwrap(), ConfigStatus::Initialized);
    assert!(f.repos.config_repo.get(&c).unwrap().error_message.is_none());
}

#[test]
fn test_infeasible_demand_is_no_solution() {
    let f = fixture();
    f.seed_basic();
    // 总需求 4 > 总容量 2
    let c = f.config("2", "1", "0");
    f.orchestrator.submit(&c).unwrap();

    let outcome = f.orchestrator.run(&c, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.status, ConfigStatus::NoSolution);
    assert!(outcome.error_message.is_some());
    assert!(f.pairs(&c, EdgeKind::ProposedAssignment).is_empty());
    assert_eq!(
        *f.recorder.seen.lock().unwrap(),
        vec![(LifecycleEventType::RunFinished, ConfigStatus::NoSolution)]
    );
}

// ==========================================
// 取消
// ==========================================

#[test]
fn test_cancelled_flag_before_start_cancels_run() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");
    f.orchestrator.submit(&c).unwrap();

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let outcome = f.orchestrator.run(&c, &cancel).unwrap();
    assert_eq!(outcome.status, ConfigStatus::Cancelled);
    assert_eq!(f.status(&c), ConfigStatus::Cancelled);
    assert!(f.pairs(&c, EdgeKind::ProposedAssignment).is_empty());
}

#[test]
fn test_cancel_queued_marks_tasks_and_config() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");
    f.orchestrator.submit(&c).unwrap();

    assert!(f.orchestrator.cancel_queued(&c).unwrap());
    assert_eq!(f.status(&c), ConfigStatus::Cancelled);
    assert!(f.repos.queue_repo.find_active_by_config(&c).unwrap().is_none());

    // Cancelled 可以重新提交
    assert!(f.orchestrator.submit(&c).is_ok());
}

#[test]
fn test_cancel_requires_active_run() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");
    assert_eq!(
        f.orchestrator.cancel_queued(&c),
        Err(EngineError::InvalidStateTransition {
            from: ConfigStatus::Initialized,
            to: ConfigStatus::Cancelled,
        })
    );
}

#[test]
fn test_run_requires_queued() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");
    assert!(matches!(
        f.orchestrator.run(&c, &CancellationFlag::new()),
        Err(EngineError::InvalidStateTransition { .. })
    ));
}

// ==========================================
// 数据载入
// ==========================================

#[test]
fn test_load_inputs_reads_overrides_and_manual_scores() {
    let f = fixture();
    f.seed_basic();
    f.edge(EdgeKind::CustomMaxPapers, REVIEWERS, "~A1", 1.0);
    f.edge(EdgeKind::CustomUserDemand, "P2", REVIEWERS, 2.0);
    f.edge(EdgeKind::AggregateScore, "P2", "~B1", 0.0);
    f.edge(EdgeKind::Conflict, "P1", "~A1", -1.0);
    let c = f.config("1", "2", "0");
    let config = f.repos.config_repo.get(&c).unwrap();

    let inputs = f.orchestrator.load_inputs(&config).unwrap();
    assert_eq!(inputs.papers.len(), 2);
    assert_eq!(inputs.members.len(), 2);
    assert_eq!(inputs.scores.len(), 4);
    assert_eq!(inputs.manual_scores.len(), 1);
    assert_eq!(inputs.conflicts.len(), 1);
    assert_eq!(
        inputs.member_overrides.get("~A1"),
        Some(&CapacityOverride::max_only(1))
    );
    assert_eq!(inputs.paper_demands.get("P2"), Some(&2));
}

#[test]
fn test_conflict_edges_exclude_pairs_from_run() {
    let f = fixture();
    f.seed_basic();
    f.edge(EdgeKind::Conflict, "P1", "~B1", -1.0);
    let c = f.config("1", "1", "0");
    f.orchestrator.submit(&c).unwrap();
    f.orchestrator.run(&c, &CancellationFlag::new()).unwrap();

    assert_eq!(
        f.pairs(&c, EdgeKind::ProposedAssignment),
        vec![pair("P1", "~A1"), pair("P2", "~B1")]
    );
}

#[test]
fn test_solve_matching_in_memory() {
    let f = fixture();
    f.seed_basic();
    let c = f.config("1", "1", "0");
    let config = f.repos.config_repo.get(&c).unwrap();
    let inputs = f.orchestrator.load_inputs(&config).unwrap();

    let result = solve_matching(
        f.orchestrator.settings(),
        &config,
        &inputs,
        &CancellationFlag::new(),
    )
    .unwrap();
    assert_eq!(result.assignments.len(), 2);
    assert_eq!(result.report.feasible_pairs, 4);
    // 不写存储
    assert!(f.pairs(&c, EdgeKind::ProposedAssignment).is_empty());
}

// ==========================================
// 冲突计算
// ==========================================

#[test]
fn test_compute_conflicts_writes_exclusions_once() {
    let f = fixture();
    f.repos
        .paper_repo
        .upsert(
            &Paper::new("P1", 1, "V").with_authors(vec!["~Author1".to_string()]),
            "V/-/Submission",
        )
        .unwrap();
    for member in ["~A1", "~B1"] {
        f.repos.group_repo.add_member(REVIEWERS, member).unwrap();
    }
    f.repos
        .profile_repo
        .upsert(&Profile::new("~Author1").with_email("author@uni.edu"))
        .unwrap();
    f.repos
        .profile_repo
        .upsert(&Profile::new("~A1").with_email("a1@uni.edu"))
        .unwrap();
    f.repos
        .profile_repo
        .upsert(&Profile::new("~B1").with_email("b1@other.org"))
        .unwrap();
    let c = f.config("1", "1", "0");

    assert_eq!(f.orchestrator.compute_conflicts(&c).unwrap(), 1);
    assert_eq!(f.orchestrator.compute_conflicts(&c).unwrap(), 0);

    let conflicts = f
        .repos
        .edge_repo
        .list_by_invitation(&EdgeKind::Conflict.invitation_id(REVIEWERS))
        .unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!((conflicts[0].head.as_str(), conflicts[0].tail.as_str()), ("P1", "~A1"));
    assert_eq!(conflicts[0].weight, -1.0);
}
