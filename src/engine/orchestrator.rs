// ==========================================
// 评审分配引擎 - 求解编排器
// ==========================================
// 流程: 载入协作方数据 → 构建约束图 → 求解 → 写入 Proposed / Alternate 边
// 红线: 构图校验失败的运行不进入 Running
// 红线: 被取消或失败的运行不保留任何 Proposed 边
// 红线: 求解类失败落到配置状态上，不向调度器抛出
// ==========================================

use crate::config::settings::EngineSettings;
use crate::domain::capacity::CapacityOverride;
use crate::domain::configuration::AssignmentConfiguration;
use crate::domain::edge::{AffinityEdge, AssignmentEdge, ConflictEdge, Edge, ScoreEdge};
use crate::domain::member::Profile;
use crate::domain::types::{CommitteeRole, ConfigStatus, EdgeKind, SolverKind};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{HookRegistry, LifecycleEvent, LifecycleEventType};
use crate::engine::graph_builder::{BuildReport, ConstraintGraph, GraphBuilder, GraphInputs};
use crate::engine::lifecycle;
use crate::engine::repositories::AssignmentRepositories;
use crate::engine::solver::{self, select_alternates, AssignedPair, CancellationFlag, SolverParams};
use crate::importer::conflict_policy::{ConflictComputer, SacTransfer};
use crate::repository::queue_repo::RunTask;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// 基础设施失败时的默认重试次数
pub const DEFAULT_RUN_RETRIES: i64 = 2;

// ==========================================
// MatchingResult - 一次求解的完整结果（不含存储）
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct MatchingResult {
    pub solver: SolverKind,
    pub assignments: Vec<AssignmentEdge>,
    pub alternates: Vec<AssignmentEdge>,
    pub objective: f64,
    pub iterations: u64,
    pub randomized_fraction_of_opt: Option<f64>,
    pub report: BuildReport,
}

/// 在内存中完成构图与求解
///
/// # 返回
/// - Err(Validation): 匹配组/备选组为空、无投稿、容量越界
/// - Err(NoSolution / SolverFault / Cancelled): 求解类失败
pub fn solve_matching(
    settings: &EngineSettings,
    config: &AssignmentConfiguration,
    inputs: &GraphInputs,
    cancel: &CancellationFlag,
) -> EngineResult<MatchingResult> {
    let graph = GraphBuilder::new(settings).build(config, inputs)?;
    solve_graph(settings, config, &graph, cancel)
}

fn solve_graph(
    settings: &EngineSettings,
    config: &AssignmentConfiguration,
    graph: &ConstraintGraph,
    cancel: &CancellationFlag,
) -> EngineResult<MatchingResult> {
    let params = SolverParams::from_config(config, settings);
    let assignment = solver::solve(graph, config.solver, &params, cancel)?;

    let alternates: Vec<AssignmentEdge> = select_alternates(graph, &assignment)
        .iter()
        .map(|p| pair_edge(graph, p, &config.title))
        .collect();

    Ok(MatchingResult {
        solver: assignment.solver,
        assignments: assignment.to_edges(graph, &config.title),
        alternates,
        objective: assignment.objective,
        iterations: assignment.iterations,
        randomized_fraction_of_opt: assignment.randomized_fraction_of_opt,
        report: graph.report.clone(),
    })
}

fn pair_edge(graph: &ConstraintGraph, pair: &AssignedPair, label: &str) -> AssignmentEdge {
    AssignmentEdge {
        paper_id: graph.papers[pair.paper].paper.id.clone(),
        member_id: graph.members[pair.member].member.profile_id.clone(),
        weight: pair.score,
        label: label.to_string(),
    }
}

// ==========================================
// RunOutcome - 一次运行的终态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub config_id: String,
    pub status: ConfigStatus,
    pub error_message: Option<String>,
    pub assigned: usize,
    pub alternates: usize,
    pub objective: Option<f64>,
    pub randomized_fraction_of_opt: Option<f64>,
}

impl RunOutcome {
    fn failed(config_id: &str, status: ConfigStatus, error: &EngineError) -> Self {
        Self {
            config_id: config_id.to_string(),
            status,
            error_message: Some(error.to_string()),
            assigned: 0,
            alternates: 0,
            objective: None,
            randomized_fraction_of_opt: None,
        }
    }
}

// ==========================================
// AssignmentOrchestrator - 求解编排器
// ==========================================
pub struct AssignmentOrchestrator {
    repos: AssignmentRepositories,
    settings: EngineSettings,
    hooks: HookRegistry,
}

impl AssignmentOrchestrator {
    pub fn new(repos: AssignmentRepositories, settings: &EngineSettings, hooks: HookRegistry) -> Self {
        Self {
            repos,
            settings: settings.clone(),
            hooks,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ==========================================
    // 数据载入
    // ==========================================

    /// 从存储中载入构图所需的全部数据
    ///
    /// - 评分: 有评分规格时按各来源 invitation 载入，否则载入匹配组的亲和度边
    /// - 人工评分: 不属于任何配置的 Aggregate_Score 边
    /// - 容量覆写: Custom_Max_Papers 边（tail = 成员）
    /// - 需求覆写: Custom_User_Demands 边（head = 投稿）
    #[instrument(skip(self, config), fields(config_id = %config.id))]
    pub fn load_inputs(&self, config: &AssignmentConfiguration) -> EngineResult<GraphInputs> {
        let group = &config.match_group;
        let edges = &self.repos.edge_repo;

        let members = self.repos.group_repo.list_members(group)?;
        let alternate_members = match &config.alternate_group {
            Some(alt) => Some(self.repos.group_repo.list_members(alt)?),
            None => None,
        };
        let papers = if config.matches_profiles() {
            Vec::new()
        } else {
            self.repos.paper_repo.list_by_invitation(&config.paper_invitation)?
        };

        let conflicts = edges
            .list_by_invitation(&EdgeKind::Conflict.invitation_id(group))?
            .into_iter()
            .map(|e| ConflictEdge {
                paper_id: e.head,
                member_id: e.tail,
                weight: e.weight,
                label: e.label,
            })
            .collect();

        let sources: Vec<String> = match &config.scores_specification {
            Some(spec) if !spec.is_empty() => spec.sources.keys().cloned().collect(),
            _ => vec![EdgeKind::Affinity.invitation_id(group)],
        };
        let mut scores = Vec::new();
        for source in &sources {
            scores.extend(edges.list_by_invitation(source)?.into_iter().map(|e| ScoreEdge {
                source: source.clone(),
                paper_id: e.head,
                member_id: e.tail,
                weight: Some(e.weight),
                label: e.label,
            }));
        }

        let manual_scores = edges
            .list_by_invitation(&EdgeKind::AggregateScore.invitation_id(group))?
            .into_iter()
            .filter(|e| e.config_id.is_none())
            .map(|e| AffinityEdge::new(&e.head, &e.tail, e.weight))
            .collect();

        let mut member_overrides = HashMap::new();
        for e in edges.list_by_invitation(&EdgeKind::CustomMaxPapers.invitation_id(group))? {
            e.validate_weight()?;
            member_overrides.insert(e.tail.clone(), CapacityOverride::max_only(e.weight as u32));
        }

        let mut paper_demands = HashMap::new();
        for e in edges.list_by_invitation(&EdgeKind::CustomUserDemand.invitation_id(group))? {
            e.validate_weight()?;
            paper_demands.insert(e.head.clone(), e.weight as u32);
        }

        Ok(GraphInputs {
            papers,
            members,
            alternate_members,
            conflicts,
            scores,
            manual_scores,
            member_overrides,
            paper_demands,
        })
    }

    /// 校验配置可构图（不改变状态）
    pub fn validate(&self, config: &AssignmentConfiguration) -> EngineResult<BuildReport> {
        let inputs = self.load_inputs(config)?;
        let graph = GraphBuilder::new(&self.settings).build(config, &inputs)?;
        Ok(graph.report)
    }

    // ==========================================
    // 冲突计算
    // ==========================================

    /// 按冲突策略计算冲突并写入 Conflict 边（已存在的组合跳过）
    ///
    /// # 返回
    /// - 新写入的冲突边数量
    #[instrument(skip(self))]
    pub fn compute_conflicts(&self, config_id: &str) -> EngineResult<usize> {
        let config = self.repos.config_repo.get(config_id)?;
        let computer = ConflictComputer::from_settings(&self.settings);

        let member_ids = self.repos.group_repo.list_member_ids(&config.match_group)?;
        let member_profiles = self.repos.profile_repo.find_many(&member_ids)?;

        let computed = match &config.alternate_group {
            Some(alt) => {
                let head_ids = self.repos.group_repo.list_member_ids(alt)?;
                let heads = self.repos.profile_repo.find_many(&head_ids)?;
                computer.profile_conflicts(&heads, &member_profiles)?
            }
            None => {
                let papers = self.repos.paper_repo.list_by_invitation(&config.paper_invitation)?;
                let author_ids: Vec<String> = papers
                    .iter()
                    .flat_map(|p| p.author_ids.iter().cloned())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                let author_profiles = index_profiles(self.repos.profile_repo.find_many(&author_ids)?);
                let transfer = if config.committee_role() == CommitteeRole::AreaChairs {
                    Some(self.sac_transfer(&config, &member_ids)?)
                } else {
                    None
                };
                computer.paper_conflicts(&papers, &author_profiles, &member_profiles, transfer.as_ref())?
            }
        };

        let invitation = EdgeKind::Conflict.invitation_id(&config.match_group);
        let existing: HashSet<(String, String)> = self
            .repos
            .edge_repo
            .list_by_invitation(&invitation)?
            .into_iter()
            .map(|e| (e.head, e.tail))
            .collect();

        let fresh: Vec<Edge> = computed
            .iter()
            .filter(|c| !existing.contains(&(c.paper_id.clone(), c.member_id.clone())))
            .map(|c| {
                let edge = Edge::new(
                    EdgeKind::Conflict,
                    &config.match_group,
                    config.venue_id(),
                    &c.paper_id,
                    &c.member_id,
                    c.weight,
                );
                match &c.label {
                    Some(label) => edge.with_label(label),
                    None => edge,
                }
            })
            .collect();

        let written = self.repos.edge_repo.insert_batch(&fresh)?;
        tracing::info!(
            computed = computed.len(),
            written,
            policy = computer.policy_name(),
            "冲突边已写入"
        );
        Ok(written)
    }

    /// AC 匹配时，AC 已部署的 SAC 及其档案
    fn sac_transfer(&self, config: &AssignmentConfiguration, ac_ids: &[String]) -> EngineResult<SacTransfer> {
        let sac_invitation = EdgeKind::DeployedAssignment
            .invitation_id(&format!("{}/{}", config.venue_id(), CommitteeRole::SeniorAreaChairs));
        let mut transfer = SacTransfer::default();
        let mut sac_ids = HashSet::new();
        for ac in ac_ids {
            let sacs: Vec<String> = self
                .repos
                .edge_repo
                .list_by_head(&sac_invitation, ac)?
                .into_iter()
                .map(|e| e.tail)
                .collect();
            if !sacs.is_empty() {
                sac_ids.extend(sacs.iter().cloned());
                transfer.sacs_by_ac.insert(ac.clone(), sacs);
            }
        }
        let sac_ids: Vec<String> = sac_ids.into_iter().collect();
        transfer.sac_profiles = index_profiles(self.repos.profile_repo.find_many(&sac_ids)?);
        Ok(transfer)
    }

    // ==========================================
    // 提交 / 取消 / 重置
    // ==========================================

    /// 提交求解：检查状态、校验构图、置为 Queued 并写入运行队列
    ///
    /// # 返回
    /// - Ok(task_id)
    /// - Err(RunConflict): 已有排队或运行中的求解
    /// - Err(Validation): 构图校验失败（状态不变）
    #[instrument(skip(self))]
    pub fn submit(&self, config_id: &str) -> EngineResult<String> {
        let config = self.repos.config_repo.get(config_id)?;
        lifecycle::check_solvable(config_id, config.status)?;
        if self.repos.queue_repo.find_active_by_config(config_id)?.is_some() {
            return Err(EngineError::RunConflict(config_id.to_string()));
        }

        let report = self.validate(&config)?;
        lifecycle::commit_transition(
            &self.repos.config_repo,
            &self.hooks,
            config_id,
            config.status,
            ConfigStatus::Queued,
            None,
        )?;
        let task_id = self
            .repos
            .queue_repo
            .enqueue(&RunTask::new(config_id, DEFAULT_RUN_RETRIES))?;
        tracing::info!(
            task_id = %task_id,
            feasible_pairs = report.feasible_pairs,
            "求解已提交"
        );
        Ok(task_id)
    }

    /// 取消排队中的求解
    ///
    /// # 返回
    /// - Ok(true): 已取消
    /// - Ok(false): 正在运行，需要通过取消标志协作取消
    /// - Err(InvalidStateTransition): 配置不在 Queued / Running
    #[instrument(skip(self))]
    pub fn cancel_queued(&self, config_id: &str) -> EngineResult<bool> {
        let config = self.repos.config_repo.get(config_id)?;
        match config.status {
            ConfigStatus::Running => Ok(false),
            ConfigStatus::Queued => {
                let tasks = self.repos.queue_repo.cancel_pending(config_id)?;
                lifecycle::commit_transition(
                    &self.repos.config_repo,
                    &self.hooks,
                    config_id,
                    ConfigStatus::Queued,
                    ConfigStatus::Cancelled,
                    None,
                )?;
                tracing::info!(tasks, "排队中的求解已取消");
                Ok(true)
            }
            other => Err(EngineError::InvalidStateTransition {
                from: other,
                to: ConfigStatus::Cancelled,
            }),
        }
    }

    /// 运行失败且未能自行落到终态时，把配置置为 Error
    ///
    /// - Queued: 重试耗尽或构图前失败
    /// - Running: 收尾写入失败或求解线程异常，同时丢弃本轮 Proposed / Alternate 边
    ///
    /// # 返回
    /// - Ok(false): 配置已不在 Queued / Running
    #[instrument(skip(self, message))]
    pub fn fail_run(&self, config_id: &str, message: &str) -> EngineResult<bool> {
        let config = self.repos.config_repo.get(config_id)?;
        match config.status {
            ConfigStatus::Queued => {}
            ConfigStatus::Running => {
                if let Err(e) = self.discard_proposals(config_id) {
                    tracing::warn!(error = %e, "丢弃本轮分配失败");
                }
            }
            _ => return Ok(false),
        }
        lifecycle::commit_transition(
            &self.repos.config_repo,
            &self.hooks,
            config_id,
            config.status,
            ConfigStatus::Error,
            Some(message),
        )?;
        self.hooks.fire(
            &LifecycleEvent::new(config_id, LifecycleEventType::RunFinished, ConfigStatus::Error)
                .with_detail(message),
        );
        Ok(true)
    }

    /// 人工重置到 Initialized（清除错误信息）
    #[instrument(skip(self))]
    pub fn reset(&self, config_id: &str) -> EngineResult<ConfigStatus> {
        let config = self.repos.config_repo.get(config_id)?;
        let next = lifecycle::reset(config.status)?;
        lifecycle::commit_transition(
            &self.repos.config_repo,
            &self.hooks,
            config_id,
            config.status,
            next,
            None,
        )?;
        Ok(next)
    }

    // ==========================================
    // 运行
    // ==========================================

    /// 执行一次排队中的求解
    ///
    /// # 返回
    /// - Ok(outcome): 运行结束（Complete / Error / No Solution / Cancelled）
    /// - Err: 配置无法读取或状态无法推进（配置仍为 Queued，可重试）
    #[instrument(skip(self, cancel))]
    pub fn run(&self, config_id: &str, cancel: &CancellationFlag) -> EngineResult<RunOutcome> {
        let config = self.repos.config_repo.get(config_id)?;
        if config.status != ConfigStatus::Queued {
            return Err(EngineError::InvalidStateTransition {
                from: config.status,
                to: ConfigStatus::Running,
            });
        }

        if cancel.is_cancelled() {
            return self.finish(&config, ConfigStatus::Queued, Err(EngineError::Cancelled));
        }

        // ===== 1. 构图（失败不进入 Running）=====
        let graph = match self
            .load_inputs(&config)
            .and_then(|inputs| GraphBuilder::new(&self.settings).build(&config, &inputs))
        {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!(error = %e, "构图失败");
                return self.finish(&config, ConfigStatus::Queued, Err(e));
            }
        };

        // ===== 2. 求解 =====
        lifecycle::commit_transition(
            &self.repos.config_repo,
            &self.hooks,
            config_id,
            ConfigStatus::Queued,
            ConfigStatus::Running,
            None,
        )?;
        let result = solve_graph(&self.settings, &config, &graph, cancel)
            .and_then(|matching| self.store_result(&config, &matching, cancel).map(|_| matching));
        self.finish(&config, ConfigStatus::Running, result)
    }

    /// 写入 Proposed / Alternate 边（覆盖本配置上一轮结果）
    fn store_result(
        &self,
        config: &AssignmentConfiguration,
        matching: &MatchingResult,
        cancel: &CancellationFlag,
    ) -> EngineResult<()> {
        self.discard_proposals(&config.id)?;
        let to_edges = |edges: &[AssignmentEdge], kind: EdgeKind| -> Vec<Edge> {
            edges
                .iter()
                .map(|e| e.to_edge(kind, &config.match_group, config.venue_id(), &config.id))
                .collect()
        };
        self.repos
            .edge_repo
            .insert_batch(&to_edges(&matching.assignments, EdgeKind::ProposedAssignment))?;
        self.repos
            .edge_repo
            .insert_batch(&to_edges(&matching.alternates, EdgeKind::Alternate))?;
        cancel.check()?;
        self.repos
            .config_repo
            .set_fraction_of_opt(&config.id, matching.randomized_fraction_of_opt)?;
        Ok(())
    }

    fn discard_proposals(&self, config_id: &str) -> EngineResult<usize> {
        let proposed = self
            .repos
            .edge_repo
            .delete_by_config(config_id, EdgeKind::ProposedAssignment)?;
        let alternates = self.repos.edge_repo.delete_by_config(config_id, EdgeKind::Alternate)?;
        Ok(proposed + alternates)
    }

    /// 把运行结果落到配置状态上，并触发 run_finished
    fn finish(
        &self,
        config: &AssignmentConfiguration,
        from: ConfigStatus,
        result: EngineResult<MatchingResult>,
    ) -> EngineResult<RunOutcome> {
        let outcome = match &result {
            Ok(matching) => RunOutcome {
                config_id: config.id.clone(),
                status: ConfigStatus::Complete,
                error_message: None,
                assigned: matching.assignments.len(),
                alternates: matching.alternates.len(),
                objective: Some(matching.objective),
                randomized_fraction_of_opt: matching.randomized_fraction_of_opt,
            },
            Err(e) => {
                if from == ConfigStatus::Running {
                    self.discard_proposals(&config.id)?;
                }
                let status = match (from, e) {
                    (ConfigStatus::Queued, EngineError::Cancelled) => ConfigStatus::Cancelled,
                    (ConfigStatus::Queued, _) => ConfigStatus::Error,
                    _ => lifecycle::run_outcome_status(&Err(e.clone())),
                };
                RunOutcome::failed(&config.id, status, e)
            }
        };

        lifecycle::commit_transition(
            &self.repos.config_repo,
            &self.hooks,
            &config.id,
            from,
            outcome.status,
            outcome.error_message.as_deref(),
        )?;

        let mut event = LifecycleEvent::new(&config.id, LifecycleEventType::RunFinished, outcome.status);
        if let Some(message) = &outcome.error_message {
            event = event.with_detail(message.clone());
        }
        self.hooks.fire(&event);

        tracing::info!(
            config_id = %config.id,
            status = %outcome.status,
            assigned = outcome.assigned,
            alternates = outcome.alternates,
            "求解运行结束"
        );
        Ok(outcome)
    }
}

fn index_profiles(profiles: Vec<Profile>) -> HashMap<String, Profile> {
    profiles.into_iter().map(|p| (p.id.clone(), p)).collect()
}

#[cfg(test)]
mod tests;
