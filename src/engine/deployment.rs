// ==========================================
// 评审分配引擎 - 部署管理器
// ==========================================
// 职责: 把 Proposed 分配物化为 Deployed 边与单篇投稿委员会组成员
// 职责: 撤销部署时按日志逆序还原全部变更
// 红线: 同一投稿的部署串行执行（按投稿加锁）
// 红线: 投稿已有其他配置的 Deployed 边时，未显式 overwrite 即为部署冲突，不改动任何成员
// 红线: 部署失败按日志回滚，不暴露部分部署结果
// 红线: 撤销后组成员与仍有效的 Deployed 边一致（被替换的边只在原配置仍部署时恢复）
// ==========================================

use crate::config::settings::EngineSettings;
use crate::domain::configuration::AssignmentConfiguration;
use crate::domain::edge::{AssignmentEdge, Edge};
use crate::domain::paper::Paper;
use crate::domain::types::{CommitteeRole, ConfigStatus, EdgeKind};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{HookRegistry, LifecycleEvent, LifecycleEventType};
use crate::engine::group_template::{GroupContext, GroupTemplate};
use crate::engine::lifecycle;
use crate::engine::repositories::AssignmentRepositories;
use crate::repository::journal_repo::JournalAction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

// ==========================================
// 选项与结果
// ==========================================

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// 替换其他配置的已部署分配（移除不在新分配中的成员）
    pub overwrite: bool,
    /// 评审改派: 只替换同一成员的已部署边，其余分配保持不动
    pub enable_reviewer_reassignment: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentOutcome {
    pub papers_updated: usize,
    pub members_notified: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UndeploymentOutcome {
    /// 还原的变更条数
    pub reverted: usize,
    /// 配置原本未部署
    pub noop: bool,
}

// ==========================================
// PaperLocks - 按投稿加锁
// ==========================================
#[derive(Debug, Default)]
pub struct PaperLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PaperLocks {
    pub fn handle(&self, paper_id: &str) -> EngineResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| EngineError::Storage(format!("投稿锁表获取失败: {}", e)))?;
        Ok(locks
            .entry(paper_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 一组投稿的锁句柄（按投稿 id 升序）
    pub fn handles<'a, I>(&self, paper_ids: I) -> EngineResult<Vec<Arc<Mutex<()>>>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ordered: BTreeSet<&str> = paper_ids.into_iter().collect();
        ordered.into_iter().map(|id| self.handle(id)).collect()
    }
}

/// 依次加锁；句柄须已按投稿 id 排序
fn lock_all(handles: &[Arc<Mutex<()>>]) -> EngineResult<Vec<MutexGuard<'_, ()>>> {
    handles
        .iter()
        .map(|handle| {
            handle
                .lock()
                .map_err(|e| EngineError::Storage(format!("投稿锁获取失败: {}", e)))
        })
        .collect()
}

/// 单篇投稿的部署计划（冲突检查阶段生成，不做任何写入）
#[derive(Debug)]
struct PaperPlan {
    head: String,
    /// 待写入的 Deployed 边
    edges: Vec<Edge>,
    /// 被替换的其他配置的 Deployed 边
    displaced: Vec<Edge>,
    /// 投稿（档案对档案的匹配没有投稿组）
    paper: Option<Paper>,
}

// ==========================================
// DeploymentManager
// ==========================================
pub struct DeploymentManager {
    repos: AssignmentRepositories,
    template: GroupTemplate,
    hooks: HookRegistry,
    locks: Arc<PaperLocks>,
}

impl DeploymentManager {
    /// 创建部署管理器（组 id 模板在此解析一次）
    pub fn new(
        repos: AssignmentRepositories,
        settings: &EngineSettings,
        hooks: HookRegistry,
    ) -> EngineResult<Self> {
        let template = GroupTemplate::parse(&settings.committee_group_template)?;
        Ok(Self {
            repos,
            template,
            hooks,
            locks: Arc::new(PaperLocks::default()),
        })
    }

    /// 部署配置的 Proposed 分配
    ///
    /// # 返回
    /// - Err(DeploymentConflict): 未 overwrite 且投稿已有其他配置的部署，状态与成员均不变
    /// - Err(ReviewsPosted): overwrite 遇到已提交评审的投稿
    #[instrument(skip(self), fields(overwrite = options.overwrite))]
    pub fn deploy(&self, config_id: &str, options: DeployOptions) -> EngineResult<DeploymentOutcome> {
        let config = self.repos.config_repo.get(config_id)?;
        lifecycle::check_deployable(config.status)?;

        let proposed = self
            .repos
            .edge_repo
            .list_by_config(&config.id, EdgeKind::ProposedAssignment)?;
        // 冲突检查到写入完成期间持有全部投稿锁
        let handles = self.locks.handles(proposed.iter().map(|e| e.head.as_str()))?;
        let _guards = lock_all(&handles)?;

        let config = self.repos.config_repo.get(config_id)?;
        lifecycle::check_deployable(config.status)?;
        let plans = self.plan(&config, proposed, options)?;
        self.commit(&config.id, config.status, ConfigStatus::Deploying, None)?;

        match self.apply(&config, &plans) {
            Ok(outcome) => {
                self.commit(&config.id, ConfigStatus::Deploying, ConfigStatus::Deployed, None)?;
                self.hooks.fire(
                    &LifecycleEvent::new(&config.id, LifecycleEventType::Deployed, ConfigStatus::Deployed)
                        .with_detail(format!(
                            "papers_updated={} members_notified={}",
                            outcome.papers_updated, outcome.members_notified
                        )),
                );
                tracing::info!(
                    papers_updated = outcome.papers_updated,
                    members_notified = outcome.members_notified,
                    "部署完成"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "部署失败，开始回滚");
                if let Err(rollback) = self.revert_entries(&config) {
                    tracing::error!(error = %rollback, "部署回滚失败");
                }
                if let Err(status) = self.commit(
                    &config.id,
                    ConfigStatus::Deploying,
                    ConfigStatus::DeploymentError,
                    Some(&e.to_string()),
                ) {
                    tracing::error!(error = %status, "部署失败状态写入失败");
                }
                Err(e)
            }
        }
    }

    /// 撤销部署（未部署时为空操作）
    #[instrument(skip(self))]
    pub fn undeploy(&self, config_id: &str) -> EngineResult<UndeploymentOutcome> {
        let config = self.repos.config_repo.get(config_id)?;
        if !lifecycle::check_undeployable(config.status)? {
            tracing::info!(status = %config.status, "配置未部署，撤销为空操作");
            return Ok(UndeploymentOutcome {
                reverted: 0,
                noop: true,
            });
        }

        self.commit(&config.id, config.status, ConfigStatus::Undeploying, None)?;
        match self.revert_journal(&config) {
            Ok(reverted) => {
                self.commit(&config.id, ConfigStatus::Undeploying, ConfigStatus::Initialized, None)?;
                self.hooks.fire(
                    &LifecycleEvent::new(&config.id, LifecycleEventType::Undeployed, ConfigStatus::Initialized)
                        .with_detail(format!("reverted={}", reverted)),
                );
                tracing::info!(reverted, "撤销部署完成");
                Ok(UndeploymentOutcome {
                    reverted,
                    noop: false,
                })
            }
            Err(e) => {
                if let Err(status) = self.commit(
                    &config.id,
                    ConfigStatus::Undeploying,
                    ConfigStatus::UndeploymentError,
                    Some(&e.to_string()),
                ) {
                    tracing::error!(error = %status, "撤销失败状态写入失败");
                }
                Err(e)
            }
        }
    }

    /// 单篇投稿委员会组 id
    pub fn paper_group_id(&self, paper: &Paper, role: &CommitteeRole) -> String {
        self.template.render(&GroupContext {
            venue_id: &paper.venue_id,
            number: paper.number,
            committee: role.committee_name(),
        })
    }

    fn commit(
        &self,
        config_id: &str,
        from: ConfigStatus,
        to: ConfigStatus,
        error_message: Option<&str>,
    ) -> EngineResult<()> {
        lifecycle::commit_transition(
            &self.repos.config_repo,
            &self.hooks,
            config_id,
            from,
            to,
            error_message,
        )
    }

    // ==========================================
    // 阶段一: 冲突检查与计划（只读）
    // ==========================================

    fn plan(
        &self,
        config: &AssignmentConfiguration,
        proposed: Vec<Edge>,
        options: DeployOptions,
    ) -> EngineResult<Vec<PaperPlan>> {
        let mut by_head: BTreeMap<String, Vec<Edge>> = BTreeMap::new();
        for edge in proposed {
            let deployed = AssignmentEdge::from_edge(&edge).to_edge(
                EdgeKind::DeployedAssignment,
                &config.match_group,
                config.venue_id(),
                &config.id,
            );
            by_head.entry(edge.head).or_default().push(deployed);
        }

        let deployed_invitation = EdgeKind::DeployedAssignment.invitation_id(&config.match_group);
        let mut plans = Vec::with_capacity(by_head.len());
        for (head, edges) in by_head {
            let others: Vec<Edge> = self
                .repos
                .edge_repo
                .list_by_head(&deployed_invitation, &head)?
                .into_iter()
                .filter(|e| e.config_id.as_deref() != Some(config.id.as_str()))
                .collect();

            let displaced = if others.is_empty() {
                Vec::new()
            } else if options.overwrite {
                if self.repos.ledger_repo.has_reviews(&head)? {
                    return Err(EngineError::ReviewsPosted(head));
                }
                others
            } else if options.enable_reviewer_reassignment {
                let tails: BTreeSet<&str> = edges.iter().map(|e| e.tail.as_str()).collect();
                others
                    .into_iter()
                    .filter(|e| tails.contains(e.tail.as_str()))
                    .collect()
            } else {
                return Err(EngineError::DeploymentConflict {
                    other_config: others[0].config_id.clone().unwrap_or_else(|| "unknown".to_string()),
                    paper_id: head,
                });
            };

            let paper = if config.matches_profiles() {
                None
            } else {
                let paper = self
                    .repos
                    .paper_repo
                    .find_by_id(&head)?
                    .ok_or_else(|| EngineError::NotFound(format!("Paper {}", head)))?;
                Some(paper)
            };

            plans.push(PaperPlan {
                head,
                edges,
                displaced,
                paper,
            });
        }
        Ok(plans)
    }

    // ==========================================
    // 阶段二: 写入（调用方已持有投稿锁），每次变更写日志
    // ==========================================

    fn apply(&self, config: &AssignmentConfiguration, plans: &[PaperPlan]) -> EngineResult<DeploymentOutcome> {
        let role = config.committee_role();
        let sac_invitation = (role == CommitteeRole::AreaChairs).then(|| {
            EdgeKind::DeployedAssignment
                .invitation_id(&format!("{}/{}", config.venue_id(), CommitteeRole::SeniorAreaChairs))
        });

        let mut outcome = DeploymentOutcome::default();
        for plan in plans {
            let group_id = plan.paper.as_ref().map(|p| self.paper_group_id(p, &role));
            let new_tails: BTreeSet<&str> = plan.edges.iter().map(|e| e.tail.as_str()).collect();

            for old in &plan.displaced {
                self.repos.edge_repo.delete_by_id(&old.id)?;
                self.journal(&config.id, JournalAction::EdgeDeleted { edge: old.clone() })?;
                if let Some(group_id) = &group_id {
                    if !new_tails.contains(old.tail.as_str())
                        && self.repos.group_repo.remove_member(group_id, &old.tail)?
                    {
                        self.journal(
                            &config.id,
                            JournalAction::MemberRemoved {
                                group_id: group_id.clone(),
                                member_id: old.tail.clone(),
                            },
                        )?;
                    }
                }
            }

            for edge in &plan.edges {
                self.repos.edge_repo.insert(edge)?;
                self.journal(&config.id, JournalAction::EdgeInserted { edge: edge.clone() })?;
                if let Some(group_id) = &group_id {
                    outcome.members_notified += self.add_member(&config.id, group_id, &edge.tail)?;
                }
            }

            if let (Some(paper), Some(sac_invitation)) = (&plan.paper, &sac_invitation) {
                let sac_group = self.paper_group_id(paper, &CommitteeRole::SeniorAreaChairs);
                for edge in &plan.edges {
                    for sac in self.repos.edge_repo.list_by_head(sac_invitation, &edge.tail)? {
                        outcome.members_notified += self.add_member(&config.id, &sac_group, &sac.tail)?;
                    }
                }
            }

            tracing::debug!(paper_id = %plan.head, assigned = plan.edges.len(), "投稿部署完成");
            outcome.papers_updated += 1;
        }
        Ok(outcome)
    }

    /// 加入组成员，新加入时写日志
    fn add_member(&self, config_id: &str, group_id: &str, member_id: &str) -> EngineResult<usize> {
        if !self.repos.group_repo.add_member(group_id, member_id)? {
            return Ok(0);
        }
        self.journal(
            config_id,
            JournalAction::MemberAdded {
                group_id: group_id.to_string(),
                member_id: member_id.to_string(),
            },
        )?;
        Ok(1)
    }

    fn journal(&self, config_id: &str, action: JournalAction) -> EngineResult<()> {
        self.repos.journal_repo.append(config_id, &action)?;
        Ok(())
    }

    // ==========================================
    // 日志逆序还原（撤销部署 / 失败回滚）
    // ==========================================

    fn revert_journal(&self, config: &AssignmentConfiguration) -> EngineResult<usize> {
        let entries = self.repos.journal_repo.list_by_config(&config.id)?;
        let handles = self.locks.handles(entries.iter().filter_map(|entry| match &entry.action {
            JournalAction::EdgeInserted { edge } | JournalAction::EdgeDeleted { edge } => {
                Some(edge.head.as_str())
            }
            _ => None,
        }))?;
        let _guards = lock_all(&handles)?;
        self.revert_entries(config)
    }

    /// 还原日志（调用方已持有相关投稿锁）
    ///
    /// 先逆序还原边，再按剩余 Deployed 边还原组成员:
    /// - 本配置加入的成员仍被其他配置的边覆盖时保留，并把该条日志移交给覆盖方
    /// - 本配置移出的成员只在仍被覆盖时重新加入
    fn revert_entries(&self, config: &AssignmentConfiguration) -> EngineResult<usize> {
        let entries = self.repos.journal_repo.list_by_config(&config.id)?;

        let mut touched: BTreeSet<(String, String)> = BTreeSet::new();
        for entry in entries.iter().rev() {
            match &entry.action {
                JournalAction::EdgeInserted { edge } => {
                    self.repos.edge_repo.delete_by_id(&edge.id)?;
                    touched.insert((edge.invitation_id.clone(), edge.head.clone()));
                }
                JournalAction::EdgeDeleted { edge } => {
                    touched.insert((edge.invitation_id.clone(), edge.head.clone()));
                    if self.owner_still_deployed(edge)? {
                        self.repos.edge_repo.insert(edge)?;
                    } else {
                        tracing::debug!(edge_id = %edge.id, "原配置已撤销，被替换的边不再恢复");
                    }
                }
                _ => {}
            }
        }

        let covered = self.covered_members(config, &touched)?;
        for entry in entries.iter().rev() {
            match &entry.action {
                JournalAction::MemberAdded {
                    group_id,
                    member_id,
                } => match covered.get(&(group_id.clone(), member_id.clone())) {
                    Some(owner) if owner.is_empty() => {}
                    Some(owner) => self.journal(owner, entry.action.clone())?,
                    None => {
                        self.repos.group_repo.remove_member(group_id, member_id)?;
                    }
                },
                JournalAction::MemberRemoved {
                    group_id,
                    member_id,
                } => {
                    if covered.contains_key(&(group_id.clone(), member_id.clone())) {
                        self.repos.group_repo.add_member(group_id, member_id)?;
                    }
                }
                _ => {}
            }
        }
        self.repos.journal_repo.clear(&config.id)?;
        Ok(entries.len())
    }

    /// 被替换边的原配置仍处于部署中（无归属或外部写入的边视为仍有效）
    fn owner_still_deployed(&self, edge: &Edge) -> EngineResult<bool> {
        let Some(owner) = edge.config_id.as_deref() else {
            return Ok(true);
        };
        Ok(match self.repos.config_repo.find_by_id(owner)? {
            Some(other) => matches!(other.status, ConfigStatus::Deployed | ConfigStatus::Deploying),
            None => true,
        })
    }

    /// 受影响投稿上仍存在的 Deployed 边所覆盖的组成员 → 覆盖方配置
    fn covered_members(
        &self,
        config: &AssignmentConfiguration,
        touched: &BTreeSet<(String, String)>,
    ) -> EngineResult<BTreeMap<(String, String), String>> {
        let mut covered = BTreeMap::new();
        if config.matches_profiles() {
            return Ok(covered);
        }
        let role = config.committee_role();
        let sac_invitation = (role == CommitteeRole::AreaChairs).then(|| {
            EdgeKind::DeployedAssignment
                .invitation_id(&format!("{}/{}", config.venue_id(), CommitteeRole::SeniorAreaChairs))
        });

        for (invitation, head) in touched {
            let Some(paper) = self.repos.paper_repo.find_by_id(head)? else {
                continue;
            };
            let group_id = self.paper_group_id(&paper, &role);
            let sac_group = self.paper_group_id(&paper, &CommitteeRole::SeniorAreaChairs);
            for edge in self.repos.edge_repo.list_by_head(invitation, head)? {
                if edge.config_id.as_deref() == Some(config.id.as_str()) {
                    continue;
                }
                let owner = edge.config_id.clone().unwrap_or_default();
                if let Some(sac_invitation) = &sac_invitation {
                    for sac in self.repos.edge_repo.list_by_head(sac_invitation, &edge.tail)? {
                        covered
                            .entry((sac_group.clone(), sac.tail))
                            .or_insert_with(|| owner.clone());
                    }
                }
                covered.entry((group_id.clone(), edge.tail)).or_insert(owner);
            }
        }
        Ok(covered)
    }
}
