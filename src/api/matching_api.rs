// ==========================================
// 评审分配引擎 - 匹配 API
// ==========================================
// 职责: 配置管理、评分/冲突导入、求解提交与取消、部署与撤销、状态查询
// 红线: 对外只返回 ApiError，不暴露引擎/仓储错误类型
// ==========================================

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::capacity::CapacityOverride;
use crate::domain::configuration::{AssignmentConfiguration, ConfigurationContent};
use crate::domain::edge::{AssignmentEdge, Edge};
use crate::domain::member::Profile;
use crate::domain::paper::Paper;
use crate::domain::types::{ConfigStatus, EdgeKind};
use crate::engine::deployment::{DeployOptions, DeploymentManager, DeploymentOutcome, UndeploymentOutcome};
use crate::engine::orchestrator::AssignmentOrchestrator;
use crate::engine::repositories::AssignmentRepositories;
use crate::importer::reduced_load::{apply_reduced_loads, LoadChange, RecruitmentResponse};
use crate::importer::score_importer::{ImportReport, ScoreImporter};
use crate::repository::queue_repo::{RunQueueCounts, RunTask};
use crate::service::run_queue::{CancelOutcome, RunScheduler};

// ==========================================
// 数据集（协作方数据的文件形式）
// ==========================================

/// 数据集中的边
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEdge {
    pub kind: EdgeKind,
    /// 匹配组（决定 invitation）
    pub match_group: String,
    /// 显式 invitation（评分规格中的投标、推荐等来源）
    #[serde(default)]
    pub invitation_id: Option<String>,
    pub head: String,
    pub tail: String,
    pub weight: f64,
    #[serde(default)]
    pub label: Option<String>,
}

impl DatasetEdge {
    fn to_edge(&self) -> Edge {
        let mut edge = Edge::new(
            self.kind,
            &self.match_group,
            venue_of(&self.match_group),
            &self.head,
            &self.tail,
            self.weight,
        );
        if let Some(invitation) = &self.invitation_id {
            edge.invitation_id = invitation.clone();
        }
        match &self.label {
            Some(label) => edge.with_label(label),
            None => edge,
        }
    }
}

/// 投稿、分组、档案与边的批量数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingDataset {
    #[serde(default)]
    pub paper_invitation: String,
    #[serde(default)]
    pub papers: Vec<Paper>,
    /// 组 id → 成员档案ID（保持顺序）
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub edges: Vec<DatasetEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub papers: usize,
    pub memberships: usize,
    pub profiles: usize,
    pub edges: usize,
}

/// 配置状态视图
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationStatusView {
    pub config_id: String,
    pub title: String,
    pub status: ConfigStatus,
    pub error_message: Option<String>,
    pub randomized_fraction_of_opt: Option<f64>,
    pub running: bool,
    pub latest_task: Option<RunTask>,
    pub proposed_edges: usize,
    pub deployed_edges: usize,
}

// ==========================================
// MatchingApi - 匹配 API
// ==========================================
pub struct MatchingApi {
    repos: AssignmentRepositories,
    orchestrator: Arc<AssignmentOrchestrator>,
    deployment: Arc<DeploymentManager>,
    scheduler: Arc<RunScheduler>,
    importer: ScoreImporter,
}

impl MatchingApi {
    pub fn new(
        repos: AssignmentRepositories,
        orchestrator: Arc<AssignmentOrchestrator>,
        deployment: Arc<DeploymentManager>,
        scheduler: Arc<RunScheduler>,
    ) -> Self {
        Self {
            repos,
            orchestrator,
            deployment,
            scheduler,
            importer: ScoreImporter::new(),
        }
    }

    // ==========================================
    // 数据载入
    // ==========================================

    /// 载入数据集（投稿与档案按 id 覆盖，成员与边追加）
    #[instrument(skip(self, dataset), fields(papers = dataset.papers.len(), edges = dataset.edges.len()))]
    pub fn load_dataset(&self, dataset: &MatchingDataset) -> ApiResult<DatasetSummary> {
        let mut summary = DatasetSummary::default();
        if !dataset.papers.is_empty() && dataset.paper_invitation.trim().is_empty() {
            return Err(ApiError::InvalidInput("paper_invitation 不能为空".to_string()));
        }
        for paper in &dataset.papers {
            self.repos.paper_repo.upsert(paper, &dataset.paper_invitation)?;
            summary.papers += 1;
        }
        for (group, members) in &dataset.groups {
            for member in members {
                if self.repos.group_repo.add_member(group, member)? {
                    summary.memberships += 1;
                }
            }
        }
        for profile in &dataset.profiles {
            self.repos.profile_repo.upsert(profile)?;
            summary.profiles += 1;
        }

        let edges: Vec<Edge> = dataset.edges.iter().map(DatasetEdge::to_edge).collect();
        for edge in &edges {
            edge.validate_weight()?;
        }
        summary.edges = self.repos.edge_repo.insert_batch(&edges)?;
        tracing::info!(?summary, "数据集已载入");
        Ok(summary)
    }

    // ==========================================
    // 配置
    // ==========================================

    /// 校验并创建配置（状态为 Initialized）
    pub fn create_configuration(&self, content: ConfigurationContent) -> ApiResult<AssignmentConfiguration> {
        let config = AssignmentConfiguration::from_content(content)?;
        self.repos.config_repo.save(&config)?;
        tracing::info!(config_id = %config.id, title = %config.title, "配置已创建");
        Ok(config)
    }

    pub fn get_configuration(&self, config_id: &str) -> ApiResult<AssignmentConfiguration> {
        Ok(self.repos.config_repo.get(config_id)?)
    }

    pub fn list_configurations(&self) -> ApiResult<Vec<AssignmentConfiguration>> {
        Ok(self.repos.config_repo.list_all()?)
    }

    // ==========================================
    // 评分 / 冲突 / 容量
    // ==========================================

    /// 导入亲和度文件（.csv / .xlsx），写入匹配组的 Affinity_Score 边
    pub fn import_affinity_file<P: AsRef<Path>>(&self, match_group: &str, path: P) -> ApiResult<ImportReport> {
        let (edges, report) = self.importer.import_affinity_file(path)?;
        let edges: Vec<Edge> = edges
            .iter()
            .map(|e| {
                Edge::new(
                    EdgeKind::Affinity,
                    match_group,
                    venue_of(match_group),
                    &e.paper_id,
                    &e.member_id,
                    e.weight,
                )
            })
            .collect();
        self.repos.edge_repo.insert_batch(&edges)?;
        Ok(report)
    }

    /// 导入人工冲突文件，写入匹配组的 Conflict 边
    pub fn import_conflict_file<P: AsRef<Path>>(&self, match_group: &str, path: P) -> ApiResult<ImportReport> {
        let (conflicts, report) = self.importer.import_conflict_file(path)?;
        let edges: Vec<Edge> = conflicts
            .iter()
            .map(|c| {
                let edge = Edge::new(
                    EdgeKind::Conflict,
                    match_group,
                    venue_of(match_group),
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
        self.repos.edge_repo.insert_batch(&edges)?;
        Ok(report)
    }

    /// 按冲突策略计算冲突边
    pub fn compute_conflicts(&self, config_id: &str) -> ApiResult<usize> {
        Ok(self.orchestrator.compute_conflicts(config_id)?)
    }

    /// 把招募阶段的减负回复写成 Custom_Max_Papers 边（只降不升）
    #[instrument(skip(self, responses), fields(responses = responses.len()))]
    pub fn apply_reduced_loads(
        &self,
        match_group: &str,
        responses: &[RecruitmentResponse],
    ) -> ApiResult<Vec<LoadChange>> {
        let member_ids = self.repos.group_repo.list_member_ids(match_group)?;
        let profiles = self.repos.profile_repo.find_many(&member_ids)?;

        let invitation = EdgeKind::CustomMaxPapers.invitation_id(match_group);
        let existing = self.repos.edge_repo.list_by_invitation(&invitation)?;
        let mut overrides: HashMap<String, CapacityOverride> = existing
            .iter()
            .map(|e| (e.tail.clone(), CapacityOverride::max_only(e.weight as u32)))
            .collect();

        let changes = apply_reduced_loads(responses, &profiles, &mut overrides);
        for change in &changes {
            let (profile_id, max_papers) = match change {
                LoadChange::Created {
                    profile_id,
                    max_papers,
                } => (profile_id, *max_papers),
                LoadChange::Lowered { profile_id, to, .. } => (profile_id, *to),
            };
            for old in existing.iter().filter(|e| &e.tail == profile_id) {
                self.repos.edge_repo.delete_by_id(&old.id)?;
            }
            let edge = Edge::new(
                EdgeKind::CustomMaxPapers,
                match_group,
                venue_of(match_group),
                match_group,
                profile_id,
                max_papers as f64,
            );
            edge.validate_weight()?;
            self.repos.edge_repo.insert(&edge)?;
        }
        Ok(changes)
    }

    // ==========================================
    // 求解
    // ==========================================

    /// 提交求解（后台调度执行）
    pub fn submit_run(&self, config_id: &str) -> ApiResult<String> {
        Ok(self.scheduler.submit(config_id)?)
    }

    pub fn cancel_run(&self, config_id: &str) -> ApiResult<CancelOutcome> {
        Ok(self.scheduler.cancel(config_id)?)
    }

    pub fn reset(&self, config_id: &str) -> ApiResult<ConfigStatus> {
        Ok(self.orchestrator.reset(config_id)?)
    }

    /// 前台执行队列直到为空（CLI 使用）
    pub async fn drain_queue(&self) -> ApiResult<usize> {
        Ok(self.scheduler.run_until_idle().await?)
    }

    pub fn queue_counts(&self) -> ApiResult<RunQueueCounts> {
        Ok(self.repos.queue_repo.get_queue_counts()?)
    }

    // ==========================================
    // 部署
    // ==========================================

    pub fn deploy(&self, config_id: &str, options: DeployOptions) -> ApiResult<DeploymentOutcome> {
        Ok(self.deployment.deploy(config_id, options)?)
    }

    pub fn undeploy(&self, config_id: &str) -> ApiResult<UndeploymentOutcome> {
        Ok(self.deployment.undeploy(config_id)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_status(&self, config_id: &str) -> ApiResult<ConfigurationStatusView> {
        let config = self.repos.config_repo.get(config_id)?;
        let proposed_edges = self
            .repos
            .edge_repo
            .list_by_config(config_id, EdgeKind::ProposedAssignment)?
            .len();
        let deployed_edges = self
            .repos
            .edge_repo
            .list_by_config(config_id, EdgeKind::DeployedAssignment)?
            .len();
        Ok(ConfigurationStatusView {
            running: self.scheduler.is_running(config_id)?,
            latest_task: self.repos.queue_repo.find_latest_by_config(config_id)?,
            config_id: config.id,
            title: config.title,
            status: config.status,
            error_message: config.error_message,
            randomized_fraction_of_opt: config.randomized_fraction_of_opt,
            proposed_edges,
            deployed_edges,
        })
    }

    /// 某配置的分配边（Proposed / Deployed / Alternate）
    pub fn list_assignments(&self, config_id: &str, kind: EdgeKind) -> ApiResult<Vec<AssignmentEdge>> {
        match kind {
            EdgeKind::ProposedAssignment | EdgeKind::DeployedAssignment | EdgeKind::Alternate => Ok(self
                .repos
                .edge_repo
                .list_by_config(config_id, kind)?
                .iter()
                .map(AssignmentEdge::from_edge)
                .collect()),
            other => Err(ApiError::InvalidInput(format!("{} 不是分配边", other))),
        }
    }
}

/// 组 id 的会议前缀（去掉最后一段）
pub fn venue_of(group_id: &str) -> &str {
    group_id.rsplit_once('/').map(|(venue, _)| venue).unwrap_or(group_id)
}
