// ==========================================
// 评审分配引擎 - 求解运行调度器
// ==========================================
// 职责: 从持久化队列取任务，在阻塞线程池中执行求解
// 红线: 同一配置同时最多一个运行中的任务
// 红线: 取消只设置协作标志，由求解器在迭代边界退出
// ==========================================

use crate::config::config_manager::ConfigManager;
use crate::config::settings::EngineSettings;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::orchestrator::{AssignmentOrchestrator, RunOutcome};
use crate::engine::repositories::AssignmentRepositories;
use crate::engine::solver::CancellationFlag;
use crate::domain::types::ConfigStatus;
use crate::repository::queue_repo::{RunTask, RunTaskStatus};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

/// 取消请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelOutcome {
    /// 排队中的任务已取消
    Dequeued,
    /// 已通知运行中的求解器
    Signalled,
}

/// 求解运行调度器
pub struct RunScheduler {
    repos: AssignmentRepositories,
    orchestrator: Arc<AssignmentOrchestrator>,
    config_manager: Option<Arc<ConfigManager>>,
    max_parallel_runs: usize,
    poll_interval: Duration,
    /// 配置ID → 运行中求解的取消标志
    active: Arc<Mutex<HashMap<String, CancellationFlag>>>,
    notify: Arc<Notify>,
}

impl RunScheduler {
    pub fn new(
        repos: AssignmentRepositories,
        orchestrator: Arc<AssignmentOrchestrator>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            repos,
            orchestrator,
            config_manager: None,
            max_parallel_runs: settings.max_parallel_runs.max(1),
            poll_interval: settings.poll_interval(),
            active: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// 运行开始时记录设置快照
    pub fn with_config_manager(mut self, config_manager: Arc<ConfigManager>) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    fn active_flags(&self) -> EngineResult<std::sync::MutexGuard<'_, HashMap<String, CancellationFlag>>> {
        self.active
            .lock()
            .map_err(|e| EngineError::Storage(format!("锁获取失败: {}", e)))
    }

    // ==========================================
    // 提交 / 取消
    // ==========================================

    /// 提交求解并唤醒调度循环
    pub fn submit(&self, config_id: &str) -> EngineResult<String> {
        let task_id = self.orchestrator.submit(config_id)?;
        self.notify.notify_one();
        Ok(task_id)
    }

    /// 取消求解
    ///
    /// - 运行中: 设置取消标志，运行自行落到 Cancelled
    /// - 排队中: 取消队列任务，配置置为 Cancelled
    #[instrument(skip(self))]
    pub fn cancel(&self, config_id: &str) -> EngineResult<CancelOutcome> {
        if let Some(flag) = self.active_flags()?.get(config_id) {
            flag.cancel();
            info!("已通知运行中的求解取消");
            return Ok(CancelOutcome::Signalled);
        }
        if self.orchestrator.cancel_queued(config_id)? {
            Ok(CancelOutcome::Dequeued)
        } else {
            // 已出队但尚未登记标志的窗口期，视为冲突由调用方重试
            Err(EngineError::RunConflict(config_id.to_string()))
        }
    }

    pub fn is_running(&self, config_id: &str) -> EngineResult<bool> {
        Ok(self.active_flags()?.contains_key(config_id))
    }

    /// 进程重启后把中断的 RUNNING 任务放回队列
    pub fn recover(&self) -> EngineResult<usize> {
        let n = self.repos.queue_repo.reset_running_to_pending()?;
        if n > 0 {
            warn!(tasks = n, "中断的求解任务已放回队列");
        }
        Ok(n)
    }

    // ==========================================
    // 执行
    // ==========================================

    /// 取出一批任务（最多 max_parallel_runs 个，配置互不相同）并发执行
    ///
    /// # 返回
    /// - 本批执行的任务数
    pub async fn run_pending(&self) -> EngineResult<usize> {
        let mut batch = Vec::with_capacity(self.max_parallel_runs);
        while batch.len() < self.max_parallel_runs {
            match self.repos.queue_repo.dequeue_next()? {
                Some(task) => batch.push(task),
                None => break,
            }
        }
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        info!(tasks = count, "开始执行求解批次");
        let results = join_all(batch.into_iter().map(|task| self.execute_task(task))).await;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "求解任务收尾失败");
            }
        }
        Ok(count)
    }

    /// 反复执行直到队列为空
    pub async fn run_until_idle(&self) -> EngineResult<usize> {
        let mut total = 0;
        loop {
            let n = self.run_pending().await?;
            if n == 0 {
                return Ok(total);
            }
            total += n;
        }
    }

    /// 调度循环：定时轮询 + 提交唤醒，直到 shutdown 完成
    pub async fn serve<F>(&self, shutdown: F) -> EngineResult<()>
    where
        F: Future<Output = ()>,
    {
        self.recover()?;
        let mut interval = tokio::time::interval(self.poll_interval);
        tokio::pin!(shutdown);
        info!(
            max_parallel_runs = self.max_parallel_runs,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "求解调度器已启动"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("求解调度器停止");
                    return Ok(());
                }
                _ = interval.tick() => {}
                _ = self.notify.notified() => {}
            }
            if let Err(e) = self.run_until_idle().await {
                warn!(error = %e, "调度批次失败");
            }
        }
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id, config_id = %task.config_id))]
    async fn execute_task(&self, task: RunTask) -> EngineResult<()> {
        if let Some(manager) = &self.config_manager {
            let recorded = manager
                .get_config_snapshot()
                .map_err(|e| EngineError::Storage(e.to_string()))
                .and_then(|snapshot| {
                    self.repos
                        .queue_repo
                        .set_settings_snapshot(&task.task_id, &snapshot)
                        .map_err(EngineError::from)
                });
            if let Err(e) = recorded {
                warn!(error = %e, "设置快照记录失败");
            }
        }

        let flag = CancellationFlag::new();
        self.active_flags()?.insert(task.config_id.clone(), flag.clone());

        let orchestrator = self.orchestrator.clone();
        let config_id = task.config_id.clone();
        let joined =
            tokio::task::spawn_blocking(move || orchestrator.run(&config_id, &flag)).await;
        let unregistered = self
            .active_flags()
            .map(|mut active| active.remove(&task.config_id));

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(EngineError::SolverFault(format!("求解线程异常: {}", e))),
        };
        let completed = self.complete_task(&task, result);
        unregistered?;
        completed
    }

    fn complete_task(&self, task: &RunTask, result: EngineResult<RunOutcome>) -> EngineResult<()> {
        let queue = &self.repos.queue_repo;
        let e = match result {
            Ok(outcome) => {
                let status = if outcome.status == ConfigStatus::Cancelled {
                    RunTaskStatus::Cancelled
                } else {
                    RunTaskStatus::Completed
                };
                queue.finish(&task.task_id, status, outcome.error_message.as_deref())?;
                info!(status = %outcome.status, "求解任务完成");
                return Ok(());
            }
            Err(e) => e,
        };

        let message = e.to_string();
        // 已进入 Running 的运行不能重放，直接失败
        let still_queued =
            self.repos.config_repo.get(&task.config_id)?.status == ConfigStatus::Queued;
        if is_retryable(&e) && still_queued {
            if queue.retry_or_fail(&task.task_id, &message)? {
                info!(retry_count = task.retry_count + 1, "求解任务将重试");
                return Ok(());
            }
            warn!(error = %message, "求解任务达到最大重试次数");
        } else {
            queue.finish(&task.task_id, RunTaskStatus::Failed, Some(&message))?;
            warn!(error = %message, "求解任务失败");
        }
        self.orchestrator.fail_run(&task.config_id, &message)?;
        Ok(())
    }
}

/// 仅存储类故障值得重试
fn is_retryable(err: &EngineError) -> bool {
    matches!(err, EngineError::Storage(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::domain::configuration::{AssignmentConfiguration, ConfigurationContent};
    use crate::domain::edge::Edge;
    use crate::domain::paper::Paper;
    use crate::domain::types::EdgeKind;
    use crate::engine::events::HookRegistry;
    use rusqlite::Connection;

    fn scheduler() -> (AssignmentRepositories, RunScheduler) {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = AssignmentRepositories::from_connection(conn.clone());
        let settings = EngineSettings::default();
        let orchestrator = Arc::new(AssignmentOrchestrator::new(
            repos.clone(),
            &settings,
            HookRegistry::none(),
        ));
        let manager = Arc::new(ConfigManager::from_connection(conn).unwrap());
        let scheduler =
            RunScheduler::new(repos.clone(), orchestrator, &settings).with_config_manager(manager);
        (repos, scheduler)
    }

    fn seed(repos: &AssignmentRepositories, group: &str) -> String {
        let venue = group.split('/').next().unwrap();
        let invitation = format!("{}/-/Submission", venue);
        repos
            .paper_repo
            .upsert(&Paper::new(&format!("{}-P1", venue), 1, venue), &invitation)
            .unwrap();
        repos.group_repo.add_member(group, "~A1").unwrap();
        repos
            .edge_repo
            .insert(&Edge::new(EdgeKind::Affinity, group, venue, &format!("{}-P1", venue), "~A1", 0.8))
            .unwrap();
        let config = AssignmentConfiguration::from_content(ConfigurationContent {
            title: "sched".into(),
            match_group: group.into(),
            paper_invitation: invitation,
            user_demand: "1".into(),
            max_papers: "1".into(),
            min_papers: "0".into(),
            alternates: "0".into(),
            solver: "MinMax".into(),
            ..Default::default()
        })
        .unwrap();
        repos.config_repo.save(&config).unwrap();
        config.id
    }

    #[tokio::test]
    async fn test_runs_independent_configs_in_one_batch() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        let b = seed(&repos, "V2/Reviewers");
        let task_a = scheduler.submit(&a).unwrap();
        scheduler.submit(&b).unwrap();

        assert_eq!(scheduler.run_pending().await.unwrap(), 2);
        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Complete);
        assert_eq!(repos.config_repo.get(&b).unwrap().status, ConfigStatus::Complete);

        let task = repos.queue_repo.find_by_id(&task_a).unwrap().unwrap();
        assert_eq!(task.status, RunTaskStatus::Completed);
        assert!(task.settings_snapshot.is_some());
        assert!(!scheduler.is_running(&a).unwrap());
    }

    #[tokio::test]
    async fn test_cancel_queued_before_worker_picks_it_up() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        scheduler.submit(&a).unwrap();

        assert_eq!(scheduler.cancel(&a).unwrap(), CancelOutcome::Dequeued);
        assert_eq!(scheduler.run_until_idle().await.unwrap(), 0);
        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_validation_marks_task_completed_with_error_status() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        let task_id = scheduler.submit(&a).unwrap();
        repos.group_repo.remove_member("V1/Reviewers", "~A1").unwrap();

        scheduler.run_until_idle().await.unwrap();
        let config = repos.config_repo.get(&a).unwrap();
        assert_eq!(config.status, ConfigStatus::Error);
        let task = repos.queue_repo.find_by_id(&task_id).unwrap().unwrap();
        assert_eq!(task.status, RunTaskStatus::Completed);
        assert!(task.error_message.is_some());
    }

    #[tokio::test]
    async fn test_recover_requeues_interrupted_tasks() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        scheduler.submit(&a).unwrap();
        // 模拟进程在执行中退出
        repos.queue_repo.dequeue_next().unwrap().unwrap();

        assert_eq!(scheduler.recover().unwrap(), 1);
        assert_eq!(scheduler.run_until_idle().await.unwrap(), 1);
        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Complete);
    }

    #[tokio::test]
    async fn test_storage_error_after_running_fails_config_without_retry() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        scheduler.submit(&a).unwrap();
        let task = repos.queue_repo.dequeue_next().unwrap().unwrap();
        // 运行已进入 Running，收尾写入失败
        repos
            .config_repo
            .compare_and_set_status(&a, ConfigStatus::Queued, ConfigStatus::Running, None)
            .unwrap();
        repos
            .edge_repo
            .insert(
                &Edge::new(EdgeKind::ProposedAssignment, "V1/Reviewers", "V1", "V1-P1", "~A1", 0.8)
                    .with_config(&a),
            )
            .unwrap();

        scheduler
            .complete_task(&task, Err(EngineError::Storage("disk I/O error".into())))
            .unwrap();

        let config = repos.config_repo.get(&a).unwrap();
        assert_eq!(config.status, ConfigStatus::Error);
        assert!(config.error_message.unwrap().contains("disk I/O error"));
        let task = repos.queue_repo.find_by_id(&task.task_id).unwrap().unwrap();
        assert_eq!(task.status, RunTaskStatus::Failed);
        assert!(repos
            .edge_repo
            .list_by_config(&a, EdgeKind::ProposedAssignment)
            .unwrap()
            .is_empty());
        assert_eq!(scheduler.run_until_idle().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_solver_thread_fault_while_running_fails_config() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        scheduler.submit(&a).unwrap();
        let task = repos.queue_repo.dequeue_next().unwrap().unwrap();
        repos
            .config_repo
            .compare_and_set_status(&a, ConfigStatus::Queued, ConfigStatus::Running, None)
            .unwrap();

        scheduler
            .complete_task(&task, Err(EngineError::SolverFault("求解线程异常: panicked".into())))
            .unwrap();

        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Error);
        assert!(!scheduler.is_running(&a).unwrap());
        // Error 可重置后重新提交
        scheduler.orchestrator.reset(&a).unwrap();
        scheduler.submit(&a).unwrap();
        scheduler.run_until_idle().await.unwrap();
        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Complete);
    }

    #[tokio::test]
    async fn test_storage_error_before_running_is_retried() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        scheduler.submit(&a).unwrap();
        let task = repos.queue_repo.dequeue_next().unwrap().unwrap();

        scheduler
            .complete_task(&task, Err(EngineError::Storage("database is locked".into())))
            .unwrap();

        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Queued);
        assert_eq!(scheduler.run_until_idle().await.unwrap(), 1);
        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Complete);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (repos, scheduler) = scheduler();
        let a = seed(&repos, "V1/Reviewers");
        scheduler.submit(&a).unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        scheduler.serve(shutdown).await.unwrap();
        assert_eq!(repos.config_repo.get(&a).unwrap().status, ConfigStatus::Complete);
    }
}
