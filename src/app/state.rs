// ==========================================
// 评审分配引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 装配顺序: 连接 → 仓储 → 设置 → 钩子 → 编排器/部署/调度 → API
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::MatchingApi;
use crate::config::{ConfigManager, EngineSettings, SettingsReader};
use crate::engine::{AssignmentOrchestrator, AssignmentRepositories, DeploymentManager, HookRegistry};
use crate::service::RunScheduler;

/// 应用状态
///
/// 命令行各子命令与后台 worker 共享同一套实例
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 仓储集合（共享连接）
    pub repos: AssignmentRepositories,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 启动时加载的引擎设置
    pub settings: EngineSettings,

    pub orchestrator: Arc<AssignmentOrchestrator>,

    pub deployment: Arc<DeploymentManager>,

    /// 求解任务调度器
    pub scheduler: Arc<RunScheduler>,

    /// 匹配API
    pub matching_api: Arc<MatchingApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（":memory:" 为内存库）
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开连接并幂等建表
    /// 2. 从 config_kv 加载设置（缺省回退内置默认值）
    /// 3. 创建引擎组件与 API 实例
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::ensure_schema(&conn).map_err(|e| format!("建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let repos = AssignmentRepositories::from_connection(conn.clone());

        // ==========================================
        // 加载设置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = config_manager
            .load_settings()
            .await
            .map_err(|e| format!("加载设置失败: {}", e))?;

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let hooks = HookRegistry::from_settings(&settings);

        let orchestrator = Arc::new(AssignmentOrchestrator::new(
            repos.clone(),
            &settings,
            hooks.clone(),
        ));

        let deployment = Arc::new(
            DeploymentManager::new(repos.clone(), &settings, hooks)
                .map_err(|e| format!("无法创建DeploymentManager: {}", e))?,
        );

        let scheduler = Arc::new(
            RunScheduler::new(repos.clone(), orchestrator.clone(), &settings)
                .with_config_manager(config_manager.clone()),
        );

        // ==========================================
        // 初始化API层
        // ==========================================
        let matching_api = Arc::new(MatchingApi::new(
            repos.clone(),
            orchestrator.clone(),
            deployment.clone(),
            scheduler.clone(),
        ));

        tracing::info!(
            max_parallel_runs = settings.max_parallel_runs,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            repos,
            config_manager,
            settings,
            orchestrator,
            deployment,
            scheduler,
            matching_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 COMMITTEE_ASSIGNMENT_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("COMMITTEE_ASSIGNMENT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./committee_assignment.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("committee-assignment");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("committee_assignment.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_in_memory() {
        let state = AppState::new(":memory:".to_string()).await.unwrap();
        assert_eq!(state.db_path, ":memory:");
        assert_eq!(state.settings.committee_group_template, EngineSettings::default().committee_group_template);
        assert!(state.repos.config_repo.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_app_state_reads_persisted_settings() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        {
            let state = AppState::new(db_path.clone()).await.unwrap();
            state
                .config_manager
                .set_global_config_value(crate::config::config_keys::MAX_PARALLEL_RUNS, "3")
                .unwrap();
        }

        let state = AppState::new(db_path).await.unwrap();
        assert_eq!(state.settings.max_parallel_runs, 3);
    }
}
