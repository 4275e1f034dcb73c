// ==========================================
// 评审分配引擎 - 设置读取 Trait
// ==========================================
// 职责: 定义各组件所需的设置读取接口（不包含实现）
// 红线: 不包含设置写入、不包含业务逻辑
// ==========================================

use crate::config::settings::EngineSettings;
use async_trait::async_trait;
use std::error::Error;

pub type SettingsResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// SettingsReader Trait
// ==========================================
// 实现者: ConfigManager（config_kv 表）、StaticSettingsReader（内存）
#[async_trait]
pub trait SettingsReader: Send + Sync {
    // ===== 容量默认值 =====

    /// 每篇投稿需要的成员数
    ///
    /// # 默认值
    /// - 3
    async fn get_default_user_demand(&self) -> SettingsResult<u32>;

    /// 成员负载上限
    ///
    /// # 默认值
    /// - 5
    async fn get_default_max_papers(&self) -> SettingsResult<u32>;

    /// 成员负载下限
    ///
    /// # 默认值
    /// - 0
    async fn get_default_min_papers(&self) -> SettingsResult<u32>;

    async fn get_default_alternates(&self) -> SettingsResult<u32>;

    // ===== 冲突策略 =====

    /// 冲突回溯年数（None = 全部历史）
    async fn get_conflict_lookback_years(&self) -> SettingsResult<Option<i32>>;

    async fn get_common_email_domains(&self) -> SettingsResult<Vec<String>>;

    // ===== 求解 / 调度 / 部署 =====

    async fn get_randomized_resolution(&self) -> SettingsResult<u32>;

    async fn get_worker_poll_interval_ms(&self) -> SettingsResult<u64>;

    async fn get_max_parallel_runs(&self) -> SettingsResult<usize>;

    async fn get_committee_group_template(&self) -> SettingsResult<String>;

    /// 生命周期事件 → 钩子名
    async fn get_hooks(&self) -> SettingsResult<std::collections::BTreeMap<String, Vec<String>>>;

    /// 汇总为 EngineSettings
    async fn load_settings(&self) -> SettingsResult<EngineSettings> {
        Ok(EngineSettings {
            default_user_demand: self.get_default_user_demand().await?,
            default_max_papers: self.get_default_max_papers().await?,
            default_min_papers: self.get_default_min_papers().await?,
            default_alternates: self.get_default_alternates().await?,
            conflict_lookback_years: self.get_conflict_lookback_years().await?,
            common_email_domains: self.get_common_email_domains().await?,
            randomized_resolution: self.get_randomized_resolution().await?,
            worker_poll_interval_ms: self.get_worker_poll_interval_ms().await?,
            max_parallel_runs: self.get_max_parallel_runs().await?,
            committee_group_template: self.get_committee_group_template().await?,
            hooks: self.get_hooks().await?,
        })
    }
}

// ==========================================
// StaticSettingsReader - 内存设置（测试、单次求解）
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsReader {
    settings: EngineSettings,
}

impl StaticSettingsReader {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsReader for StaticSettingsReader {
    async fn get_default_user_demand(&self) -> SettingsResult<u32> {
        Ok(self.settings.default_user_demand)
    }

    async fn get_default_max_papers(&self) -> SettingsResult<u32> {
        Ok(self.settings.default_max_papers)
    }

    async fn get_default_min_papers(&self) -> SettingsResult<u32> {
        Ok(self.settings.default_min_papers)
    }

    async fn get_default_alternates(&self) -> SettingsResult<u32> {
        Ok(self.settings.default_alternates)
    }

    async fn get_conflict_lookback_years(&self) -> SettingsResult<Option<i32>> {
        Ok(self.settings.conflict_lookback_years)
    }

    async fn get_common_email_domains(&self) -> SettingsResult<Vec<String>> {
        Ok(self.settings.common_email_domains.clone())
    }

    async fn get_randomized_resolution(&self) -> SettingsResult<u32> {
        Ok(self.settings.randomized_resolution)
    }

    async fn get_worker_poll_interval_ms(&self) -> SettingsResult<u64> {
        Ok(self.settings.worker_poll_interval_ms)
    }

    async fn get_max_parallel_runs(&self) -> SettingsResult<usize> {
        Ok(self.settings.max_parallel_runs)
    }

    async fn get_committee_group_template(&self) -> SettingsResult<String> {
        Ok(self.settings.committee_group_template.clone())
    }

    async fn get_hooks(&self) -> SettingsResult<std::collections::BTreeMap<String, Vec<String>>> {
        Ok(self.settings.hooks.clone())
    }

    async fn load_settings(&self) -> SettingsResult<EngineSettings> {
        Ok(self.settings.clone())
    }
}
