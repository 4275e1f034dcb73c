// ==========================================
// 评审分配引擎 - 配置管理器
// ==========================================
// 职责: 设置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::settings::EngineSettings;
use crate::config::settings_reader::{SettingsReader, SettingsResult};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
    defaults: EngineSettings,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> SettingsResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            defaults: EngineSettings::default(),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> SettingsResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self {
            conn,
            defaults: EngineSettings::default(),
        })
    }

    /// 替换内置默认值（库内嵌入方可按需传入）
    pub fn with_defaults(mut self, defaults: EngineSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> SettingsResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> SettingsResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> SettingsResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 解析数值配置；格式错误时告警并回退默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> SettingsResult<T>
    where
        T: std::str::FromStr + Copy,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 求解任务开始时记录设置快照，便于复现
    pub fn get_config_snapshot(&self) -> SettingsResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的 global 配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> SettingsResult<usize> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            if key.starts_with("__meta_") {
                continue;
            }
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// SettingsReader Trait 实现
// ==========================================
#[async_trait]
impl SettingsReader for ConfigManager {
    async fn get_default_user_demand(&self) -> SettingsResult<u32> {
        self.get_parsed_or(config_keys::DEFAULT_USER_DEMAND, self.defaults.default_user_demand)
    }

    async fn get_default_max_papers(&self) -> SettingsResult<u32> {
        self.get_parsed_or(config_keys::DEFAULT_MAX_PAPERS, self.defaults.default_max_papers)
    }

    async fn get_default_min_papers(&self) -> SettingsResult<u32> {
        self.get_parsed_or(config_keys::DEFAULT_MIN_PAPERS, self.defaults.default_min_papers)
    }

    async fn get_default_alternates(&self) -> SettingsResult<u32> {
        self.get_parsed_or(config_keys::DEFAULT_ALTERNATES, self.defaults.default_alternates)
    }

    async fn get_conflict_lookback_years(&self) -> SettingsResult<Option<i32>> {
        match self.get_config_value(config_keys::CONFLICT_LOOKBACK_YEARS)? {
            None => Ok(self.defaults.conflict_lookback_years),
            Some(raw) if raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("all") => Ok(None),
            Some(raw) => match raw.trim().parse::<i32>() {
                Ok(n) if n >= 0 => Ok(Some(n)),
                _ => {
                    tracing::warn!(raw_value = %raw, "冲突回溯年数格式错误，使用全部历史");
                    Ok(None)
                }
            },
        }
    }

    async fn get_common_email_domains(&self) -> SettingsResult<Vec<String>> {
        let Some(value) = self.get_config_value(config_keys::COMMON_EMAIL_DOMAINS)? else {
            return Ok(self.defaults.common_email_domains.clone());
        };

        let domains: Vec<String> = value
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(domains)
    }

    async fn get_randomized_resolution(&self) -> SettingsResult<u32> {
        let v = self.get_parsed_or(
            config_keys::RANDOMIZED_RESOLUTION,
            self.defaults.randomized_resolution,
        )?;
        Ok(v.max(1))
    }

    async fn get_worker_poll_interval_ms(&self) -> SettingsResult<u64> {
        self.get_parsed_or(
            config_keys::WORKER_POLL_INTERVAL_MS,
            self.defaults.worker_poll_interval_ms,
        )
    }

    async fn get_max_parallel_runs(&self) -> SettingsResult<usize> {
        let v = self.get_parsed_or(config_keys::MAX_PARALLEL_RUNS, self.defaults.max_parallel_runs)?;
        Ok(v.max(1))
    }

    async fn get_committee_group_template(&self) -> SettingsResult<String> {
        Ok(self
            .get_config_value(config_keys::COMMITTEE_GROUP_TEMPLATE)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.defaults.committee_group_template.clone()))
    }

    async fn get_hooks(&self) -> SettingsResult<BTreeMap<String, Vec<String>>> {
        let Some(raw) = self.get_config_value(config_keys::LIFECYCLE_HOOKS)? else {
            return Ok(self.defaults.hooks.clone());
        };
        let hooks = serde_json::from_str(&raw).unwrap_or_else(|_| {
            tracing::warn!(config_key = config_keys::LIFECYCLE_HOOKS, raw_value = %raw, "钩子配置格式错误，忽略");
            BTreeMap::new()
        });
        Ok(hooks)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 容量默认值
    pub const DEFAULT_USER_DEMAND: &str = "default_user_demand";
    pub const DEFAULT_MAX_PAPERS: &str = "default_max_papers";
    pub const DEFAULT_MIN_PAPERS: &str = "default_min_papers";
    pub const DEFAULT_ALTERNATES: &str = "default_alternates";

    // 冲突策略
    pub const CONFLICT_LOOKBACK_YEARS: &str = "conflict_lookback_years";
    pub const COMMON_EMAIL_DOMAINS: &str = "common_email_domains"; // 逗号分隔

    // 求解 / 调度
    pub const RANDOMIZED_RESOLUTION: &str = "randomized_resolution";
    pub const WORKER_POLL_INTERVAL_MS: &str = "worker_poll_interval_ms";
    pub const MAX_PARALLEL_RUNS: &str = "max_parallel_runs";

    // 部署
    pub const COMMITTEE_GROUP_TEMPLATE: &str = "committee_group_template";

    // 生命周期钩子 (JSON: {event: [hook_name]})
    pub const LIFECYCLE_HOOKS: &str = "lifecycle_hooks";
}
