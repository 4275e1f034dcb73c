// ==========================================
// 评审分配引擎 - 生命周期钩子
// ==========================================
// 职责: 在生命周期事件上调用会议注册的处理器
// 说明: 钩子按名称注册，设置中把事件映射到钩子名称
// 红线: 钩子失败只记录日志，不改变生命周期状态
// ==========================================

use crate::config::settings::EngineSettings;
use crate::domain::types::ConfigStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 生命周期事件
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventType {
    /// 任意状态变更
    StatusChanged,
    /// 求解运行结束（Complete / Error / No Solution / Cancelled）
    RunFinished,
    Deployed,
    Undeployed,
}

impl LifecycleEventType {
    /// 设置中的事件键
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEventType::StatusChanged => "status_changed",
            LifecycleEventType::RunFinished => "run_finished",
            LifecycleEventType::Deployed => "deployed",
            LifecycleEventType::Undeployed => "undeployed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub config_id: String,
    pub event_type: LifecycleEventType,
    pub from: Option<ConfigStatus>,
    pub to: ConfigStatus,
    /// 错误信息或摘要
    pub detail: Option<String>,
}

impl LifecycleEvent {
    pub fn status_changed(config_id: &str, from: ConfigStatus, to: ConfigStatus) -> Self {
        Self {
            config_id: config_id.to_string(),
            event_type: LifecycleEventType::StatusChanged,
            from: Some(from),
            to,
            detail: None,
        }
    }

    pub fn new(config_id: &str, event_type: LifecycleEventType, to: ConfigStatus) -> Self {
        Self {
            config_id: config_id.to_string(),
            event_type,
            from: None,
            to,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// 钩子 Trait
// ==========================================

/// 生命周期钩子
///
/// 取代运行时解释存储脚本：每个钩子都是编译期注册的处理器
pub trait LifecycleHook: Send + Sync {
    /// 注册名（设置中引用）
    fn name(&self) -> &str;

    fn on_event(&self, event: &LifecycleEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 仅记录日志的钩子（注册名 "log"）
#[derive(Debug, Clone, Default)]
pub struct LoggingHook;

impl LifecycleHook for LoggingHook {
    fn name(&self) -> &str {
        "log"
    }

    fn on_event(&self, event: &LifecycleEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::info!(
            config_id = %event.config_id,
            event = event.event_type.as_str(),
            to = %event.to,
            detail = event.detail.as_deref().unwrap_or(""),
            "生命周期事件"
        );
        Ok(())
    }
}

// ==========================================
// HookRegistry - 钩子注册表
// ==========================================
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn LifecycleHook>>,
    /// 事件键 → 钩子名称
    bindings: BTreeMap<String, Vec<String>>,
}

impl HookRegistry {
    pub fn new(bindings: BTreeMap<String, Vec<String>>) -> Self {
        let mut registry = Self {
            hooks: HashMap::new(),
            bindings,
        };
        registry.register(Arc::new(LoggingHook));
        registry
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.hooks.clone())
    }

    /// 空注册表（不触发任何钩子）
    pub fn none() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.insert(hook.name().to_string(), hook);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    /// 触发事件
    ///
    /// # 返回
    /// - 成功执行的钩子数
    pub fn fire(&self, event: &LifecycleEvent) -> usize {
        let Some(names) = self.bindings.get(event.event_type.as_str()) else {
            return 0;
        };
        let mut ok = 0;
        for name in names {
            match self.hooks.get(name) {
                Some(hook) => match hook.on_event(event) {
                    Ok(()) => ok += 1,
                    Err(e) => tracing::warn!(
                        hook = %name,
                        config_id = %event.config_id,
                        error = %e,
                        "钩子执行失败"
                    ),
                },
                None => tracing::warn!(hook = %name, "钩子未注册"),
            }
        }
        ok
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHook {
        seen: Mutex<Vec<LifecycleEventType>>,
    }

    impl LifecycleHook for RecordingHook {
        fn name(&self) -> &str {
            "record"
        }

        fn on_event(&self, event: &LifecycleEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(event.event_type);
            Ok(())
        }
    }

    struct FailingHook;

    impl LifecycleHook for FailingHook {
        fn name(&self) -> &str {
            "fail"
        }

        fn on_event(&self, _event: &LifecycleEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    fn bindings() -> BTreeMap<String, Vec<String>> {
        [
            ("deployed".to_string(), vec!["record".to_string(), "fail".to_string()]),
            ("run_finished".to_string(), vec!["log".to_string(), "missing".to_string()]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_fire_runs_bound_hooks_only() {
        let recorder = Arc::new(RecordingHook {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = HookRegistry::new(bindings());
        registry.register(recorder.clone());
        registry.register(Arc::new(FailingHook));

        let deployed = LifecycleEvent::new("c1", LifecycleEventType::Deployed, ConfigStatus::Deployed);
        assert_eq!(registry.fire(&deployed), 1);

        let changed =
            LifecycleEvent::status_changed("c1", ConfigStatus::Initialized, ConfigStatus::Queued);
        assert_eq!(registry.fire(&changed), 0);

        assert_eq!(*recorder.seen.lock().unwrap(), vec![LifecycleEventType::Deployed]);
    }

    #[test]
    fn test_unregistered_hook_is_skipped() {
        let registry = HookRegistry::new(bindings());
        assert!(registry.is_registered("log"));
        let event = LifecycleEvent::new("c1", LifecycleEventType::RunFinished, ConfigStatus::Complete)
            .with_detail("ok");
        assert_eq!(registry.fire(&event), 1);
    }

    #[test]
    fn test_none_registry() {
        let registry = HookRegistry::none();
        let event = LifecycleEvent::new("c1", LifecycleEventType::Undeployed, ConfigStatus::Initialized);
        assert_eq!(registry.fire(&event), 0);
    }
}
