//! 事件钩子管理器
//!
//! 同步分发引擎事件，处理器按注册顺序执行。单个处理器失败只记录日志，
//! 不会影响其余处理器或引擎本身。

use dashmap::DashMap;
use di_abstractions::{EventData, EventHandler, EventHook};
use di_common::BoxError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 处理器注册标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(uuid::Uuid);

/// 事件钩子管理器
pub struct EventHookManager {
    handlers: DashMap<EventHook, Vec<(HookId, EventHandler)>>,
    enabled: AtomicBool,
}

impl EventHookManager {
    /// 创建新的管理器
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// 创建共享管理器
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 注册事件处理器
    pub fn register<F>(&self, event: EventHook, handler: F) -> HookId
    where
        F: Fn(&EventData) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = HookId(uuid::Uuid::new_v4());
        self.handlers
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!("注册事件处理器: {}", event);
        id
    }

    /// 移除事件处理器
    pub fn unregister(&self, event: EventHook, id: HookId) -> bool {
        let Some(mut handlers) = self.handlers.get_mut(&event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(hook_id, _)| *hook_id != id);
        before != handlers.len()
    }

    /// 分发事件，返回成功执行的处理器数量
    pub fn emit(&self, data: &EventData) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        // 先复制处理器列表，处理器内部可以再注册新的处理器
        let handlers: Vec<(HookId, EventHandler)> = match self.handlers.get(&data.event) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        let mut succeeded = 0;
        for (id, handler) in handlers {
            match handler(data) {
                Ok(()) => succeeded += 1,
                Err(e) => warn!("事件处理器执行失败: {} ({:?}): {}", data.event, id, e),
            }
        }
        succeeded
    }

    /// 处理器数量，`None` 表示所有事件
    pub fn hook_count(&self, event: Option<EventHook>) -> usize {
        match event {
            Some(event) => self.handlers.get(&event).map_or(0, |handlers| handlers.len()),
            None => self.handlers.iter().map(|entry| entry.value().len()).sum(),
        }
    }

    /// 清除处理器，`None` 表示所有事件
    pub fn clear(&self, event: Option<EventHook>) {
        match event {
            Some(event) => {
                self.handlers.remove(&event);
            }
            None => self.handlers.clear(),
        }
    }

    /// 启用或禁用事件分发
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// 已注册处理器的事件类型
    pub fn registered_events(&self) -> Vec<EventHook> {
        EventHook::ALL
            .into_iter()
            .filter(|event| self.hook_count(Some(*event)) > 0)
            .collect()
    }
}

impl Default for EventHookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHookManager")
            .field("hooks", &self.hook_count(None))
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
