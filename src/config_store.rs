//! 进程内配置仓库：按 pid 存放属性字典，支持工厂 pid 下的多实例条目。
//! 变更事件在调用线程上同步派发给监听器。
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::properties::Properties;

#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    pub pid: String,
    pub factory_pid: Option<String>,
    pub properties: Properties,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigurationEvent {
    Updated {
        pid: String,
        factory_pid: Option<String>,
        properties: Properties,
    },
    Deleted {
        pid: String,
        factory_pid: Option<String>,
    },
}

impl ConfigurationEvent {
    pub fn pid(&self) -> &str {
        match self {
            ConfigurationEvent::Updated { pid, .. } | ConfigurationEvent::Deleted { pid, .. } => pid,
        }
    }

    pub fn factory_pid(&self) -> Option<&str> {
        match self {
            ConfigurationEvent::Updated { factory_pid, .. }
            | ConfigurationEvent::Deleted { factory_pid, .. } => factory_pid.as_deref(),
        }
    }
}

pub trait ConfigurationListener: Send + Sync {
    fn configuration_changed(&self, event: &ConfigurationEvent);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StoreListenerId(u64);

#[derive(Default)]
struct StoreInner {
    items: RwLock<BTreeMap<String, Configuration>>,
    listeners: RwLock<Vec<(StoreListenerId, Arc<dyn ConfigurationListener>)>>,
    next_listener: AtomicU64,
}

#[derive(Clone, Default)]
pub struct ConfigurationStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationStore").finish()
    }
}

impl ConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建或替换 pid 条目；已属于某工厂 pid 的条目保留其归属
    pub fn update(&self, pid: impl Into<String>, properties: Properties) {
        let pid = pid.into();
        let factory_pid = {
            let mut items = self.inner.items.write();
            let factory_pid = items.get(&pid).and_then(|c| c.factory_pid.clone());
            items.insert(
                pid.clone(),
                Configuration {
                    pid: pid.clone(),
                    factory_pid: factory_pid.clone(),
                    properties: properties.clone(),
                },
            );
            factory_pid
        };
        self.notify(&ConfigurationEvent::Updated {
            pid,
            factory_pid,
            properties,
        });
    }

    pub fn create_factory_configuration(&self, factory_pid: impl Into<String>, properties: Properties) -> String {
        let factory_pid = factory_pid.into();
        let pid = format!("{factory_pid}.{}", uuid::Uuid::new_v4());
        self.inner.items.write().insert(
            pid.clone(),
            Configuration {
                pid: pid.clone(),
                factory_pid: Some(factory_pid.clone()),
                properties: properties.clone(),
            },
        );
        self.notify(&ConfigurationEvent::Updated {
            pid: pid.clone(),
            factory_pid: Some(factory_pid),
            properties,
        });
        pid
    }

    pub fn delete(&self, pid: &str) -> bool {
        let Some(removed) = self.inner.items.write().remove(pid) else {
            return false;
        };
        self.notify(&ConfigurationEvent::Deleted {
            pid: removed.pid,
            factory_pid: removed.factory_pid,
        });
        true
    }

    pub fn get(&self, pid: &str) -> Option<Configuration> {
        self.inner.items.read().get(pid).cloned()
    }

    pub fn list_factory(&self, factory_pid: &str) -> Vec<Configuration> {
        self.inner
            .items
            .read()
            .values()
            .filter(|c| c.factory_pid.as_deref() == Some(factory_pid))
            .cloned()
            .collect()
    }

    pub fn add_listener(&self, listener: Arc<dyn ConfigurationListener>) -> StoreListenerId {
        let id = StoreListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: StoreListenerId) {
        self.inner.listeners.write().retain(|(l, _)| *l != id);
    }

    fn notify(&self, event: &ConfigurationEvent) {
        let listeners: Vec<Arc<dyn ConfigurationListener>> =
            self.inner.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for l in listeners {
            l.configuration_changed(event);
        }
    }
}
