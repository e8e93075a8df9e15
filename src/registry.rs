//! 进程内服务注册表：发布 / 查询 / 获取 / 释放服务，并同步派发服务事件。
//! 监听器在注册表锁之外、调用线程上同步执行。
use parking_lot::RwLock;
use serde::Serialize;
use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::{
    filter::Filter,
    properties::{Properties, PropertyValue, OBJECT_CLASS, SERVICE_ID, SERVICE_RANKING},
};

pub type ServiceObject = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceId(pub u64);

/// 服务使用方标识；组件作为使用方时取组件名
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        ConsumerId(id.into())
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 已注册服务的不可变快照；`Modified` 事件携带新快照
#[derive(Clone)]
pub struct ServiceReference {
    id: ServiceId,
    ranking: i32,
    interfaces: Arc<[String]>,
    properties: Arc<Properties>,
}

impl ServiceReference {
    pub fn id(&self) -> ServiceId {
        self.id
    }
    pub fn ranking(&self) -> i32 {
        self.ranking
    }
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
    pub fn provides(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
    /// (ranking 降序, id 升序)：同级时先注册者胜出
    pub fn outranks(&self, other: &ServiceReference) -> bool {
        (std::cmp::Reverse(self.ranking), self.id) < (std::cmp::Reverse(other.ranking), other.id)
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.id)
            .field("ranking", &self.ranking)
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum ServiceEvent {
    Registered(ServiceReference),
    Modified(ServiceReference),
    Unregistering(ServiceReference),
}

impl ServiceEvent {
    pub fn reference(&self) -> &ServiceReference {
        match self {
            ServiceEvent::Registered(r) | ServiceEvent::Modified(r) | ServiceEvent::Unregistering(r) => r,
        }
    }
}

pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

pub trait ServiceFactory: Send + Sync {
    fn get_service(&self, consumer: &ConsumerId, reference: &ServiceReference) -> Option<ServiceObject>;
    fn unget_service(&self, consumer: &ConsumerId, reference: &ServiceReference, service: ServiceObject);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceScope {
    /// 所有使用方共享一个对象；总引用计数归零时释放
    Singleton,
    /// 每个使用方一个对象
    Consumer,
}

pub enum ServiceProvider {
    Object(ServiceObject),
    Factory {
        factory: Arc<dyn ServiceFactory>,
        scope: ServiceScope,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    reference: ServiceReference,
    provider: ServiceProvider,
    uses: HashMap<ConsumerId, usize>,
    shared: Option<ServiceObject>,
    per_consumer: HashMap<ConsumerId, ServiceObject>,
}

struct RegistryInner {
    entries: RwLock<BTreeMap<ServiceId, Entry>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ServiceListener>)>>,
    next_service: AtomicU64,
    next_listener: AtomicU64,
}

#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry").finish()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: RwLock::new(BTreeMap::new()),
                listeners: RwLock::new(Vec::new()),
                next_service: AtomicU64::new(1),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn register(
        &self,
        interfaces: Vec<String>,
        provider: ServiceProvider,
        properties: Properties,
    ) -> ServiceRegistration {
        let id = ServiceId(self.inner.next_service.fetch_add(1, Ordering::Relaxed));
        let reference = make_reference(id, interfaces.into(), properties);
        {
            let mut entries = self.inner.entries.write();
            entries.insert(
                id,
                Entry {
                    reference: reference.clone(),
                    provider,
                    uses: HashMap::new(),
                    shared: None,
                    per_consumer: HashMap::new(),
                },
            );
        }
        tracing::debug!(service = id.0, interfaces = ?reference.interfaces(), "service registered");
        self.notify(&ServiceEvent::Registered(reference));
        ServiceRegistration {
            registry: Arc::downgrade(&self.inner),
            id,
            unregistered: AtomicBool::new(false),
        }
    }

    pub fn lookup(&self, interface: &str, filter: Option<&Filter>) -> Vec<ServiceReference> {
        let entries = self.inner.entries.read();
        let mut found: Vec<ServiceReference> = entries
            .values()
            .map(|e| &e.reference)
            .filter(|r| r.provides(interface))
            .filter(|r| filter.map_or(true, |f| f.matches(r.properties())))
            .cloned()
            .collect();
        found.sort_by_key(|r| (std::cmp::Reverse(r.ranking), r.id));
        found
    }

    pub fn reference(&self, id: ServiceId) -> Option<ServiceReference> {
        self.inner.entries.read().get(&id).map(|e| e.reference.clone())
    }

    pub fn is_registered(&self, id: ServiceId) -> bool {
        self.inner.entries.read().contains_key(&id)
    }

    pub fn use_count(&self, id: ServiceId) -> usize {
        self.inner
            .entries
            .read()
            .get(&id)
            .map_or(0, |e| e.uses.values().sum())
    }

    pub fn get_service(&self, consumer: &ConsumerId, reference: &ServiceReference) -> Option<ServiceObject> {
        let id = reference.id();
        let (factory, scope) = {
            let mut entries = self.inner.entries.write();
            let entry = entries.get_mut(&id)?;
            let cached = match &entry.provider {
                ServiceProvider::Object(obj) => Some(obj.clone()),
                ServiceProvider::Factory { scope: ServiceScope::Singleton, .. } => entry.shared.clone(),
                ServiceProvider::Factory { scope: ServiceScope::Consumer, .. } => {
                    entry.per_consumer.get(consumer).cloned()
                }
            };
            if let Some(obj) = cached {
                *entry.uses.entry(consumer.clone()).or_insert(0) += 1;
                return Some(obj);
            }
            match &entry.provider {
                ServiceProvider::Factory { factory, scope } => (factory.clone(), *scope),
                ServiceProvider::Object(_) => return None,
            }
        };
        // 工厂回调在锁外执行：可能同步进入组件激活
        let obj = factory.get_service(consumer, reference)?;
        let mut entries = self.inner.entries.write();
        let entry = entries.get_mut(&id)?;
        let obj = match scope {
            ServiceScope::Singleton => entry.shared.get_or_insert(obj).clone(),
            ServiceScope::Consumer => entry.per_consumer.entry(consumer.clone()).or_insert(obj).clone(),
        };
        *entry.uses.entry(consumer.clone()).or_insert(0) += 1;
        Some(obj)
    }

    /// 使用方未持有该服务时返回 false
    pub fn unget_service(&self, consumer: &ConsumerId, reference: &ServiceReference) -> bool {
        let release = {
            let mut entries = self.inner.entries.write();
            let Some(entry) = entries.get_mut(&reference.id()) else {
                return false;
            };
            let Some(count) = entry.uses.get_mut(consumer) else {
                return false;
            };
            *count -= 1;
            if *count > 0 {
                return true;
            }
            entry.uses.remove(consumer);
            match &entry.provider {
                ServiceProvider::Object(_) => None,
                ServiceProvider::Factory { factory, scope: ServiceScope::Consumer } => entry
                    .per_consumer
                    .remove(consumer)
                    .map(|obj| (factory.clone(), obj)),
                ServiceProvider::Factory { factory, scope: ServiceScope::Singleton } => {
                    if entry.uses.is_empty() {
                        entry.shared.take().map(|obj| (factory.clone(), obj))
                    } else {
                        None
                    }
                }
            }
        };
        if let Some((factory, obj)) = release {
            factory.unget_service(consumer, reference, obj);
        }
        true
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.write().retain(|(l, _)| *l != id);
    }

    fn notify(&self, event: &ServiceEvent) {
        notify(&self.inner, event);
    }
}

fn notify(inner: &RegistryInner, event: &ServiceEvent) {
    let listeners: Vec<Arc<dyn ServiceListener>> =
        inner.listeners.read().iter().map(|(_, l)| l.clone()).collect();
    for l in listeners {
        l.service_changed(event);
    }
}

fn make_reference(id: ServiceId, interfaces: Arc<[String]>, mut properties: Properties) -> ServiceReference {
    let ranking = properties
        .get(SERVICE_RANKING)
        .and_then(PropertyValue::as_i64)
        .and_then(|r| i32::try_from(r).ok())
        .unwrap_or(0);
    properties.insert(OBJECT_CLASS, interfaces.to_vec());
    properties.insert(SERVICE_ID, id.0 as i64);
    ServiceReference {
        id,
        ranking,
        interfaces,
        properties: Arc::new(properties),
    }
}

/// 已注册服务的发布方句柄
pub struct ServiceRegistration {
    registry: Weak<RegistryInner>,
    id: ServiceId,
    unregistered: AtomicBool,
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration").field("id", &self.id).finish()
    }
}

impl ServiceRegistration {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn reference(&self) -> Option<ServiceReference> {
        let inner = self.registry.upgrade()?;
        let entries = inner.entries.read();
        entries.get(&self.id).map(|e| e.reference.clone())
    }

    pub fn set_properties(&self, properties: Properties) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let updated = {
            let mut entries = inner.entries.write();
            let Some(entry) = entries.get_mut(&self.id) else {
                return;
            };
            let reference = make_reference(self.id, entry.reference.interfaces.clone(), properties);
            entry.reference = reference.clone();
            reference
        };
        notify(&inner, &ServiceEvent::Modified(updated));
    }

    /// 幂等：仅首次调用生效。先派发 Unregistering，再移除条目。
    pub fn unregister(&self) -> bool {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let Some(reference) = inner.entries.read().get(&self.id).map(|e| e.reference.clone()) else {
            return false;
        };
        notify(&inner, &ServiceEvent::Unregistering(reference));
        inner.entries.write().remove(&self.id);
        tracing::debug!(service = self.id.0, "service unregistered");
        true
    }
}

// 使用计数只做记账：注销时不回调工厂 unget，发布方自行拆除实例。
