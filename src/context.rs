use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::{
    any::Any,
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    error::{Result, ScrError},
    properties::{Properties, PropertyValue},
    registry::{ConsumerId, ServiceId, ServiceObject, ServiceReference},
    scr::{Scr, ScrInner},
};

/// 某实例上下文的某个引用所绑定的服务
#[derive(Clone)]
pub struct BoundService {
    reference_name: Arc<str>,
    reference: ServiceReference,
    service: ServiceObject,
}

impl BoundService {
    pub(crate) fn new(reference_name: Arc<str>, reference: ServiceReference, service: ServiceObject) -> Self {
        Self {
            reference_name,
            reference,
            service,
        }
    }

    /// 所属引用名
    pub fn name(&self) -> &str {
        &self.reference_name
    }

    pub fn id(&self) -> ServiceId {
        self.reference.id()
    }

    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    pub fn service(&self) -> &ServiceObject {
        &self.service
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.service.clone().downcast::<T>().ok()
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.reference.property(key)
    }
}

impl fmt::Debug for BoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundService")
            .field("reference", &self.reference_name)
            .field("service", &self.reference.id())
            .finish()
    }
}

struct ContextInner {
    component: String,
    component_id: u64,
    consumer: Option<ConsumerId>,
    properties: RwLock<Properties>,
    reference_names: Vec<Arc<str>>,
    // 按引用下标存放，顺序即绑定顺序
    bound: Mutex<Vec<SmallVec<[BoundService; 1]>>>,
    scr: Weak<ScrInner>,
}

/// 传给同一实例上下文全部回调的上下文
#[derive(Clone)]
pub struct ComponentContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("component", &self.inner.component)
            .field("id", &self.inner.component_id)
            .finish()
    }
}

impl ComponentContext {
    pub(crate) fn new(
        component: String,
        component_id: u64,
        consumer: Option<ConsumerId>,
        properties: Properties,
        reference_names: Vec<Arc<str>>,
        scr: Weak<ScrInner>,
    ) -> Self {
        let bound = reference_names.iter().map(|_| SmallVec::new()).collect();
        Self {
            inner: Arc::new(ContextInner {
                component,
                component_id,
                consumer,
                properties: RwLock::new(properties),
                reference_names,
                bound: Mutex::new(bound),
                scr,
            }),
        }
    }

    pub fn component_name(&self) -> &str {
        &self.inner.component
    }

    pub fn component_id(&self) -> u64 {
        self.inner.component_id
    }

    /// 服务工厂配置下为获取服务的使用方
    pub fn consumer(&self) -> Option<&ConsumerId> {
        self.inner.consumer.as_ref()
    }

    pub fn properties(&self) -> Properties {
        self.inner.properties.read().clone()
    }

    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.inner.properties.read().get(key).cloned()
    }

    pub(crate) fn set_properties(&self, properties: Properties) {
        *self.inner.properties.write() = properties;
    }

    fn index_of(&self, reference: &str) -> Option<usize> {
        self.inner.reference_names.iter().position(|n| &**n == reference)
    }

    pub fn locate_service(&self, reference: &str) -> Option<ServiceObject> {
        let idx = self.index_of(reference)?;
        self.inner.bound.lock()[idx].first().map(|b| b.service.clone())
    }

    pub fn locate_services(&self, reference: &str) -> Vec<ServiceObject> {
        self.bound(reference).into_iter().map(|b| b.service).collect()
    }

    pub fn bound(&self, reference: &str) -> Vec<BoundService> {
        match self.index_of(reference) {
            Some(idx) => self.inner.bound.lock()[idx].to_vec(),
            None => Vec::new(),
        }
    }

    pub fn scr(&self) -> Option<Scr> {
        self.inner.scr.upgrade().map(Scr::from_inner)
    }

    /// 回调内调用时排队，当前触发完成后生效
    pub fn enable_component(&self, name: &str) -> Result<()> {
        self.scr()
            .ok_or_else(|| ScrError::Runtime("runtime is gone".into()))?
            .enable(name)
    }

    pub fn disable_component(&self, name: &str) -> Result<()> {
        self.scr()
            .ok_or_else(|| ScrError::Runtime("runtime is gone".into()))?
            .disable(name)
    }

    pub(crate) fn is_bound(&self, index: usize, id: ServiceId) -> bool {
        self.inner.bound.lock()[index].iter().any(|b| b.id() == id)
    }

    pub(crate) fn bound_count(&self, index: usize) -> usize {
        self.inner.bound.lock()[index].len()
    }

    pub(crate) fn first_bound(&self, index: usize) -> Option<BoundService> {
        self.inner.bound.lock()[index].first().cloned()
    }

    pub(crate) fn push_bound(&self, index: usize, service: BoundService) {
        self.inner.bound.lock()[index].push(service);
    }

    pub(crate) fn take_bound(&self, index: usize, id: ServiceId) -> Option<BoundService> {
        let mut bound = self.inner.bound.lock();
        let pos = bound[index].iter().position(|b| b.id() == id)?;
        Some(bound[index].remove(pos))
    }

    /// 属性变化后刷新引用快照
    pub(crate) fn refresh_bound(&self, index: usize, reference: &ServiceReference) -> Option<BoundService> {
        let mut bound = self.inner.bound.lock();
        let entry = bound[index].iter_mut().find(|b| b.id() == reference.id())?;
        entry.reference = reference.clone();
        Some(entry.clone())
    }

    /// 取出全部绑定，按解绑顺序（绑定顺序的逆序）返回
    pub(crate) fn drain_bound(&self) -> Vec<(usize, BoundService)> {
        let mut bound = self.inner.bound.lock();
        let mut out = Vec::new();
        for (idx, list) in bound.iter_mut().enumerate().rev() {
            while let Some(b) = list.pop() {
                out.push((idx, b));
            }
        }
        out
    }
}
