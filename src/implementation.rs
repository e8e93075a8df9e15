//! 实现类型的强类型回调表。
//!
//! 每个实现类型连同具名回调槽登记一次。描述按名字引用回调，
//! 运行时在表中查槽，不对实例做反射。
use parking_lot::RwLock;
use std::{any::Any, collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use crate::{
    configuration::DeactivationReason,
    context::{BoundService, ComponentContext},
    registry::ServiceObject,
};

pub type Instance = Arc<dyn Any + Send + Sync>;

type CreateFn = Arc<dyn Fn(&ComponentContext) -> anyhow::Result<Instance> + Send + Sync>;
type LifecycleFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &ComponentContext) -> anyhow::Result<()> + Send + Sync>;
type DeactivateFn = Arc<
    dyn Fn(&(dyn Any + Send + Sync), &ComponentContext, DeactivationReason) -> anyhow::Result<()>
        + Send
        + Sync,
>;
type BinderFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &BoundService) -> anyhow::Result<()> + Send + Sync>;
type ExposeFn = Arc<dyn Fn(&Instance) -> Option<ServiceObject> + Send + Sync>;

pub struct ImplementationType {
    name: String,
    type_name: &'static str,
    create: CreateFn,
    lifecycle: HashMap<String, LifecycleFn>,
    deactivators: HashMap<String, DeactivateFn>,
    binders: HashMap<String, BinderFn>,
    expose: Option<ExposeFn>,
}

impl fmt::Debug for ImplementationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationType")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .finish()
    }
}

fn type_mismatch<T>() -> anyhow::Error {
    anyhow::anyhow!("instance is not a {}", std::any::type_name::<T>())
}

impl ImplementationType {
    pub fn builder<T: Send + Sync + 'static>(
        name: impl Into<String>,
        create: impl Fn(&ComponentContext) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> ImplementationBuilder<T> {
        ImplementationBuilder {
            inner: ImplementationType {
                name: name.into(),
                type_name: std::any::type_name::<T>(),
                create: Arc::new(move |ctx: &ComponentContext| create(ctx).map(|t| Arc::new(t) as Instance)),
                lifecycle: HashMap::new(),
                deactivators: HashMap::new(),
                binders: HashMap::new(),
                expose: None,
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn has_callback(&self, name: &str) -> bool {
        self.lifecycle.contains_key(name) || self.deactivators.contains_key(name) || self.binders.contains_key(name)
    }

    pub(crate) fn create(&self, ctx: &ComponentContext) -> anyhow::Result<Instance> {
        (self.create)(ctx)
    }

    pub(crate) fn call_lifecycle(&self, name: &str, instance: &Instance, ctx: &ComponentContext) -> anyhow::Result<()> {
        match self.lifecycle.get(name) {
            Some(f) => f(instance.as_ref(), ctx),
            None => Err(anyhow::anyhow!("{} has no callback {name}", self.name)),
        }
    }

    pub(crate) fn call_deactivate(
        &self,
        name: &str,
        instance: &Instance,
        ctx: &ComponentContext,
        reason: DeactivationReason,
    ) -> anyhow::Result<()> {
        match self.deactivators.get(name) {
            Some(f) => f(instance.as_ref(), ctx, reason),
            None => Err(anyhow::anyhow!("{} has no deactivate callback {name}", self.name)),
        }
    }

    pub(crate) fn call_binder(&self, name: &str, instance: &Instance, service: &BoundService) -> anyhow::Result<()> {
        match self.binders.get(name) {
            Some(f) => f(instance.as_ref(), service),
            None => Err(anyhow::anyhow!("{} has no binder {name}", self.name)),
        }
    }

    /// 发布的服务对象；默认即实例本身
    pub(crate) fn service_object(&self, instance: &Instance) -> ServiceObject {
        self.expose
            .as_ref()
            .and_then(|f| f(instance))
            .unwrap_or_else(|| instance.clone())
    }
}

pub struct ImplementationBuilder<T> {
    inner: ImplementationType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ImplementationBuilder<T> {
    pub fn activate(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&T, &ComponentContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner.lifecycle.insert(name.into(), lifecycle_slot(f));
        self
    }

    /// 与 activate 同签名；仅在配置更新且组件声明了 modified 时调用
    pub fn modified(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&T, &ComponentContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner.lifecycle.insert(name.into(), lifecycle_slot(f));
        self
    }

    pub fn deactivate(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&T, &ComponentContext, DeactivationReason) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        let slot: DeactivateFn = Arc::new(move |any: &(dyn Any + Send + Sync), ctx: &ComponentContext, reason: DeactivationReason| match any.downcast_ref::<T>() {
            Some(t) => f(t, ctx, reason),
            None => Err(type_mismatch::<T>()),
        });
        self.inner.deactivators.insert(name.into(), slot);
        self
    }

    pub fn bind(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&T, &BoundService) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner.binders.insert(name.into(), binder_slot(f));
        self
    }

    pub fn unbind(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&T, &BoundService) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner.binders.insert(name.into(), binder_slot(f));
        self
    }

    pub fn updated(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&T, &BoundService) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner.binders.insert(name.into(), binder_slot(f));
        self
    }

    /// 把实例映射为以组件服务接口发布的对象，例如包装成服务对象的 `Arc<dyn Trait>`
    pub fn expose(mut self, f: impl Fn(Arc<T>) -> ServiceObject + Send + Sync + 'static) -> Self {
        self.inner.expose = Some(Arc::new(move |instance: &Instance| {
            instance.clone().downcast::<T>().ok().map(&f)
        }));
        self
    }

    pub fn build(self) -> ImplementationType {
        self.inner
    }
}

fn lifecycle_slot<T: Send + Sync + 'static>(
    f: impl Fn(&T, &ComponentContext) -> anyhow::Result<()> + Send + Sync + 'static,
) -> LifecycleFn {
    Arc::new(move |any: &(dyn Any + Send + Sync), ctx: &ComponentContext| match any.downcast_ref::<T>() {
        Some(t) => f(t, ctx),
        None => Err(type_mismatch::<T>()),
    })
}

fn binder_slot<T: Send + Sync + 'static>(
    f: impl Fn(&T, &BoundService) -> anyhow::Result<()> + Send + Sync + 'static,
) -> BinderFn {
    Arc::new(move |any: &(dyn Any + Send + Sync), svc: &BoundService| match any.downcast_ref::<T>() {
        Some(t) => f(t, svc),
        None => Err(type_mismatch::<T>()),
    })
}

/// `#[mmg_scr::implementation]` 生成的登记项，经 inventory 收集
pub struct RegisteredImplementation {
    pub build: fn() -> ImplementationType,
}

inventory::collect!(RegisteredImplementation);

/// 实现名到回调表的解析
#[derive(Clone, Default)]
pub struct ImplementationRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<ImplementationType>>>>,
}

impl fmt::Debug for ImplementationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationRegistry")
            .field("count", &self.inner.read().len())
            .finish()
    }
}

impl ImplementationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收集所有经 inventory 提交的实现类型
    pub fn from_inventory() -> Self {
        let registry = Self::new();
        for reg in inventory::iter::<RegisteredImplementation> {
            let implementation = (reg.build)();
            if registry.register(implementation).is_some() {
                tracing::warn!("implementation registered more than once; last one wins");
            }
        }
        registry
    }

    pub fn register(&self, implementation: ImplementationType) -> Option<Arc<ImplementationType>> {
        let name = implementation.name.clone();
        self.inner.write().insert(name, Arc::new(implementation))
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<ImplementationType>> {
        self.inner.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }
}
