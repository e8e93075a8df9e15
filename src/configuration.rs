//! 可实例化单元：组件与一个配置身份的绑定。
//!
//! 配置拥有其实例上下文（一个共享上下文，或服务工厂下每个使用方一个）以及
//! 代表它们发布的服务注册。用户回调执行时不持有任何配置锁。
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    component::{Component, ComponentShared, ConfigKey},
    context::{BoundService, ComponentContext},
    error::{Result, ScrError},
    implementation::{ImplementationType, Instance},
    listener::{ListenerUpdate, TargetChange},
    properties::{Properties, COMPONENT_ID, COMPONENT_NAME, SERVICE_FACTORY_PID, SERVICE_PID},
    reference::Reference,
    registry::{
        ConsumerId, ServiceFactory, ServiceId, ServiceObject, ServiceProvider, ServiceReference,
        ServiceRegistration, ServiceScope,
    },
    scr::{ScrInner, Work},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeactivationReason {
    Unspecified,
    Disabled,
    ReferenceChanged,
    ConfigurationModified,
    ConfigurationDeleted,
    Disposed,
    Stopped,
}

impl DeactivationReason {
    /// 组件随之进入 Disposed，不可再启用
    pub fn is_permanent(self) -> bool {
        matches!(self, DeactivationReason::Disposed | DeactivationReason::Stopped)
    }

    /// 可恢复的抖动：组件仍满足时立即重建替代配置
    pub fn is_recoverable_churn(self) -> bool {
        matches!(
            self,
            DeactivationReason::ReferenceChanged | DeactivationReason::ConfigurationModified
        )
    }
}

impl fmt::Display for DeactivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeactivationReason::Unspecified => "unspecified",
            DeactivationReason::Disabled => "disabled",
            DeactivationReason::ReferenceChanged => "reference-changed",
            DeactivationReason::ConfigurationModified => "configuration-modified",
            DeactivationReason::ConfigurationDeleted => "configuration-deleted",
            DeactivationReason::Disposed => "disposed",
            DeactivationReason::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConfigurationState {
    Activating,
    Registered,
    Active,
    Deactivating,
    Deactive,
}

/// 配置内实例上下文的身份
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContextKey {
    Shared,
    Consumer(ConsumerId),
}

/// 组件视角的配置条目：属性及所属工厂 pid
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConfigDict {
    pub factory_pid: Option<String>,
    pub properties: Properties,
}

struct InstanceContext {
    implementation: Arc<ImplementationType>,
    instance: Instance,
    ctx: ComponentContext,
    service: ServiceObject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefOutcome {
    Nothing,
    Rebound,
    Dispose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CmOutcome {
    Nothing,
    Modified,
    Dispose(DeactivationReason),
}

pub struct ComponentConfiguration {
    shared: Arc<ComponentShared>,
    key: ConfigKey,
    seq: u64,
    state: Mutex<ConfigurationState>,
    dict: Mutex<Option<ConfigDict>>,
    overrides: Properties,
    properties: RwLock<Properties>,
    contexts: Mutex<BTreeMap<ContextKey, InstanceContext>>,
    // 正在激活的上下文；重入即环
    activating: Mutex<BTreeSet<ContextKey>>,
    registration: Mutex<Option<ServiceRegistration>>,
    disposed: Mutex<Option<DeactivationReason>>,
}

impl fmt::Debug for ComponentConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfiguration")
            .field("component", &self.shared.name)
            .field("key", &self.key)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl ComponentConfiguration {
    pub(crate) fn new(
        shared: Arc<ComponentShared>,
        key: ConfigKey,
        seq: u64,
        dict: Option<ConfigDict>,
        overrides: Properties,
    ) -> Self {
        let properties = resolve_properties(&shared, &key, dict.as_ref(), &overrides);
        Self {
            shared,
            key,
            seq,
            state: Mutex::new(ConfigurationState::Activating),
            dict: Mutex::new(dict),
            overrides,
            properties: RwLock::new(properties),
            contexts: Mutex::new(BTreeMap::new()),
            activating: Mutex::new(BTreeSet::new()),
            registration: Mutex::new(None),
            disposed: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub fn component_name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ConfigurationState {
        *self.state.lock()
    }

    pub fn properties(&self) -> Properties {
        self.properties.read().clone()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn service_id(&self) -> Option<ServiceId> {
        self.registration.lock().as_ref().map(ServiceRegistration::id)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.lock().is_some()
    }

    /// 共享上下文的实例（未激活时为 None）
    pub fn instance(&self) -> Option<Instance> {
        self.contexts
            .lock()
            .get(&ContextKey::Shared)
            .map(|c| c.instance.clone())
    }

    fn pid(&self) -> Option<&str> {
        self.key.pid()
    }

    fn is_immediate(&self) -> bool {
        matches!(self.key, ConfigKey::Instance(_)) || self.shared.desc.is_immediate()
    }

    fn set_state(&self, next: ConfigurationState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(component = %self.shared.name, key = %self.key, from = ?*state, to = ?next, "configuration state");
            *state = next;
        }
    }

    fn consumer(&self) -> &ConsumerId {
        &self.shared.consumer
    }

    fn snapshot(&self) -> Vec<(Arc<ImplementationType>, Instance, ComponentContext)> {
        self.contexts
            .lock()
            .values()
            .map(|c| (c.implementation.clone(), c.instance.clone(), c.ctx.clone()))
            .collect()
    }

    /// 立即型先激活再发布；延迟型只发布服务，不建实例
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_immediate() {
            self.activate_immediate()?;
            self.publish();
        } else {
            self.register_service();
            if !self.is_disposed() {
                self.set_state(ConfigurationState::Registered);
            }
        }
        Ok(())
    }

    pub(crate) fn activate_immediate(self: &Arc<Self>) -> Result<()> {
        self.set_state(ConfigurationState::Activating);
        match self.activate(ContextKey::Shared) {
            Ok(_) => Ok(()),
            Err(e) => {
                if !self.is_disposed() {
                    self.set_state(ConfigurationState::Deactive);
                }
                Err(e)
            }
        }
    }

    /// 为已激活的配置注册服务并置为 Active
    pub(crate) fn publish(self: &Arc<Self>) {
        self.register_service();
        if !self.is_disposed() {
            self.set_state(ConfigurationState::Active);
        }
    }

    fn register_service(self: &Arc<Self>) {
        let desc = &self.shared.desc;
        if !desc.provides_service() || self.is_disposed() || self.registration.lock().is_some() {
            return;
        }
        let scope = if desc.service_factory {
            ServiceScope::Consumer
        } else {
            ServiceScope::Singleton
        };
        let factory = Arc::new(ConfigurationServiceFactory {
            cfg: Arc::downgrade(self),
        });
        let registration = self.shared.registry.register(
            desc.services.clone(),
            ServiceProvider::Factory { factory, scope },
            self.properties().public(),
        );
        *self.registration.lock() = Some(registration);
    }

    fn refresh_registration(&self) {
        let props = self.properties().public();
        if let Some(reg) = self.registration.lock().as_ref() {
            reg.set_properties(props);
        }
    }

    /// 返回 `key` 已有的上下文，否则新建：创建实例、按声明顺序绑定引用、调用 activate
    pub(crate) fn activate(&self, key: ContextKey) -> Result<ServiceObject> {
        let name = &self.shared.name;
        if self.is_disposed() {
            return Err(ScrError::ConfigurationDisposed(name.clone()));
        }
        if let Some(existing) = self.contexts.lock().get(&key) {
            return Ok(existing.service.clone());
        }
        if !self.activating.lock().insert(key.clone()) {
            return Err(ScrError::CircularActivation(name.clone()));
        }
        let built = self.build_context(&key);
        self.activating.lock().remove(&key);
        let context = built?;
        let service = context.service.clone();
        // 激活期间已被处置：立刻拆除刚建好的上下文
        let disposed = *self.disposed.lock();
        if let Some(reason) = disposed {
            self.teardown(context, reason);
            return Err(ScrError::ConfigurationDisposed(name.clone()));
        }
        self.contexts.lock().insert(key, context);
        Ok(service)
    }

    fn build_context(&self, key: &ContextKey) -> Result<InstanceContext> {
        let shared = &self.shared;
        let implementation = shared
            .implementations
            .resolve(&shared.desc.implementation)
            .ok_or_else(|| ScrError::UnknownImplementation(shared.desc.implementation.clone()))?;
        if let Some(missing) = shared
            .desc
            .declared_callbacks()
            .into_iter()
            .find(|cb| !implementation.has_callback(cb))
        {
            return Err(ScrError::MissingCallback {
                component: shared.name.clone(),
                callback: missing.to_string(),
            });
        }
        let consumer = match key {
            ContextKey::Consumer(c) => Some(c.clone()),
            ContextKey::Shared => None,
        };
        let ctx = ComponentContext::new(
            shared.name.clone(),
            shared.id,
            consumer,
            self.properties(),
            shared.reference_names.clone(),
            shared.scr.clone(),
        );
        let instance = implementation
            .create(&ctx)
            .map_err(|source| ScrError::ActivationFailed {
                component: shared.name.clone(),
                source,
            })?;
        for reference in &shared.refs {
            if let Err(e) = self.bind_reference(&implementation, &instance, &ctx, reference) {
                self.unbind_all(&implementation, &instance, &ctx);
                return Err(e);
            }
        }
        if let Some(cb) = &shared.desc.activate {
            if let Err(source) = implementation.call_lifecycle(cb, &instance, &ctx) {
                self.unbind_all(&implementation, &instance, &ctx);
                return Err(ScrError::ActivationFailed {
                    component: shared.name.clone(),
                    source,
                });
            }
        }
        let service = implementation.service_object(&instance);
        tracing::debug!(component = %shared.name, key = %self.key, context = ?key, "context activated");
        Ok(InstanceContext {
            implementation,
            instance,
            ctx,
            service,
        })
    }

    fn bind_reference(
        &self,
        implementation: &ImplementationType,
        instance: &Instance,
        ctx: &ComponentContext,
        reference: &Reference,
    ) -> Result<()> {
        let targets = reference.targets(self.pid());
        if reference.is_multiple() {
            for target in &targets {
                self.bind_target(implementation, instance, ctx, reference, target);
            }
        } else {
            for target in &targets {
                if self.bind_target(implementation, instance, ctx, reference, target) {
                    break;
                }
            }
        }
        if !reference.is_optional() && ctx.bound_count(reference.index()) == 0 {
            return Err(ScrError::ReferenceUnavailable {
                component: self.shared.name.clone(),
                reference: reference.name().to_string(),
            });
        }
        Ok(())
    }

    fn bind_target(
        &self,
        implementation: &ImplementationType,
        instance: &Instance,
        ctx: &ComponentContext,
        reference: &Reference,
        target: &ServiceReference,
    ) -> bool {
        let idx = reference.index();
        if ctx.is_bound(idx, target.id()) {
            return true;
        }
        let Some(service) = self.shared.registry.get_service(self.consumer(), target) else {
            tracing::warn!(component = %self.shared.name, reference = reference.name(), service = target.id().0, "service could not be obtained");
            return false;
        };
        let bound = BoundService::new(reference.name_arc(), target.clone(), service);
        ctx.push_bound(idx, bound.clone());
        if let Some(cb) = &reference.description().bind {
            if let Err(e) = implementation.call_binder(cb, instance, &bound) {
                tracing::warn!(component = %self.shared.name, reference = reference.name(), error = %e, "bind callback failed");
            }
        }
        true
    }

    fn unbind_target(
        &self,
        implementation: &ImplementationType,
        instance: &Instance,
        ctx: &ComponentContext,
        reference: &Reference,
        id: ServiceId,
    ) {
        if let Some(bound) = ctx.take_bound(reference.index(), id) {
            self.release(implementation, instance, reference, bound);
        }
    }

    fn release(&self, implementation: &ImplementationType, instance: &Instance, reference: &Reference, bound: BoundService) {
        if let Some(cb) = &reference.description().unbind {
            if let Err(e) = implementation.call_binder(cb, instance, &bound) {
                tracing::warn!(component = %self.shared.name, reference = reference.name(), error = %e, "unbind callback failed");
            }
        }
        self.shared.registry.unget_service(self.consumer(), bound.reference());
    }

    /// 逆序解绑全部引用
    fn unbind_all(&self, implementation: &ImplementationType, instance: &Instance, ctx: &ComponentContext) {
        for (idx, bound) in ctx.drain_bound() {
            if let Some(reference) = self.shared.refs.get(idx) {
                self.release(implementation, instance, reference, bound);
            }
        }
    }

    fn teardown(&self, context: InstanceContext, reason: DeactivationReason) {
        let InstanceContext {
            implementation,
            instance,
            ctx,
            ..
        } = context;
        if let Some(cb) = &self.shared.desc.deactivate {
            if let Err(e) = implementation.call_deactivate(cb, &instance, &ctx, reason) {
                tracing::warn!(component = %self.shared.name, error = %e, "deactivate callback failed");
            }
        }
        self.unbind_all(&implementation, &instance, &ctx);
        tracing::debug!(component = %self.shared.name, key = %self.key, reason = ?reason, "context deactivated");
    }

    pub(crate) fn deactivate_context(&self, key: &ContextKey, reason: DeactivationReason) {
        let context = self.contexts.lock().remove(key);
        if let Some(context) = context {
            self.teardown(context, reason);
        }
    }

    /// 幂等：只有第一次调用执行拆除。先注销服务，再停用全部上下文。
    /// 注销事件在注销调用内同步送达空闲的使用方，使其先于本配置的 deactivate 解绑。
    pub(crate) fn dispose(&self, reason: DeactivationReason) -> bool {
        {
            let mut disposed = self.disposed.lock();
            if disposed.is_some() {
                return false;
            }
            *disposed = Some(reason);
        }
        self.set_state(ConfigurationState::Deactivating);
        let registration = self.registration.lock().take();
        if let Some(registration) = registration {
            registration.unregister();
        }
        let keys: Vec<ContextKey> = self.contexts.lock().keys().cloned().collect();
        for key in &keys {
            self.deactivate_context(key, reason);
        }
        self.set_state(ConfigurationState::Deactive);
        tracing::debug!(component = %self.shared.name, key = %self.key, reason = ?reason, "configuration disposed");
        true
    }

    /// 把一次监听器变化应用到本配置的每个活动上下文
    pub(crate) fn ref_updated(&self, reference: &Reference, update: &ListenerUpdate) -> RefOutcome {
        let mut outcome = RefOutcome::Nothing;
        for (implementation, instance, ctx) in self.snapshot() {
            match self.rebind(reference, update, &implementation, &instance, &ctx) {
                RefOutcome::Dispose => return RefOutcome::Dispose,
                RefOutcome::Rebound => outcome = RefOutcome::Rebound,
                RefOutcome::Nothing => {}
            }
        }
        outcome
    }

    fn rebind(
        &self,
        reference: &Reference,
        update: &ListenerUpdate,
        implementation: &ImplementationType,
        instance: &Instance,
        ctx: &ComponentContext,
    ) -> RefOutcome {
        let idx = reference.index();
        let mut outcome = RefOutcome::Nothing;
        if let TargetChange::Modified(r) = &update.change {
            if let Some(bound) = ctx.refresh_bound(idx, r) {
                if let Some(cb) = &reference.description().updated {
                    if let Err(e) = implementation.call_binder(cb, instance, &bound) {
                        tracing::warn!(component = %self.shared.name, reference = reference.name(), error = %e, "updated callback failed");
                    }
                }
                outcome = RefOutcome::Rebound;
            }
        }

        if !reference.is_dynamic() {
            let restart = if reference.is_multiple() {
                match &update.change {
                    TargetChange::Added(_) => true,
                    TargetChange::Removed(r) => ctx.is_bound(idx, r.id()),
                    TargetChange::Modified(_) => false,
                }
            } else {
                let bound = ctx.first_bound(idx).map(|b| b.id());
                update.selection_changed() && bound != update.selected.as_ref().map(ServiceReference::id)
            };
            return if restart { RefOutcome::Dispose } else { outcome };
        }

        if reference.is_multiple() {
            return match &update.change {
                TargetChange::Added(r) => {
                    if self.bind_target(implementation, instance, ctx, reference, r) {
                        RefOutcome::Rebound
                    } else {
                        outcome
                    }
                }
                TargetChange::Removed(r) => {
                    if !ctx.is_bound(idx, r.id()) {
                        return outcome;
                    }
                    self.unbind_target(implementation, instance, ctx, reference, r.id());
                    if !reference.is_optional() && ctx.bound_count(idx) == 0 {
                        RefOutcome::Dispose
                    } else {
                        RefOutcome::Rebound
                    }
                }
                TargetChange::Modified(_) => outcome,
            };
        }

        // 动态单基数：先绑新目标，再解绑旧目标
        let current = ctx.first_bound(idx).map(|b| b.reference().clone());
        let current_id = current.as_ref().map(ServiceReference::id);
        let wanted = update.selected.clone();
        if current_id == wanted.as_ref().map(ServiceReference::id) {
            return outcome;
        }
        match (wanted, current) {
            (Some(next), current) => {
                if self.bind_target(implementation, instance, ctx, reference, &next) {
                    if let Some(old) = current {
                        self.unbind_target(implementation, instance, ctx, reference, old.id());
                    }
                    RefOutcome::Rebound
                } else if current_id.map_or(false, |id| !self.shared.registry.is_registered(id)) {
                    // 旧目标已消失且替代目标不可获取
                    if reference.is_optional() {
                        if let Some(id) = current_id {
                            self.unbind_target(implementation, instance, ctx, reference, id);
                        }
                        RefOutcome::Rebound
                    } else {
                        RefOutcome::Dispose
                    }
                } else {
                    outcome
                }
            }
            (None, Some(old)) => {
                if reference.is_optional() {
                    self.unbind_target(implementation, instance, ctx, reference, old.id());
                    RefOutcome::Rebound
                } else {
                    RefOutcome::Dispose
                }
            }
            (None, None) => outcome,
        }
    }

    /// `None` 表示配置条目已删除
    pub(crate) fn cm_updated(&self, dict: Option<ConfigDict>, target_changed: bool) -> CmOutcome {
        let Some(dict) = dict else {
            return CmOutcome::Dispose(DeactivationReason::ConfigurationDeleted);
        };
        {
            let mut current = self.dict.lock();
            if current.as_ref() == Some(&dict) {
                return CmOutcome::Nothing;
            }
            *current = Some(dict.clone());
        }
        if target_changed {
            return CmOutcome::Dispose(DeactivationReason::ConfigurationModified);
        }
        let props = resolve_properties(&self.shared, &self.key, Some(&dict), &self.overrides);
        let contexts = self.snapshot();
        if contexts.is_empty() {
            *self.properties.write() = props;
            self.refresh_registration();
            return CmOutcome::Nothing;
        }
        let Some(cb) = &self.shared.desc.modified else {
            return CmOutcome::Dispose(DeactivationReason::ConfigurationModified);
        };
        *self.properties.write() = props.clone();
        for (implementation, instance, ctx) in contexts {
            ctx.set_properties(props.clone());
            if let Err(e) = implementation.call_lifecycle(cb, &instance, &ctx) {
                tracing::warn!(component = %self.shared.name, key = %self.key, error = %e, "modified callback failed");
            }
        }
        self.refresh_registration();
        CmOutcome::Modified
    }

    fn get_service(&self, consumer: &ConsumerId) -> Option<ServiceObject> {
        let key = if self.shared.desc.service_factory {
            ContextKey::Consumer(consumer.clone())
        } else {
            ContextKey::Shared
        };
        let idle = self.contexts.lock().is_empty();
        if idle {
            self.set_state(ConfigurationState::Activating);
        }
        match self.activate(key) {
            Ok(service) => {
                self.set_state(ConfigurationState::Active);
                Some(service)
            }
            Err(e) => {
                tracing::warn!(component = %self.shared.name, key = %self.key, consumer = %consumer, error = %e, "on-demand activation failed");
                if idle && !self.is_disposed() {
                    self.set_state(ConfigurationState::Registered);
                }
                None
            }
        }
    }

    pub(crate) fn release_consumer(&self, consumer: &ConsumerId) {
        if self.is_disposed() {
            return;
        }
        if self.shared.desc.service_factory {
            self.deactivate_context(&ContextKey::Consumer(consumer.clone()), DeactivationReason::Unspecified);
        } else if !self.is_immediate() {
            self.deactivate_context(&ContextKey::Shared, DeactivationReason::Unspecified);
        }
        if self.contexts.lock().is_empty() && self.registration.lock().is_some() {
            self.set_state(ConfigurationState::Registered);
        }
    }
}

fn resolve_properties(
    shared: &ComponentShared,
    key: &ConfigKey,
    dict: Option<&ConfigDict>,
    overrides: &Properties,
) -> Properties {
    let mut props = shared.desc.properties.clone();
    if let Some(dict) = dict {
        props.merge(&dict.properties);
    }
    if let ConfigKey::Pid(pid) = key {
        props.insert(SERVICE_PID, pid.clone());
        if let Some(factory_pid) = dict.and_then(|d| d.factory_pid.as_ref()) {
            props.insert(SERVICE_FACTORY_PID, factory_pid.clone());
        }
    }
    props.merge(overrides);
    props.insert(COMPONENT_NAME, shared.name.clone());
    props.insert(COMPONENT_ID, shared.id as i64);
    props
}

/// 每个配置发布的服务提供者；各上下文在首次 `get_service` 时建立。
/// 取用与释放都在所属组件的闸门内执行。
struct ConfigurationServiceFactory {
    cfg: Weak<ComponentConfiguration>,
}

impl ConfigurationServiceFactory {
    fn owner(&self, cfg: &ComponentConfiguration) -> Option<(Arc<ScrInner>, Arc<Component>)> {
        let scr = cfg.shared.scr.upgrade()?;
        let component = scr.component(&cfg.shared.name)?;
        Some((scr, component))
    }
}

impl ServiceFactory for ConfigurationServiceFactory {
    fn get_service(&self, consumer: &ConsumerId, _reference: &ServiceReference) -> Option<ServiceObject> {
        let cfg = self.cfg.upgrade()?;
        let Some((scr, component)) = self.owner(&cfg) else {
            return cfg.get_service(consumer);
        };
        scr.with_component(&component, || cfg.get_service(consumer)).flatten()
    }

    fn unget_service(&self, consumer: &ConsumerId, _reference: &ServiceReference, _service: ServiceObject) {
        let Some(cfg) = self.cfg.upgrade() else {
            return;
        };
        let Some((scr, component)) = self.owner(&cfg) else {
            cfg.release_consumer(consumer);
            return;
        };
        if scr.with_component(&component, || cfg.release_consumer(consumer)).is_none() {
            scr.hand_off(&component, Work::Unget(cfg.clone(), consumer.clone()));
        }
    }
}
