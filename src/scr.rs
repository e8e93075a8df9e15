//! 协调器：全局组件表、id 分配、配置路由与依赖环检测。
//!
//! 每个组件由自己的闸门串行化（见 [`crate::gate`]），不同组件互不阻塞。
//! 注册表与配置存储的事件投递到相关组件的收件箱：空闲时由投递线程当场处理，
//! 被占用时交给持有者。回调中发起的 enable/disable/remove 记入本线程的延迟队列，
//! 当前触发完成后再生效；new_instance 与按需取服务需要返回值，直接嵌套执行。
use parking_lot::{Mutex, RwLock};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::{
    component::{Component, ComponentInfo, ComponentInstanceHandle, ComponentState, ConfigKey},
    config::ScrConfig,
    config_store::{ConfigurationEvent, ConfigurationListener, ConfigurationStore, StoreListenerId},
    configuration::{ComponentConfiguration, DeactivationReason},
    cycle::DependencyGraph,
    description::ComponentDescription,
    error::{Result, ScrError},
    gate::{self, Acquire},
    implementation::ImplementationRegistry,
    properties::Properties,
    registry::{ConsumerId, ListenerId, ServiceEvent, ServiceListener, ServiceRegistry},
};

/// 组件收件箱中的工作项
#[derive(Debug)]
pub(crate) enum Work {
    Service(ServiceEvent),
    Configuration(ConfigurationEvent),
    Enable,
    Disable(DeactivationReason),
    Refresh,
    DisposeInstance(ConfigKey),
    Unget(Arc<ComponentConfiguration>, ConsumerId),
}

// 回调中发起、待当前触发完成后执行的调用
enum Deferred {
    Enable(String),
    Disable(String, DeactivationReason),
    Remove(String),
    DisposeInstance(String, ConfigKey),
}

thread_local! {
    static DEFERRED: RefCell<VecDeque<(Arc<ScrInner>, Deferred)>> = const { RefCell::new(VecDeque::new()) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

struct Flushing;

impl Flushing {
    fn enter() -> Option<Self> {
        FLUSHING.with(|f| (!f.replace(true)).then_some(Flushing))
    }
}

impl Drop for Flushing {
    fn drop(&mut self) {
        FLUSHING.with(|f| f.set(false));
    }
}

fn defer(inner: &Arc<ScrInner>, call: Deferred) {
    DEFERRED.with(|d| d.borrow_mut().push_back((inner.clone(), call)));
}

// 当前线程不在任何处理中时执行延迟队列
fn flush_deferred() {
    if gate::in_drain() {
        return;
    }
    let Some(_flushing) = Flushing::enter() else {
        return;
    };
    loop {
        let next = DEFERRED.with(|d| d.borrow_mut().pop_front());
        let Some((inner, call)) = next else {
            break;
        };
        inner.apply_deferred(call);
    }
}

pub(crate) struct ScrInner {
    config: ScrConfig,
    registry: ServiceRegistry,
    implementations: ImplementationRegistry,
    store: Option<ConfigurationStore>,
    components: RwLock<BTreeMap<String, Arc<Component>>>,
    // 配置 pid -> 订阅该 pid 的组件名
    pid_routes: RwLock<HashMap<String, BTreeSet<String>>>,
    next_id: AtomicU64,
    listeners: Mutex<Option<(ListenerId, Option<StoreListenerId>)>>,
}

impl ScrInner {
    pub(crate) fn config(&self) -> &ScrConfig {
        &self.config
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn add_route(&self, pid: &str, component: &str) {
        self.pid_routes
            .write()
            .entry(pid.to_string())
            .or_default()
            .insert(component.to_string());
    }

    pub(crate) fn remove_route(&self, pid: &str, component: &str) {
        let mut routes = self.pid_routes.write();
        if let Some(names) = routes.get_mut(pid) {
            names.remove(component);
            if names.is_empty() {
                routes.remove(pid);
            }
        }
    }

    pub(crate) fn component(&self, name: &str) -> Option<Arc<Component>> {
        self.components.read().get(name).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<Component>> {
        self.components.read().values().cloned().collect()
    }

    fn routed(&self, event: &ConfigurationEvent) -> Vec<Arc<Component>> {
        let names: BTreeSet<String> = {
            let routes = self.pid_routes.read();
            [Some(event.pid()), event.factory_pid()]
                .into_iter()
                .flatten()
                .filter_map(|pid| routes.get(pid))
                .flatten()
                .cloned()
                .collect()
        };
        names.iter().filter_map(|n| self.component(n)).collect()
    }

    /// 持组件闸门执行 `f`（等待上限为 lock_timeout），结束后执行本线程的延迟队列
    pub(crate) fn with_component<R>(&self, component: &Component, f: impl FnOnce() -> R) -> Option<R> {
        let out = component
            .gate()
            .run(Acquire::Wait(self.config.lock_timeout()), &|w| component.apply(w), f);
        if out.is_none() {
            tracing::warn!(component = %component.name(), timeout_ms = self.config.lock_timeout_ms, "component busy");
        }
        flush_deferred();
        out
    }

    /// 投递到组件收件箱：取不到闸门时留给持有者
    pub(crate) fn hand_off(&self, component: &Component, work: Work) {
        component.gate().post(work);
        component.gate().kick(&|w| component.apply(w));
    }

    // 处理中的线程只尝试，避免与其他持有者互等；其余线程有上限地等待
    fn deliver(&self, component: &Component, work: Work) {
        let how = if gate::in_drain() {
            Acquire::Try
        } else {
            Acquire::Wait(self.config.lock_timeout())
        };
        component.gate().post(work);
        if component.gate().run(how, &|w| component.apply(w), || ()).is_none() {
            tracing::debug!(component = %component.name(), "component busy; event left to its holder");
        }
    }

    fn service_changed(&self, event: &ServiceEvent) {
        for c in self.snapshot() {
            self.deliver(&c, Work::Service(event.clone()));
        }
        flush_deferred();
    }

    fn configuration_changed(&self, event: &ConfigurationEvent) {
        for c in self.routed(event) {
            self.deliver(&c, Work::Configuration(event.clone()));
        }
        flush_deferred();
    }

    fn enable_now(&self, component: &Component) -> Result<()> {
        match self.with_component(component, || component.enable()) {
            Some(done) => done,
            None => {
                self.hand_off(component, Work::Enable);
                Ok(())
            }
        }
    }

    fn disable_now(&self, component: &Component, reason: DeactivationReason) {
        if self.with_component(component, || component.disable(reason)).is_none() {
            self.hand_off(component, Work::Disable(reason));
        }
    }

    fn remove_now(&self, name: &str) {
        if let Some(c) = self.component(name) {
            self.disable_now(&c, DeactivationReason::Disposed);
        }
        self.components.write().remove(name);
    }

    fn dispose_instance_now(&self, component: &Component, key: ConfigKey) {
        let work_key = key.clone();
        if self
            .with_component(component, || component.dispose_key(&key, DeactivationReason::Disposed))
            .is_none()
        {
            self.hand_off(component, Work::DisposeInstance(work_key));
        }
    }

    fn apply_deferred(&self, call: Deferred) {
        match call {
            Deferred::Enable(name) => {
                if let Some(c) = self.component(&name) {
                    if let Err(e) = self.enable_now(&c) {
                        tracing::warn!(component = %name, error = %e, "deferred enable failed");
                    }
                }
            }
            Deferred::Disable(name, reason) => {
                if let Some(c) = self.component(&name) {
                    self.disable_now(&c, reason);
                }
            }
            Deferred::Remove(name) => self.remove_now(&name),
            Deferred::DisposeInstance(name, key) => {
                if let Some(c) = self.component(&name) {
                    self.dispose_instance_now(&c, key);
                }
            }
        }
    }

    fn graph(&self) -> DependencyGraph {
        DependencyGraph::build(self.snapshot().iter().filter_map(|c| c.graph_node()))
    }

    pub(crate) fn check_cycle(&self, name: &str) {
        let Some(path) = self.graph().find_cycle(name) else {
            return;
        };
        tracing::error!(component = %name, cycle = ?path, "dependency cycle detected; components stay unsatisfied");
        for member in &path {
            if let Some(c) = self.component(member) {
                c.mark_cycle(path.clone());
            }
        }
    }
}

struct RegistryBridge(Weak<ScrInner>);

impl ServiceListener for RegistryBridge {
    fn service_changed(&self, event: &ServiceEvent) {
        if let Some(inner) = self.0.upgrade() {
            inner.service_changed(event);
        }
    }
}

struct StoreBridge(Weak<ScrInner>);

impl ConfigurationListener for StoreBridge {
    fn configuration_changed(&self, event: &ConfigurationEvent) {
        if let Some(inner) = self.0.upgrade() {
            inner.configuration_changed(event);
        }
    }
}

/// 运行时句柄，克隆开销低
#[derive(Clone)]
pub struct Scr {
    inner: Arc<ScrInner>,
}

impl fmt::Debug for Scr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scr")
            .field("components", &self.inner.components.read().len())
            .finish()
    }
}

impl Scr {
    pub fn new(
        config: ScrConfig,
        registry: ServiceRegistry,
        implementations: ImplementationRegistry,
        store: Option<ConfigurationStore>,
    ) -> Self {
        let inner = Arc::new(ScrInner {
            config,
            registry: registry.clone(),
            implementations,
            store: store.clone(),
            components: RwLock::new(BTreeMap::new()),
            pid_routes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(None),
        });
        let service_listener = registry.add_listener(Arc::new(RegistryBridge(Arc::downgrade(&inner))));
        let store_listener = store
            .as_ref()
            .map(|s| s.add_listener(Arc::new(StoreBridge(Arc::downgrade(&inner)))));
        *inner.listeners.lock() = Some((service_listener, store_listener));
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ScrInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &ScrConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    pub fn config_store(&self) -> Option<&ConfigurationStore> {
        self.inner.store.as_ref()
    }

    pub fn implementations(&self) -> &ImplementationRegistry {
        &self.inner.implementations
    }

    fn require(&self, name: &str) -> Result<Arc<Component>> {
        self.inner
            .component(name)
            .ok_or_else(|| ScrError::UnknownComponent(name.to_string()))
    }

    /// 以 Disabled 状态登记描述；不合法的描述在建立运行时节点前即被拒绝
    pub fn add_component(&self, desc: ComponentDescription) -> Result<()> {
        desc.validate()?;
        if let Some(implementation) = self.inner.implementations.resolve(&desc.implementation) {
            if let Some(missing) = desc
                .declared_callbacks()
                .into_iter()
                .find(|cb| !implementation.has_callback(cb))
            {
                return Err(ScrError::MissingCallback {
                    component: desc.name.clone(),
                    callback: missing.to_string(),
                });
            }
        }
        let mut components = self.inner.components.write();
        if components.contains_key(&desc.name) {
            return Err(ScrError::DuplicateComponent(desc.name));
        }
        let name = desc.name.clone();
        let component = Component::new(
            desc,
            Arc::downgrade(&self.inner),
            self.inner.registry.clone(),
            self.inner.implementations.clone(),
            self.inner.store.clone(),
        );
        components.insert(name.clone(), Arc::new(component));
        tracing::debug!(component = %name, "component added");
        Ok(())
    }

    /// 逐个加入并启用；单个描述出错只跳过该组件
    pub fn load(&self, descriptions: impl IntoIterator<Item = ComponentDescription>) -> Vec<ScrError> {
        let mut errors = Vec::new();
        for desc in descriptions {
            let name = desc.name.clone();
            let enabled = desc.enabled;
            if let Err(e) = self.add_component(desc) {
                tracing::warn!(component = %name, error = %e, "skipping component");
                errors.push(e);
                continue;
            }
            if enabled {
                if let Err(e) = self.enable(&name) {
                    tracing::warn!(component = %name, error = %e, "enable failed");
                    errors.push(e);
                }
            }
        }
        errors
    }

    pub fn enable(&self, name: &str) -> Result<()> {
        let component = self.require(name)?;
        if gate::in_drain() {
            if component.state() == ComponentState::Disposed {
                return Err(ScrError::ComponentDisposed(name.to_string()));
            }
            defer(&self.inner, Deferred::Enable(name.to_string()));
            return Ok(());
        }
        self.inner.enable_now(&component)
    }

    pub fn disable(&self, name: &str) -> Result<()> {
        let component = self.require(name)?;
        if gate::in_drain() {
            defer(
                &self.inner,
                Deferred::Disable(name.to_string(), DeactivationReason::Disabled),
            );
            return Ok(());
        }
        self.inner.disable_now(&component, DeactivationReason::Disabled);
        Ok(())
    }

    /// 永久释放并从组件表移除
    pub fn remove_component(&self, name: &str) -> Result<()> {
        self.require(name)?;
        if gate::in_drain() {
            defer(&self.inner, Deferred::Remove(name.to_string()));
            return Ok(());
        }
        self.inner.remove_now(name);
        Ok(())
    }

    /// 创建工厂组件的一个实例；需要返回值，回调中调用时也直接嵌套执行
    pub fn new_instance(&self, name: &str, overrides: Properties) -> Result<ComponentInstanceHandle> {
        let component = self.require(name)?;
        let cfg = self
            .inner
            .with_component(&component, || component.new_instance(overrides))
            .ok_or_else(|| ScrError::LockTimeout(name.to_string()))??;
        Ok(ComponentInstanceHandle::new(Arc::downgrade(&self.inner), cfg))
    }

    pub(crate) fn dispose_instance(&self, name: &str, key: &ConfigKey) -> Result<()> {
        let component = self.require(name)?;
        if gate::in_drain() {
            defer(&self.inner, Deferred::DisposeInstance(name.to_string(), key.clone()));
            return Ok(());
        }
        self.inner.dispose_instance_now(&component, key.clone());
        Ok(())
    }

    /// 以 Stopped 原因停用所有组件，并与注册表、配置存储脱钩
    pub fn shutdown(&self) {
        if let Some((service_listener, store_listener)) = self.inner.listeners.lock().take() {
            self.inner.registry.remove_listener(service_listener);
            if let (Some(store), Some(id)) = (&self.inner.store, store_listener) {
                store.remove_listener(id);
            }
        }
        if gate::in_drain() {
            let names: Vec<String> = self.inner.components.read().keys().cloned().collect();
            for name in names {
                defer(&self.inner, Deferred::Disable(name, DeactivationReason::Stopped));
            }
            return;
        }
        for c in self.inner.snapshot() {
            self.inner.disable_now(&c, DeactivationReason::Stopped);
        }
        tracing::debug!("runtime stopped");
    }

    pub fn component(&self, name: &str) -> Option<ComponentInfo> {
        self.inner.component(name).map(|c| c.info())
    }

    pub fn components(&self) -> Vec<ComponentInfo> {
        self.inner.snapshot().iter().map(|c| c.info()).collect()
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.inner.component(name).map(|c| c.state())
    }

    /// 在已启用但未满足的组件之间查找经过 `name` 的依赖环
    pub fn detect_cycle(&self, name: &str) -> Option<Vec<String>> {
        self.inner.graph().find_cycle(name)
    }
}
