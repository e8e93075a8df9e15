//! 每个描述对应的运行时节点：启用状态、未解决约束计数，以及按配置身份索引的配置集合。
//!
//! 组件的全部状态转换都在其闸门内执行。未解决计数在 `enable` 的同一临界区内
//! 一次算出，此后只由 `resolved_constraint` / `unresolved_constraint` 增减。
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::{
    config_store::{ConfigurationEvent, ConfigurationStore},
    configuration::{CmOutcome, ComponentConfiguration, ConfigDict, ConfigurationState, DeactivationReason, RefOutcome},
    cycle::GraphNode,
    description::{ComponentDescription, ConfigurationPolicy},
    error::{Result, ScrError},
    gate::Gate,
    implementation::{ImplementationRegistry, Instance},
    properties::{Properties, COMPONENT_FACTORY, COMPONENT_ID, COMPONENT_NAME},
    reference::Reference,
    registry::{ConsumerId, ServiceEvent, ServiceId, ServiceObject, ServiceProvider, ServiceRegistration, ServiceRegistry},
    scr::{Scr, ScrInner, Work},
};

/// 满足的工厂组件以此接口发布工厂句柄
pub const COMPONENT_FACTORY_INTERFACE: &str = "mmg.scr.ComponentFactory";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    /// 无外部配置
    NoConfig,
    Pid(String),
    /// 工厂组件按需创建的实例
    Instance(u64),
}

impl ConfigKey {
    pub fn pid(&self) -> Option<&str> {
        match self {
            ConfigKey::Pid(pid) => Some(pid),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::NoConfig => f.write_str("<none>"),
            ConfigKey::Pid(pid) => f.write_str(pid),
            ConfigKey::Instance(n) => write!(f, "#{n}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    Disabled,
    Enabling,
    Enabled,
    Satisfied,
    Disabling,
    Disposing,
    Disposed,
}

impl ComponentState {
    pub fn is_enabled(self) -> bool {
        matches!(
            self,
            ComponentState::Enabling | ComponentState::Enabled | ComponentState::Satisfied
        )
    }
}

/// 一次启用周期的共享状态，该周期内创建的所有配置共用
pub(crate) struct ComponentShared {
    pub name: String,
    pub id: u64,
    pub desc: Arc<ComponentDescription>,
    pub refs: Vec<Arc<Reference>>,
    pub reference_names: Vec<Arc<str>>,
    pub registry: ServiceRegistry,
    pub implementations: ImplementationRegistry,
    pub scr: Weak<ScrInner>,
    pub consumer: ConsumerId,
}

struct Node {
    state: ComponentState,
    unresolved: usize,
    shared: Option<Arc<ComponentShared>>,
    dicts: BTreeMap<String, ConfigDict>,
    config_missing: bool,
    cycle: Option<Vec<String>>,
    factory_registration: Option<ServiceRegistration>,
}

pub struct Component {
    desc: Arc<ComponentDescription>,
    scr: Weak<ScrInner>,
    registry: ServiceRegistry,
    implementations: ImplementationRegistry,
    store: Option<ConfigurationStore>,
    node: Mutex<Node>,
    gate: Gate<Work>,
    // 与状态锁分开：回调期间可能重入
    configs: Mutex<BTreeMap<ConfigKey, Vec<Arc<ComponentConfiguration>>>>,
    next_seq: AtomicU64,
    next_instance: AtomicU64,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.desc.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Component {
    pub(crate) fn new(
        desc: ComponentDescription,
        scr: Weak<ScrInner>,
        registry: ServiceRegistry,
        implementations: ImplementationRegistry,
        store: Option<ConfigurationStore>,
    ) -> Self {
        Self {
            desc: Arc::new(desc),
            scr,
            registry,
            implementations,
            store,
            node: Mutex::new(Node {
                state: ComponentState::Disabled,
                unresolved: 0,
                shared: None,
                dicts: BTreeMap::new(),
                config_missing: false,
                cycle: None,
                factory_registration: None,
            }),
            gate: Gate::default(),
            configs: Mutex::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
            next_instance: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn description(&self) -> &ComponentDescription {
        &self.desc
    }

    pub fn state(&self) -> ComponentState {
        self.node.lock().state
    }

    pub(crate) fn gate(&self) -> &Gate<Work> {
        &self.gate
    }

    /// 处理一条收件箱工作；调用方持有本组件闸门
    pub(crate) fn apply(&self, work: Work) {
        match work {
            Work::Service(event) => {
                if let ServiceEvent::Registered(r) = &event {
                    if !self.registry.is_registered(r.id()) {
                        tracing::debug!(component = %self.desc.name, service = r.id().0, "skipping stale registration event");
                        return;
                    }
                }
                self.service_changed(&event);
            }
            Work::Configuration(event) => self.configuration_changed(&event),
            Work::Enable => {
                if let Err(e) = self.enable() {
                    tracing::warn!(component = %self.desc.name, error = %e, "queued enable failed");
                }
            }
            Work::Disable(reason) => self.disable(reason),
            Work::Refresh => self.create_missing_configurations(),
            Work::DisposeInstance(key) => self.dispose_key(&key, DeactivationReason::Disposed),
            Work::Unget(cfg, consumer) => cfg.release_consumer(&consumer),
        }
    }

    pub fn unresolved(&self) -> usize {
        self.node.lock().unresolved
    }

    fn active_shared(&self) -> Option<Arc<ComponentShared>> {
        let node = self.node.lock();
        match node.state {
            ComponentState::Enabled | ComponentState::Satisfied => node.shared.clone(),
            _ => None,
        }
    }

    fn pids(&self) -> Vec<String> {
        self.node.lock().dicts.keys().cloned().collect()
    }

    fn uses_configuration(&self) -> bool {
        self.desc.configuration_policy != ConfigurationPolicy::Ignore && self.store.is_some()
    }

    pub(crate) fn enable(&self) -> Result<()> {
        let satisfied = {
            let mut node = self.node.lock();
            match node.state {
                ComponentState::Disposed | ComponentState::Disposing => {
                    return Err(ScrError::ComponentDisposed(self.desc.name.clone()))
                }
                ComponentState::Disabled => {}
                _ => return Ok(()),
            }
            let scr = self
                .scr
                .upgrade()
                .ok_or_else(|| ScrError::Runtime("runtime is gone".into()))?;
            node.state = ComponentState::Enabling;
            let id = scr.allocate_id();

            let refs: Vec<Arc<Reference>> = self
                .desc
                .references
                .iter()
                .enumerate()
                .map(|(i, r)| Arc::new(Reference::new(i, r.clone(), &self.desc.properties, self.registry.clone())))
                .collect();

            let mut dicts = BTreeMap::new();
            if self.uses_configuration() {
                scr.add_route(self.desc.config_pid(), &self.desc.name);
                if let Some(store) = &self.store {
                    dicts = load_dicts(store, self.desc.config_pid());
                }
            }
            for (pid, dict) in &dicts {
                for r in &refs {
                    r.configure(pid, &dict.properties);
                }
            }
            let pids: Vec<String> = dicts.keys().cloned().collect();
            let mut unresolved = refs.iter().filter(|r| !r.init_satisfied(&pids)).count();
            let config_missing = self.desc.configuration_policy == ConfigurationPolicy::Require && dicts.is_empty();
            if config_missing {
                unresolved += 1;
            }

            node.shared = Some(Arc::new(ComponentShared {
                name: self.desc.name.clone(),
                id,
                desc: self.desc.clone(),
                reference_names: refs.iter().map(|r| r.name_arc()).collect(),
                refs,
                registry: self.registry.clone(),
                implementations: self.implementations.clone(),
                scr: self.scr.clone(),
                consumer: ConsumerId::new(self.desc.name.clone()),
            }));
            node.dicts = dicts;
            node.config_missing = config_missing;
            node.unresolved = unresolved;
            node.state = if unresolved == 0 {
                ComponentState::Satisfied
            } else {
                ComponentState::Enabled
            };
            tracing::debug!(component = %self.desc.name, id, unresolved, "component enabled");
            unresolved == 0
        };

        if satisfied {
            self.satisfied();
        } else if self.desc.provides_service() {
            if let Some(scr) = self.scr.upgrade() {
                if scr.config().detect_cycles {
                    scr.check_cycle(&self.desc.name);
                }
            }
        }
        Ok(())
    }

    /// 幂等；永久性原因使组件进入 Disposed
    pub(crate) fn disable(&self, reason: DeactivationReason) {
        let (shared, factory_registration) = {
            let mut node = self.node.lock();
            match node.state {
                ComponentState::Disabled => {
                    if reason.is_permanent() {
                        node.state = ComponentState::Disposed;
                    }
                    return;
                }
                ComponentState::Disposed | ComponentState::Disabling | ComponentState::Disposing => return,
                _ => {}
            }
            node.state = if reason.is_permanent() {
                ComponentState::Disposing
            } else {
                ComponentState::Disabling
            };
            (node.shared.take(), node.factory_registration.take())
        };
        if let Some(registration) = factory_registration {
            registration.unregister();
        }
        self.dispose_all(reason);
        if let Some(shared) = shared {
            for r in &shared.refs {
                r.stop();
            }
        }
        if self.uses_configuration() {
            if let Some(scr) = self.scr.upgrade() {
                scr.remove_route(self.desc.config_pid(), &self.desc.name);
            }
        }
        let mut node = self.node.lock();
        node.state = if reason.is_permanent() {
            ComponentState::Disposed
        } else {
            ComponentState::Disabled
        };
        node.unresolved = 0;
        node.dicts.clear();
        node.config_missing = false;
        node.cycle = None;
        tracing::debug!(component = %self.desc.name, reason = ?reason, state = ?node.state, "component disabled");
    }

    fn resolved_constraint(&self) {
        let fire = {
            let mut node = self.node.lock();
            if node.unresolved == 0 {
                tracing::warn!(component = %self.desc.name, "constraint resolved twice");
                return;
            }
            node.unresolved -= 1;
            if node.unresolved == 0 && node.state == ComponentState::Enabled {
                node.state = ComponentState::Satisfied;
                node.cycle = None;
                true
            } else {
                false
            }
        };
        if fire {
            tracing::debug!(component = %self.desc.name, "component satisfied");
            self.satisfied();
        }
    }

    fn unresolved_constraint(&self, reason: DeactivationReason) {
        let fire = {
            let mut node = self.node.lock();
            node.unresolved += 1;
            if node.unresolved == 1 && node.state == ComponentState::Satisfied {
                node.state = ComponentState::Enabled;
                true
            } else {
                false
            }
        };
        if fire {
            tracing::debug!(component = %self.desc.name, reason = ?reason, "component unsatisfied");
            self.unsatisfied(reason);
        }
    }

    fn satisfied(&self) {
        if self.desc.is_factory() {
            self.register_factory();
        } else {
            self.create_missing_configurations();
        }
    }

    fn unsatisfied(&self, reason: DeactivationReason) {
        if self.desc.is_factory() {
            // 已创建的实例不受影响，只撤下工厂服务
            let registration = self.node.lock().factory_registration.take();
            if let Some(registration) = registration {
                registration.unregister();
            }
        } else {
            self.dispose_all(reason);
        }
    }

    fn register_factory(&self) {
        let (id, factory) = {
            let node = self.node.lock();
            if node.state != ComponentState::Satisfied || node.factory_registration.is_some() {
                return;
            }
            let (Some(shared), Some(factory)) = (node.shared.as_ref(), self.desc.factory.clone()) else {
                return;
            };
            (shared.id, factory)
        };
        let mut props = self.desc.properties.public();
        props.insert(COMPONENT_NAME, self.desc.name.clone());
        props.insert(COMPONENT_FACTORY, factory);
        props.insert(COMPONENT_ID, id as i64);
        let handle: ServiceObject = Arc::new(ComponentFactoryHandle {
            scr: self.scr.clone(),
            component: self.desc.name.clone(),
        });
        let registration = self.registry.register(
            vec![COMPONENT_FACTORY_INTERFACE.to_string()],
            ServiceProvider::Object(handle),
            props,
        );
        let mut node = self.node.lock();
        if node.state == ComponentState::Satisfied && node.factory_registration.is_none() {
            node.factory_registration = Some(registration);
        } else {
            drop(node);
            registration.unregister();
        }
    }

    /// 为每个尚无配置的已知身份创建一个配置
    pub(crate) fn create_missing_configurations(&self) {
        let (shared, wanted) = {
            let node = self.node.lock();
            if node.state != ComponentState::Satisfied || self.desc.is_factory() {
                return;
            }
            let Some(shared) = node.shared.clone() else {
                return;
            };
            let wanted: Vec<(ConfigKey, Option<ConfigDict>)> =
                if self.desc.configuration_policy == ConfigurationPolicy::Ignore || node.dicts.is_empty() {
                    vec![(ConfigKey::NoConfig, None)]
                } else {
                    node.dicts
                        .iter()
                        .map(|(pid, d)| (ConfigKey::Pid(pid.clone()), Some(d.clone())))
                        .collect()
                };
            (shared, wanted)
        };
        for (key, dict) in wanted {
            if !shared.refs.iter().all(|r| r.has_target_for(key.pid())) {
                continue;
            }
            let cfg = {
                let mut configs = self.configs.lock();
                let slot = configs.entry(key.clone()).or_default();
                if !slot.is_empty() {
                    continue;
                }
                let cfg = Arc::new(ComponentConfiguration::new(
                    shared.clone(),
                    key.clone(),
                    self.next_seq.fetch_add(1, Ordering::Relaxed),
                    dict,
                    Properties::new(),
                ));
                insert_sorted(slot, cfg.clone());
                cfg
            };
            tracing::debug!(component = %self.desc.name, key = %key, "configuration created");
            if let Err(e) = cfg.start() {
                tracing::error!(component = %self.desc.name, key = %key, error = %e, "activation failed");
            }
        }
    }

    pub(crate) fn configurations(&self) -> Vec<Arc<ComponentConfiguration>> {
        self.configs.lock().values().flatten().cloned().collect()
    }

    fn configuration(&self, key: &ConfigKey) -> Option<Arc<ComponentConfiguration>> {
        self.configs.lock().get(key).and_then(|slot| slot.first().cloned())
    }

    fn configurations_on(&self, reference: &Reference, listener: Option<&str>) -> Vec<Arc<ComponentConfiguration>> {
        self.configurations()
            .into_iter()
            .filter(|cfg| reference.listener_key(cfg.key().pid()).as_deref() == listener)
            .collect()
    }

    pub(crate) fn dispose_configuration(&self, cfg: &Arc<ComponentConfiguration>, reason: DeactivationReason) {
        if !cfg.dispose(reason) {
            return;
        }
        {
            let mut configs = self.configs.lock();
            if let Some(slot) = configs.get_mut(cfg.key()) {
                slot.retain(|c| !Arc::ptr_eq(c, cfg));
                if slot.is_empty() {
                    configs.remove(cfg.key());
                }
            }
        }
        if reason.is_recoverable_churn() && !matches!(cfg.key(), ConfigKey::Instance(_)) {
            // 当前触发完成后重建替代配置
            self.gate.post(Work::Refresh);
            self.gate.kick(&|w| self.apply(w));
        }
    }

    pub(crate) fn dispose_key(&self, key: &ConfigKey, reason: DeactivationReason) {
        let targets: Vec<_> = self.configs.lock().get(key).cloned().unwrap_or_default();
        for cfg in &targets {
            self.dispose_configuration(cfg, reason);
        }
    }

    fn dispose_all(&self, reason: DeactivationReason) {
        for cfg in self.configurations() {
            self.dispose_configuration(&cfg, reason);
        }
    }

    fn reevaluate_references(&self, shared: &ComponentShared, reason: DeactivationReason) {
        let pids = self.pids();
        for reference in &shared.refs {
            match reference.reevaluate(&pids) {
                Some(true) => self.resolved_constraint(),
                Some(false) => self.unresolved_constraint(reason),
                None => {}
            }
        }
    }

    pub(crate) fn service_changed(&self, event: &ServiceEvent) {
        let Some(shared) = self.active_shared() else {
            return;
        };
        for reference in &shared.refs {
            let updates = reference.handle(event);
            if updates.is_empty() {
                continue;
            }
            for (listener, update) in &updates {
                for cfg in self.configurations_on(reference, listener.as_deref()) {
                    if cfg.ref_updated(reference, update) == RefOutcome::Dispose {
                        self.dispose_configuration(&cfg, DeactivationReason::ReferenceChanged);
                    }
                }
            }
            let pids = self.pids();
            match reference.reevaluate(&pids) {
                Some(true) => self.resolved_constraint(),
                Some(false) => self.unresolved_constraint(DeactivationReason::ReferenceChanged),
                None => {}
            }
        }
        if self.state() == ComponentState::Satisfied {
            self.create_missing_configurations();
        }
    }

    fn owns(&self, event: &ConfigurationEvent) -> bool {
        let config_pid = self.desc.config_pid();
        match event.factory_pid() {
            Some(factory_pid) => factory_pid == config_pid,
            None => event.pid() == config_pid,
        }
    }

    pub(crate) fn configuration_changed(&self, event: &ConfigurationEvent) {
        if !self.uses_configuration() || !self.owns(event) {
            return;
        }
        let Some(shared) = self.active_shared() else {
            return;
        };
        let pid = event.pid().to_string();
        let require = self.desc.configuration_policy == ConfigurationPolicy::Require;
        match event {
            ConfigurationEvent::Updated {
                factory_pid,
                properties,
                ..
            } => {
                let dict = ConfigDict {
                    factory_pid: factory_pid.clone(),
                    properties: properties.clone(),
                };
                let first = {
                    let mut node = self.node.lock();
                    if node.dicts.get(&pid) == Some(&dict) {
                        return;
                    }
                    let first = node.dicts.is_empty();
                    node.dicts.insert(pid.clone(), dict.clone());
                    first
                };
                let mut target_changed = false;
                for r in &shared.refs {
                    target_changed |= r.configure(&pid, &dict.properties);
                }
                if let Some(cfg) = self.configuration(&ConfigKey::Pid(pid.clone())) {
                    match cfg.cm_updated(Some(dict), target_changed) {
                        CmOutcome::Dispose(reason) => self.dispose_configuration(&cfg, reason),
                        CmOutcome::Modified => {
                            tracing::debug!(component = %self.desc.name, pid = %pid, "configuration modified in place")
                        }
                        CmOutcome::Nothing => {}
                    }
                }
                if first && !require {
                    // 第一个配置条目取代无配置实例
                    self.dispose_key(&ConfigKey::NoConfig, DeactivationReason::ConfigurationModified);
                }
                self.reevaluate_references(&shared, DeactivationReason::ConfigurationModified);
                if first && require {
                    self.node.lock().config_missing = false;
                    self.resolved_constraint();
                }
            }
            ConfigurationEvent::Deleted { .. } => {
                let now_empty = {
                    let mut node = self.node.lock();
                    if node.dicts.remove(&pid).is_none() {
                        return;
                    }
                    node.dicts.is_empty()
                };
                for r in &shared.refs {
                    r.unconfigure(&pid);
                }
                self.dispose_key(&ConfigKey::Pid(pid.clone()), DeactivationReason::ConfigurationDeleted);
                if now_empty && require {
                    self.node.lock().config_missing = true;
                    self.unresolved_constraint(DeactivationReason::ConfigurationDeleted);
                }
                self.reevaluate_references(&shared, DeactivationReason::ConfigurationDeleted);
            }
        }
        if self.state() == ComponentState::Satisfied {
            self.create_missing_configurations();
        }
    }

    pub(crate) fn new_instance(&self, overrides: Properties) -> Result<Arc<ComponentConfiguration>> {
        let (shared, dict) = {
            let node = self.node.lock();
            if !self.desc.is_factory() {
                return Err(ScrError::NotAFactory(self.desc.name.clone()));
            }
            if node.state == ComponentState::Disposed {
                return Err(ScrError::ComponentDisposed(self.desc.name.clone()));
            }
            let shared = match (&node.shared, node.state) {
                (Some(shared), ComponentState::Satisfied) => shared.clone(),
                _ => return Err(ScrError::FactoryNotSatisfied(self.desc.name.clone())),
            };
            (shared, node.dicts.values().next().cloned())
        };
        let key = ConfigKey::Instance(self.next_instance.fetch_add(1, Ordering::Relaxed) + 1);
        let cfg = Arc::new(ComponentConfiguration::new(
            shared,
            key.clone(),
            self.next_seq.fetch_add(1, Ordering::Relaxed),
            dict,
            overrides,
        ));
        insert_sorted(self.configs.lock().entry(key.clone()).or_default(), cfg.clone());
        if let Err(e) = cfg.activate_immediate() {
            self.dispose_configuration(&cfg, DeactivationReason::Unspecified);
            return Err(e);
        }
        // 激活期间可能已失去满足
        if self.state() != ComponentState::Satisfied {
            self.dispose_configuration(&cfg, DeactivationReason::ReferenceChanged);
            return Err(ScrError::FactoryNotSatisfied(self.desc.name.clone()));
        }
        cfg.publish();
        tracing::debug!(component = %self.desc.name, key = %key, "factory instance created");
        Ok(cfg)
    }

    pub(crate) fn mark_cycle(&self, path: Vec<String>) {
        let mut node = self.node.lock();
        if node.state == ComponentState::Enabled {
            node.cycle = Some(path);
        }
    }

    pub(crate) fn graph_node(&self) -> Option<GraphNode> {
        let node = self.node.lock();
        if node.state != ComponentState::Enabled {
            return None;
        }
        let shared = node.shared.as_ref()?;
        Some(GraphNode {
            name: self.desc.name.clone(),
            provides: self.desc.services.clone(),
            requires: shared
                .refs
                .iter()
                .filter(|r| !r.is_optional() && !r.is_satisfied())
                .map(|r| r.interface().to_string())
                .collect(),
        })
    }

    pub fn info(&self) -> ComponentInfo {
        let (state, id, unresolved, cycle, refs) = {
            let node = self.node.lock();
            (
                node.state,
                node.shared.as_ref().map(|s| s.id),
                node.unresolved,
                node.cycle.clone(),
                node.shared.as_ref().map(|s| s.refs.clone()).unwrap_or_default(),
            )
        };
        ComponentInfo {
            name: self.desc.name.clone(),
            id,
            state,
            unresolved,
            factory: self.desc.factory.clone(),
            configurations: self
                .configurations()
                .iter()
                .map(|c| ConfigurationInfo {
                    key: c.key().to_string(),
                    state: c.state(),
                    properties: c.properties(),
                    contexts: c.context_count(),
                    service: c.service_id(),
                })
                .collect(),
            references: refs
                .iter()
                .map(|r| ReferenceInfo {
                    name: r.name().to_string(),
                    interface: r.interface().to_string(),
                    satisfied: r.is_satisfied(),
                    targets: r.target_count(),
                })
                .collect(),
            cycle,
        }
    }
}

fn insert_sorted(slot: &mut Vec<Arc<ComponentConfiguration>>, cfg: Arc<ComponentConfiguration>) {
    // 同一身份下按创建序号排序，首项即默认实例
    let pos = slot.partition_point(|c| c.seq() < cfg.seq());
    slot.insert(pos, cfg);
}

fn load_dicts(store: &ConfigurationStore, config_pid: &str) -> BTreeMap<String, ConfigDict> {
    let mut dicts = BTreeMap::new();
    if let Some(c) = store.get(config_pid).filter(|c| c.factory_pid.is_none()) {
        dicts.insert(
            c.pid,
            ConfigDict {
                factory_pid: None,
                properties: c.properties,
            },
        );
    }
    for c in store.list_factory(config_pid) {
        dicts.insert(
            c.pid,
            ConfigDict {
                factory_pid: c.factory_pid,
                properties: c.properties,
            },
        );
    }
    dicts
}

/// 供工具使用的状态快照
#[derive(Clone, Debug, Serialize)]
pub struct ComponentInfo {
    pub name: String,
    pub id: Option<u64>,
    pub state: ComponentState,
    pub unresolved: usize,
    pub factory: Option<String>,
    pub configurations: Vec<ConfigurationInfo>,
    pub references: Vec<ReferenceInfo>,
    pub cycle: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfigurationInfo {
    pub key: String,
    pub state: ConfigurationState,
    pub properties: Properties,
    pub contexts: usize,
    pub service: Option<ServiceId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferenceInfo {
    pub name: String,
    pub interface: String,
    pub satisfied: bool,
    pub targets: usize,
}

/// 工厂组件创建的活动实例
pub struct ComponentInstanceHandle {
    scr: Weak<ScrInner>,
    component: String,
    cfg: Arc<ComponentConfiguration>,
}

impl fmt::Debug for ComponentInstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstanceHandle")
            .field("component", &self.component)
            .field("key", self.cfg.key())
            .finish()
    }
}

impl ComponentInstanceHandle {
    pub(crate) fn new(scr: Weak<ScrInner>, cfg: Arc<ComponentConfiguration>) -> Self {
        Self {
            scr,
            component: cfg.component_name().to_string(),
            cfg,
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component
    }

    pub fn key(&self) -> &ConfigKey {
        self.cfg.key()
    }

    pub fn instance(&self) -> Option<Instance> {
        self.cfg.instance()
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instance()?.downcast::<T>().ok()
    }

    pub fn properties(&self) -> Properties {
        self.cfg.properties()
    }

    pub fn state(&self) -> ConfigurationState {
        self.cfg.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.cfg.is_disposed()
    }

    /// 释放后不会重建
    pub fn dispose(&self) -> Result<()> {
        let scr = self
            .scr
            .upgrade()
            .ok_or_else(|| ScrError::Runtime("runtime is gone".into()))?;
        Scr::from_inner(scr).dispose_instance(&self.component, self.cfg.key())
    }
}

/// 以 [`COMPONENT_FACTORY_INTERFACE`] 发布的服务对象
pub struct ComponentFactoryHandle {
    scr: Weak<ScrInner>,
    component: String,
}

impl fmt::Debug for ComponentFactoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactoryHandle")
            .field("component", &self.component)
            .finish()
    }
}

impl ComponentFactoryHandle {
    pub fn component_name(&self) -> &str {
        &self.component
    }

    pub fn new_instance(&self, overrides: Properties) -> Result<ComponentInstanceHandle> {
        let scr = self
            .scr
            .upgrade()
            .ok_or_else(|| ScrError::Runtime("runtime is gone".into()))?;
        Scr::from_inner(scr).new_instance(&self.component, overrides)
    }
}
