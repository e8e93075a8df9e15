//! 已启用组件的一条活动依赖。
//!
//! 默认监听器使用描述中的目标过滤器。生效过滤器与之不同的配置身份
//! （经 `<name>.target` 或 `${key}` 模板）独占一个监听器。
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    description::ReferenceDescription,
    filter::Filter,
    listener::{ListenerUpdate, ReferenceListener},
    properties::{Properties, OBJECT_CLASS},
    registry::{ServiceEvent, ServiceReference, ServiceRegistry},
};

struct Listeners {
    default: ReferenceListener,
    per_config: BTreeMap<String, ReferenceListener>,
    satisfied: bool,
}

pub struct Reference {
    index: usize,
    name: Arc<str>,
    desc: ReferenceDescription,
    static_props: Properties,
    default_filter: Option<Filter>,
    registry: ServiceRegistry,
    listeners: Mutex<Listeners>,
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("name", &self.desc.name)
            .field("interface", &self.desc.interface)
            .finish()
    }
}

// 渲染失败的目标过滤器：注册表给每个服务都加 objectClass，因此永不命中
fn unmatchable() -> Filter {
    Filter::Not(Box::new(Filter::Present(OBJECT_CLASS.to_string())))
}

impl Reference {
    pub(crate) fn new(
        index: usize,
        desc: ReferenceDescription,
        static_props: &Properties,
        registry: ServiceRegistry,
    ) -> Self {
        let default_filter = match desc.target_template() {
            None => None,
            Some(template) => match template.render(static_props) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(reference = %desc.name, error = %e, "target filter cannot be rendered without configuration");
                    Some(unmatchable())
                }
            },
        };
        let mut default = ReferenceListener::new(desc.interface.clone(), default_filter.clone());
        default.seed(registry.lookup(&desc.interface, None));
        Self {
            index,
            name: Arc::from(desc.name.as_str()),
            desc,
            static_props: static_props.clone(),
            default_filter,
            registry,
            listeners: Mutex::new(Listeners {
                default,
                per_config: BTreeMap::new(),
                satisfied: false,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn interface(&self) -> &str {
        &self.desc.interface
    }

    pub fn description(&self) -> &ReferenceDescription {
        &self.desc
    }

    pub fn is_optional(&self) -> bool {
        self.desc.is_optional()
    }

    pub fn is_multiple(&self) -> bool {
        self.desc.is_multiple()
    }

    pub fn is_dynamic(&self) -> bool {
        self.desc.is_dynamic()
    }

    fn effective_filter(&self, props: &Properties) -> Option<Filter> {
        if let Some(raw) = props.get_str(&self.desc.target_property()) {
            return match Filter::parse(raw) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(reference = %self.desc.name, error = %e, "invalid target override");
                    Some(unmatchable())
                }
            };
        }
        match self.desc.target_template() {
            Some(template) if template.is_parameterized() => {
                let mut merged = self.static_props.clone();
                merged.merge(props);
                Some(template.render(&merged).unwrap_or_else(|e| {
                    tracing::warn!(reference = %self.desc.name, error = %e, "target filter cannot be rendered");
                    unmatchable()
                }))
            }
            _ => self.default_filter.clone(),
        }
    }

    /// 把配置条目应用到本引用；`pid` 的生效目标过滤器改变时返回 true
    pub(crate) fn configure(&self, pid: &str, props: &Properties) -> bool {
        let next = self.effective_filter(props);
        let mut listeners = self.listeners.lock();
        let previous = match listeners.per_config.get(pid) {
            Some(l) => l.filter().cloned(),
            None => self.default_filter.clone(),
        };
        if previous == next {
            return false;
        }
        if next == self.default_filter {
            listeners.per_config.remove(pid);
        } else {
            let mut listener = ReferenceListener::new(self.desc.interface.clone(), next);
            listener.seed(self.registry.lookup(&self.desc.interface, None));
            listeners.per_config.insert(pid.to_string(), listener);
        }
        true
    }

    pub(crate) fn unconfigure(&self, pid: &str) {
        self.listeners.lock().per_config.remove(pid);
    }

    /// 该 pid 所用监听器的键：有专属监听器时为 Some(pid)
    pub(crate) fn listener_key(&self, pid: Option<&str>) -> Option<String> {
        let listeners = self.listeners.lock();
        pid.filter(|p| listeners.per_config.contains_key(*p)).map(str::to_string)
    }

    pub(crate) fn targets(&self, pid: Option<&str>) -> Vec<ServiceReference> {
        let listeners = self.listeners.lock();
        listener_for(&listeners, pid).targets().to_vec()
    }

    pub(crate) fn has_target_for(&self, pid: Option<&str>) -> bool {
        self.is_optional() || !listener_for(&self.listeners.lock(), pid).is_empty()
    }

    pub(crate) fn handle(&self, event: &ServiceEvent) -> Vec<(Option<String>, ListenerUpdate)> {
        if !event.reference().provides(&self.desc.interface) {
            return Vec::new();
        }
        let mut listeners = self.listeners.lock();
        let mut updates = Vec::new();
        if let Some(u) = listeners.default.handle(event) {
            updates.push((None, u));
        }
        for (pid, listener) in listeners.per_config.iter_mut() {
            if let Some(u) = listener.handle(event) {
                updates.push((Some(pid.clone()), u));
            }
        }
        updates
    }

    fn compute_satisfied(&self, listeners: &Listeners, pids: &[String]) -> bool {
        if self.is_optional() {
            return true;
        }
        if pids.is_empty() {
            return !listeners.default.is_empty();
        }
        pids.iter()
            .any(|pid| !listener_for(listeners, Some(pid)).is_empty())
    }

    pub(crate) fn init_satisfied(&self, pids: &[String]) -> bool {
        let mut listeners = self.listeners.lock();
        let satisfied = self.compute_satisfied(&listeners, pids);
        listeners.satisfied = satisfied;
        satisfied
    }

    /// 自上次评估以来满足性发生跳变时返回 Some(新值)
    pub(crate) fn reevaluate(&self, pids: &[String]) -> Option<bool> {
        let mut listeners = self.listeners.lock();
        let satisfied = self.compute_satisfied(&listeners, pids);
        if satisfied == listeners.satisfied {
            return None;
        }
        listeners.satisfied = satisfied;
        Some(satisfied)
    }

    pub fn is_satisfied(&self) -> bool {
        self.listeners.lock().satisfied
    }

    pub fn target_count(&self) -> usize {
        self.listeners.lock().default.len()
    }

    pub(crate) fn stop(&self) {
        let mut listeners = self.listeners.lock();
        listeners.per_config.clear();
        listeners.default = ReferenceListener::new(self.desc.interface.clone(), self.default_filter.clone());
        listeners.satisfied = false;
    }
}

fn listener_for<'a>(listeners: &'a Listeners, pid: Option<&str>) -> &'a ReferenceListener {
    pid.and_then(|p| listeners.per_config.get(p))
        .unwrap_or(&listeners.default)
}
