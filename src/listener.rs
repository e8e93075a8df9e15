//! 按排名跟踪匹配同一引用的服务。
use crate::{
    filter::Filter,
    registry::{ServiceEvent, ServiceId, ServiceReference},
};

#[derive(Clone, Debug)]
pub enum TargetChange {
    Added(ServiceReference),
    Removed(ServiceReference),
    Modified(ServiceReference),
}

/// 一次监听器变化，以及单基数引用在其前后的选择
#[derive(Clone, Debug)]
pub struct ListenerUpdate {
    pub change: TargetChange,
    pub previous: Option<ServiceReference>,
    pub selected: Option<ServiceReference>,
}

impl ListenerUpdate {
    pub fn selection_changed(&self) -> bool {
        self.previous.as_ref().map(ServiceReference::id) != self.selected.as_ref().map(ServiceReference::id)
    }
}

#[derive(Debug)]
pub struct ReferenceListener {
    interface: String,
    filter: Option<Filter>,
    // 有序：(ranking 降序, id 升序)；下标 0 即单基数的选中目标
    targets: Vec<ServiceReference>,
}

impl ReferenceListener {
    pub fn new(interface: impl Into<String>, filter: Option<Filter>) -> Self {
        Self {
            interface: interface.into(),
            filter,
            targets: Vec::new(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn matches(&self, reference: &ServiceReference) -> bool {
        reference.provides(&self.interface)
            && self.filter.as_ref().map_or(true, |f| f.matches(reference.properties()))
    }

    pub fn seed(&mut self, references: impl IntoIterator<Item = ServiceReference>) {
        for r in references {
            if self.matches(&r) {
                self.add(r);
            }
        }
    }

    /// 二分插入，不整体重排；已存在则忽略
    pub fn add(&mut self, reference: ServiceReference) -> bool {
        if self.contains(reference.id()) {
            return false;
        }
        let pos = self.targets.partition_point(|t| t.outranks(&reference));
        self.targets.insert(pos, reference);
        true
    }

    pub fn remove(&mut self, id: ServiceId) -> Option<ServiceReference> {
        let pos = self.targets.iter().position(|t| t.id() == id)?;
        Some(self.targets.remove(pos))
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.targets.iter().any(|t| t.id() == id)
    }

    pub fn handle(&mut self, event: &ServiceEvent) -> Option<ListenerUpdate> {
        let previous = self.selected().cloned();
        let change = match event {
            ServiceEvent::Registered(r) => {
                if self.matches(r) && self.add(r.clone()) {
                    TargetChange::Added(r.clone())
                } else {
                    return None;
                }
            }
            ServiceEvent::Unregistering(r) => TargetChange::Removed(self.remove(r.id())?),
            ServiceEvent::Modified(r) => match (self.contains(r.id()), self.matches(r)) {
                (true, true) => {
                    // 排名可能变化：移除后重新插入
                    self.remove(r.id());
                    self.add(r.clone());
                    TargetChange::Modified(r.clone())
                }
                (true, false) => TargetChange::Removed(self.remove(r.id())?),
                (false, true) => {
                    self.add(r.clone());
                    TargetChange::Added(r.clone())
                }
                (false, false) => return None,
            },
        };
        Some(ListenerUpdate {
            change,
            previous,
            selected: self.selected().cloned(),
        })
    }

    pub fn selected(&self) -> Option<&ServiceReference> {
        self.targets.first()
    }

    pub fn targets(&self) -> &[ServiceReference] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
