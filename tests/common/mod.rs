#![allow(dead_code)]
//! 集成测试共用夹具：记录回调顺序的实现类型 + 组装好的运行时

use mmg_scr::{
    config_store::ConfigurationStore,
    configuration::ConfigurationState,
    prelude::*,
    properties::{COMPONENT_NAME, SERVICE_RANKING},
    registry::ServiceRegistration,
};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

pub const RECORDER: &str = "test.Recorder";

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

pub struct Recorder {
    component: String,
    journal: Journal,
}

impl Recorder {
    fn log(&self, entry: impl fmt::Display) {
        self.journal.push(format!("{}:{entry}", self.component));
    }
}

/// 绑定目标的标签：组件发布的服务取 component.name，外部服务取 label
pub fn provider_label(svc: &BoundService) -> String {
    svc.property(COMPONENT_NAME)
        .or_else(|| svc.property("label"))
        .and_then(PropertyValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", svc.id().0))
}

/// 属性 `fail.activate = true` 时 activate 返回错误
pub fn recording(journal: &Journal) -> ImplementationType {
    let journal = journal.clone();
    ImplementationType::builder::<Recorder>(RECORDER, move |ctx: &ComponentContext| {
        Ok(Recorder {
            component: ctx.component_name().to_string(),
            journal: journal.clone(),
        })
    })
    .activate("activate", |r: &Recorder, ctx: &ComponentContext| {
        if ctx.property("fail.activate").and_then(|v| v.as_bool()) == Some(true) {
            r.log("activate-failed");
            anyhow::bail!("activation refused by test");
        }
        r.log("activate");
        Ok(())
    })
    .deactivate(
        "deactivate",
        |r: &Recorder, _ctx: &ComponentContext, reason: DeactivationReason| {
            r.log(format!("deactivate:{reason}"));
            Ok(())
        },
    )
    .modified("modified", |r: &Recorder, _ctx: &ComponentContext| {
        r.log("modified");
        Ok(())
    })
    .bind("bind", |r: &Recorder, svc: &BoundService| {
        r.log(format!("bind:{}:{}", svc.name(), provider_label(svc)));
        Ok(())
    })
    .unbind("unbind", |r: &Recorder, svc: &BoundService| {
        r.log(format!("unbind:{}:{}", svc.name(), provider_label(svc)));
        Ok(())
    })
    .updated("updated", |r: &Recorder, svc: &BoundService| {
        r.log(format!("updated:{}:{}", svc.name(), provider_label(svc)));
        Ok(())
    })
    .build()
}

pub struct Harness {
    pub scr: Scr,
    pub registry: ServiceRegistry,
    pub store: ConfigurationStore,
    pub implementations: ImplementationRegistry,
    pub journal: Journal,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ScrConfig::default())
    }

    pub fn with_config(cfg: ScrConfig) -> Self {
        mmg_scr::app::init_logging();
        let journal = Journal::default();
        let implementations = ImplementationRegistry::new();
        implementations.register(recording(&journal));
        let registry = ServiceRegistry::new();
        let store = ConfigurationStore::new();
        let scr = Scr::new(cfg, registry.clone(), implementations.clone(), Some(store.clone()));
        Self {
            scr,
            registry,
            store,
            implementations,
            journal,
        }
    }

    pub fn load(&self, descriptions: impl IntoIterator<Item = ComponentDescription>) {
        let errors = self.scr.load(descriptions);
        assert!(errors.is_empty(), "unexpected load errors: {errors:?}");
    }

    pub fn state(&self, name: &str) -> ComponentState {
        self.scr.state(name).expect("known component")
    }

    pub fn configuration_states(&self, name: &str) -> Vec<ConfigurationState> {
        self.scr
            .component(name)
            .expect("known component")
            .configurations
            .iter()
            .map(|c| c.state)
            .collect()
    }

    pub fn configuration_keys(&self, name: &str) -> Vec<String> {
        self.scr
            .component(name)
            .expect("known component")
            .configurations
            .iter()
            .map(|c| c.key.clone())
            .collect()
    }

    pub fn take(&self) -> Vec<String> {
        self.journal.take()
    }
}

pub fn component(name: &str) -> ComponentDescription {
    ComponentDescription::new(name, RECORDER)
        .activate("activate")
        .deactivate("deactivate")
}

pub fn provider(name: &str, interface: &str) -> ComponentDescription {
    component(name).service(interface).immediate(true)
}

/// 引用带上 bind/unbind/updated 记录回调
pub fn recorded(reference: ReferenceDescription) -> ReferenceDescription {
    reference.bind("bind").unbind("unbind").updated("updated")
}

pub fn consumer(name: &str, reference: ReferenceDescription) -> ComponentDescription {
    component(name).reference(recorded(reference))
}

/// 直接向注册表发布一个外部服务
pub fn publish(registry: &ServiceRegistry, interface: &str, label: &str, ranking: i32) -> ServiceRegistration {
    registry.register(
        vec![interface.to_string()],
        ServiceProvider::Object(Arc::new(label.to_string())),
        Properties::new().with("label", label).with(SERVICE_RANKING, ranking),
    )
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
