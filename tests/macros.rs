mod common;

use common::*;
use mmg_scr::{config_store::ConfigurationStore, prelude::*, registry::ConsumerId};
use parking_lot::Mutex;

#[derive(Default)]
struct Audited {
    log: Mutex<Vec<String>>,
}

impl Audited {
    fn note(&self, entry: String) {
        self.log.lock().push(entry);
    }
}

#[mmg_scr::implementation(name = "macro.Audited")]
impl Audited {
    #[activate]
    fn start(&self, ctx: &ComponentContext) {
        self.note(format!("start:{}", ctx.component_name()));
    }

    #[deactivate]
    fn stop(&self, reason: DeactivationReason) -> anyhow::Result<()> {
        self.note(format!("stop:{reason}"));
        Ok(())
    }

    #[modified]
    fn reconfigure(&self, ctx: &ComponentContext) {
        let level = ctx.property("level").map(|v| v.to_string()).unwrap_or_default();
        self.note(format!("modified:{level}"));
    }

    #[bind(name = "addLog")]
    fn add_log(&self, svc: &BoundService) {
        self.note(format!("bind:{}", provider_label(svc)));
    }

    #[unbind(name = "removeLog")]
    fn remove_log(&self, svc: &BoundService) {
        self.note(format!("unbind:{}", provider_label(svc)));
    }

    #[updated]
    fn log_changed(&self, svc: &BoundService) {
        self.note(format!("updated:{}", provider_label(svc)));
    }
}

#[derive(Default)]
struct Refuses;

#[mmg_scr::implementation]
impl Refuses {
    #[activate]
    fn activate(&self) -> std::result::Result<(), std::io::Error> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "not today"))
    }
}

fn audited() -> ComponentDescription {
    ComponentDescription::new("audited", "macro.Audited")
        .service("svc.Audited")
        .immediate(true)
        .activate("start")
        .deactivate("stop")
        .modified("reconfigure")
        .reference(
            ReferenceDescription::new("log", "svc.Log")
                .cardinality(Cardinality::OptionalMultiple)
                .dynamic()
                .bind("addLog")
                .unbind("removeLog")
                .updated("log_changed"),
        )
}

#[test]
fn inventory_collects_annotated_types() {
    let implementations = ImplementationRegistry::from_inventory();
    let names = implementations.names();
    assert!(names.contains(&"macro.Audited".to_string()));
    // 缺省名为类型名
    assert!(names.contains(&"Refuses".to_string()));

    let audited = implementations.resolve("macro.Audited").unwrap();
    for cb in ["start", "stop", "reconfigure", "addLog", "removeLog", "log_changed"] {
        assert!(audited.has_callback(cb), "{cb}");
    }
    assert!(!audited.has_callback("note"));
}

#[test]
fn generated_callbacks_drive_the_instance() {
    mmg_scr::app::init_logging();
    let registry = ServiceRegistry::new();
    let store = ConfigurationStore::new();
    let scr = Scr::new(
        ScrConfig::default(),
        registry.clone(),
        ImplementationRegistry::from_inventory(),
        Some(store.clone()),
    );
    store.update("audited", Properties::new().with("level", "info"));
    assert!(scr.load([audited()]).is_empty());

    let published = registry.lookup("svc.Audited", None).pop().unwrap();
    let tool = ConsumerId::new("tool");
    let instance = registry
        .get_service(&tool, &published)
        .unwrap()
        .downcast::<Audited>()
        .unwrap();

    let log = publish(&registry, "svc.Log", "x", 0);
    log.set_properties(Properties::new().with("label", "x").with("level", "debug"));
    store.update("audited", Properties::new().with("level", "trace"));
    log.unregister();
    scr.disable("audited").unwrap();

    assert_eq!(
        *instance.log.lock(),
        strings(&[
            "start:audited",
            "bind:x",
            "updated:x",
            "modified:trace",
            "unbind:x",
            "stop:disabled",
        ])
    );
}

#[test]
fn errors_from_generated_callbacks_surface_as_activation_failures() {
    let scr = Scr::new(
        ScrConfig::default(),
        ServiceRegistry::new(),
        ImplementationRegistry::from_inventory(),
        None,
    );
    assert!(scr
        .load([ComponentDescription::new("refuses", "Refuses").activate("activate")])
        .is_empty());
    assert_eq!(scr.state("refuses"), Some(ComponentState::Satisfied));
    let info = scr.component("refuses").unwrap();
    assert_eq!(
        info.configurations[0].state,
        mmg_scr::configuration::ConfigurationState::Deactive
    );
}
