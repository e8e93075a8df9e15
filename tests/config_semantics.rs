mod common;

use common::*;
use mmg_scr::{configuration::ConfigurationState, prelude::*};

fn props(key: &str, value: i32) -> Properties {
    Properties::new().with(key, value)
}

#[test]
fn first_configuration_replaces_the_unconfigured_instance() {
    let h = Harness::new();
    h.load([component("cfg")]);
    assert_eq!(h.take(), strings(&["cfg:activate"]));
    assert_eq!(h.configuration_keys("cfg"), strings(&["<none>"]));

    h.store.update("cfg", props("x", 1));
    assert_eq!(
        h.take(),
        strings(&["cfg:deactivate:configuration-modified", "cfg:activate"])
    );
    assert_eq!(h.configuration_keys("cfg"), strings(&["cfg"]));
    let info = h.scr.component("cfg").unwrap();
    let properties = &info.configurations[0].properties;
    assert_eq!(properties.get("x"), Some(&PropertyValue::Int(1)));
    assert_eq!(properties.get_str("service.pid"), Some("cfg"));
    assert_eq!(properties.get_str("component.name"), Some("cfg"));
}

#[test]
fn modified_callback_updates_in_place() {
    let h = Harness::new();
    h.store.update("cfg", props("x", 1));
    h.load([component("cfg").modified("modified")]);
    assert_eq!(h.take(), strings(&["cfg:activate"]));

    h.store.update("cfg", props("x", 2));
    assert_eq!(h.take(), strings(&["cfg:modified"]));
    let info = h.scr.component("cfg").unwrap();
    assert_eq!(info.configurations[0].properties.get("x"), Some(&PropertyValue::Int(2)));
    assert_eq!(info.configurations[0].state, ConfigurationState::Active);
}

#[test]
fn without_modified_callback_the_configuration_restarts() {
    let h = Harness::new();
    h.store.update("cfg", props("x", 1));
    h.load([component("cfg")]);
    h.take();

    h.store.update("cfg", props("x", 2));
    assert_eq!(
        h.take(),
        strings(&["cfg:deactivate:configuration-modified", "cfg:activate"])
    );
}

#[test]
fn identical_update_is_ignored() {
    let h = Harness::new();
    h.store.update("cfg", props("x", 1));
    h.load([component("cfg").modified("modified")]);
    h.take();
    h.store.update("cfg", props("x", 1));
    assert!(h.take().is_empty());
}

#[test]
fn deleting_the_item_falls_back_to_no_configuration() {
    let h = Harness::new();
    h.store.update("cfg", props("x", 1));
    h.load([component("cfg")]);
    h.take();

    assert!(h.store.delete("cfg"));
    assert_eq!(
        h.take(),
        strings(&["cfg:deactivate:configuration-deleted", "cfg:activate"])
    );
    assert_eq!(h.configuration_keys("cfg"), strings(&["<none>"]));
}

#[test]
fn required_configuration_gates_satisfaction() {
    let h = Harness::new();
    h.load([component("req").configuration_policy(ConfigurationPolicy::Require)]);
    assert_eq!(h.state("req"), ComponentState::Enabled);
    assert!(h.take().is_empty());

    h.store.update("req", props("x", 1));
    assert_eq!(h.state("req"), ComponentState::Satisfied);
    assert_eq!(h.take(), strings(&["req:activate"]));

    h.store.delete("req");
    assert_eq!(h.take(), strings(&["req:deactivate:configuration-deleted"]));
    assert_eq!(h.state("req"), ComponentState::Enabled);
}

#[test]
fn each_factory_configuration_gets_its_own_instance() {
    let h = Harness::new();
    h.load([component("multi").configuration_policy(ConfigurationPolicy::Require)]);
    let first = h.store.create_factory_configuration("multi", props("n", 1));
    let second = h.store.create_factory_configuration("multi", props("n", 2));
    assert_eq!(h.take(), strings(&["multi:activate", "multi:activate"]));

    let keys = h.configuration_keys("multi");
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&first) && keys.contains(&second));
    assert!(first.starts_with("multi."));
    let info = h.scr.component("multi").unwrap();
    assert!(info
        .configurations
        .iter()
        .all(|c| c.properties.get_str("service.factoryPid") == Some("multi")));

    h.store.delete(&first);
    assert_eq!(h.take(), strings(&["multi:deactivate:configuration-deleted"]));
    assert_eq!(h.configuration_keys("multi"), vec![second]);
    assert_eq!(h.state("multi"), ComponentState::Satisfied);
}

#[test]
fn ignore_policy_never_sees_configuration() {
    let h = Harness::new();
    h.load([component("ign").configuration_policy(ConfigurationPolicy::Ignore)]);
    h.take();
    h.store.update("ign", props("x", 1));
    assert!(h.take().is_empty());
    assert_eq!(h.configuration_keys("ign"), strings(&["<none>"]));
}

#[test]
fn configuration_pid_can_differ_from_the_name() {
    let h = Harness::new();
    h.load([component("alias")
        .configuration_pid("shared.settings")
        .configuration_policy(ConfigurationPolicy::Require)]);
    h.store.update("alias", props("x", 1));
    assert!(h.take().is_empty());
    h.store.update("shared.settings", props("x", 1));
    assert_eq!(h.take(), strings(&["alias:activate"]));
    assert_eq!(h.configuration_keys("alias"), strings(&["shared.settings"]));
}

#[test]
fn target_override_in_configuration_rebinds_that_identity() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Log", "a", 0);
    let _b = publish(&h.registry, "svc.Log", "b", 0);
    h.load([consumer("c", ReferenceDescription::new("log", "svc.Log"))]);
    assert_eq!(h.take(), strings(&["c:bind:log:a", "c:activate"]));

    h.store
        .update("c", Properties::new().with("log.target", "(label=b)"));
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:configuration-modified",
            "c:unbind:log:a",
            "c:bind:log:b",
            "c:activate",
        ])
    );
}

#[test]
fn templated_target_renders_from_configuration() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Log", "a", 0);
    let _b = publish(&h.registry, "svc.Log", "b", 0);
    h.load([consumer(
        "c",
        ReferenceDescription::new("log", "svc.Log").target("(label=${wanted})"),
    )
    .property("wanted", "a")]);
    assert_eq!(h.take(), strings(&["c:bind:log:a", "c:activate"]));

    h.store.update("c", Properties::new().with("wanted", "b"));
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:configuration-modified",
            "c:unbind:log:a",
            "c:bind:log:b",
            "c:activate",
        ])
    );
}

#[test]
fn unrenderable_target_matches_nothing_until_configured() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Log", "a", 0);
    h.load([consumer(
        "c",
        ReferenceDescription::new("log", "svc.Log").target("(label=${wanted})"),
    )]);
    assert_eq!(h.state("c"), ComponentState::Enabled);
    assert!(h.take().is_empty());

    h.store.update("c", Properties::new().with("wanted", "a"));
    assert_eq!(h.state("c"), ComponentState::Satisfied);
    assert_eq!(h.take(), strings(&["c:bind:log:a", "c:activate"]));
}

#[test]
fn target_change_with_modified_callback_still_restarts() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Log", "a", 0);
    let _b = publish(&h.registry, "svc.Log", "b", 0);
    h.store.update("c", Properties::new().with("log.target", "(label=a)"));
    h.load([consumer("c", ReferenceDescription::new("log", "svc.Log")).modified("modified")]);
    assert_eq!(h.take(), strings(&["c:bind:log:a", "c:activate"]));

    h.store.update("c", Properties::new().with("log.target", "(label=b)"));
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:configuration-modified",
            "c:unbind:log:a",
            "c:bind:log:b",
            "c:activate",
        ])
    );
}
