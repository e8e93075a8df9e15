mod common;

use common::*;
use mmg_scr::{configuration::ConfigurationState, prelude::*};

#[test]
fn immediate_component_follows_enable_and_disable() {
    let h = Harness::new();
    h.load([component("a")]);
    assert_eq!(h.state("a"), ComponentState::Satisfied);
    assert_eq!(h.take(), strings(&["a:activate"]));
    assert_eq!(h.configuration_states("a"), vec![ConfigurationState::Active]);

    h.scr.disable("a").unwrap();
    assert_eq!(h.state("a"), ComponentState::Disabled);
    assert_eq!(h.take(), strings(&["a:deactivate:disabled"]));
    assert!(h.configuration_states("a").is_empty());

    // 重新启用得到新的配置与实例
    h.scr.enable("a").unwrap();
    assert_eq!(h.take(), strings(&["a:activate"]));
    assert_eq!(h.state("a"), ComponentState::Satisfied);
}

#[test]
fn enable_and_disable_are_idempotent() {
    let h = Harness::new();
    h.load([component("a")]);
    h.scr.enable("a").unwrap();
    assert_eq!(h.take(), strings(&["a:activate"]));
    h.scr.disable("a").unwrap();
    h.scr.disable("a").unwrap();
    assert_eq!(h.take(), strings(&["a:deactivate:disabled"]));
}

#[test]
fn disabled_description_is_registered_but_not_enabled() {
    let h = Harness::new();
    h.load([component("a").enabled(false)]);
    assert_eq!(h.state("a"), ComponentState::Disabled);
    assert!(h.take().is_empty());

    h.scr.enable("a").unwrap();
    assert_eq!(h.take(), strings(&["a:activate"]));
}

#[test]
fn remove_component_disposes_and_forgets() {
    let h = Harness::new();
    h.load([component("a")]);
    h.take();
    h.scr.remove_component("a").unwrap();
    assert_eq!(h.take(), strings(&["a:deactivate:disposed"]));
    assert!(h.scr.state("a").is_none());
    assert!(matches!(h.scr.enable("a"), Err(ScrError::UnknownComponent(_))));
}

#[test]
fn shutdown_stops_everything_permanently() {
    let h = Harness::new();
    h.load([component("a"), component("b")]);
    h.take();
    h.scr.shutdown();
    let entries = h.take();
    assert_eq!(entries.len(), 2);
    assert!(entries.contains(&"a:deactivate:stopped".to_string()));
    assert!(entries.contains(&"b:deactivate:stopped".to_string()));
    assert_eq!(h.state("a"), ComponentState::Disposed);
    assert_eq!(h.state("b"), ComponentState::Disposed);
    assert!(matches!(h.scr.enable("a"), Err(ScrError::ComponentDisposed(_))));
}

#[test]
fn failed_activation_is_logged_and_left_undispatched() {
    let h = Harness::new();
    h.load([component("a").property("fail.activate", true)]);
    assert_eq!(h.take(), strings(&["a:activate-failed"]));
    // 失败不影响满足状态，配置停留在 Deactive
    assert_eq!(h.state("a"), ComponentState::Satisfied);
    assert_eq!(h.configuration_states("a"), vec![ConfigurationState::Deactive]);
}

#[test]
fn invalid_descriptions_are_skipped_without_affecting_others() {
    let h = Harness::new();
    let errors = h.scr.load([
        ComponentDescription::new("", RECORDER),
        component("delayed-without-service").immediate(false),
        component("ok"),
    ]);
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, ScrError::InvalidDescription { .. })));
    assert_eq!(h.take(), strings(&["ok:activate"]));
    assert!(h.scr.state("delayed-without-service").is_none());
}

#[test]
fn duplicate_names_are_rejected() {
    let h = Harness::new();
    h.scr.add_component(component("a")).unwrap();
    assert!(matches!(
        h.scr.add_component(component("a")),
        Err(ScrError::DuplicateComponent(n)) if n == "a"
    ));
}

#[test]
fn declared_callbacks_must_exist_on_a_known_implementation() {
    let h = Harness::new();
    let err = h
        .scr
        .add_component(component("a").modified("not_there"))
        .unwrap_err();
    match err {
        ScrError::MissingCallback { component, callback } => {
            assert_eq!(component, "a");
            assert_eq!(callback, "not_there");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_implementation_fails_at_activation_only() {
    let h = Harness::new();
    h.load([ComponentDescription::new("ghost", "no.such.Implementation")]);
    assert_eq!(h.state("ghost"), ComponentState::Satisfied);
    assert_eq!(h.configuration_states("ghost"), vec![ConfigurationState::Deactive]);
}

#[test]
fn component_info_serializes_for_tooling() {
    let h = Harness::new();
    h.load([component("a").property("greeting", "hi")]);
    let info = h.scr.component("a").unwrap();
    assert_eq!(info.unresolved, 0);
    assert!(info.id.is_some());
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["state"], "Satisfied");
    assert_eq!(json["configurations"][0]["key"], "<none>");
    assert_eq!(json["configurations"][0]["state"], "Active");
    assert_eq!(
        json["configurations"][0]["properties"]["greeting"]["value"],
        "hi"
    );
}

#[test]
fn component_ids_are_fresh_per_enable_cycle() {
    let h = Harness::new();
    h.load([component("a")]);
    let first = h.scr.component("a").unwrap().id.unwrap();
    h.scr.disable("a").unwrap();
    assert!(h.scr.component("a").unwrap().id.is_none());
    h.scr.enable("a").unwrap();
    let second = h.scr.component("a").unwrap().id.unwrap();
    assert_ne!(first, second);
}
