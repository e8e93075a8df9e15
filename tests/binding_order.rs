mod common;

use common::*;
use mmg_scr::{
    configuration::ConfigurationState,
    prelude::*,
    registry::{ConsumerId, ServiceFactory, ServiceObject, ServiceReference},
};
use std::sync::Arc;

fn two_refs(name: &str) -> ComponentDescription {
    component(name)
        .reference(recorded(ReferenceDescription::new("first", "svc.A")))
        .reference(recorded(ReferenceDescription::new("second", "svc.B")))
}

#[test]
fn references_bind_in_declaration_order_before_activate() {
    let h = Harness::new();
    h.load([provider("pa", "svc.A"), provider("pb", "svc.B"), two_refs("c")]);
    assert_eq!(
        h.take(),
        strings(&[
            "pa:activate",
            "pb:activate",
            "c:bind:first:pa",
            "c:bind:second:pb",
            "c:activate",
        ])
    );
}

#[test]
fn unbinding_runs_in_reverse_after_deactivate() {
    let h = Harness::new();
    h.load([provider("pa", "svc.A"), provider("pb", "svc.B"), two_refs("c")]);
    h.take();
    h.scr.disable("c").unwrap();
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:disabled",
            "c:unbind:second:pb",
            "c:unbind:first:pa",
        ])
    );
}

#[test]
fn consumer_waits_until_every_mandatory_reference_is_available() {
    let h = Harness::new();
    h.load([two_refs("c")]);
    assert_eq!(h.state("c"), ComponentState::Enabled);
    assert_eq!(h.scr.component("c").unwrap().unresolved, 2);

    h.load([provider("pa", "svc.A")]);
    assert_eq!(h.state("c"), ComponentState::Enabled);
    assert_eq!(h.scr.component("c").unwrap().unresolved, 1);

    h.load([provider("pb", "svc.B")]);
    assert_eq!(h.state("c"), ComponentState::Satisfied);
    assert_eq!(
        h.take(),
        strings(&[
            "pa:activate",
            "pb:activate",
            "c:bind:first:pa",
            "c:bind:second:pb",
            "c:activate",
        ])
    );
}

#[test]
fn multiple_reference_binds_every_target_by_ranking() {
    let h = Harness::new();
    let _low = publish(&h.registry, "svc.Log", "low", 1);
    let _high = publish(&h.registry, "svc.Log", "high", 10);
    let _mid = publish(&h.registry, "svc.Log", "mid", 5);
    h.load([consumer(
        "c",
        ReferenceDescription::new("logs", "svc.Log").cardinality(Cardinality::MandatoryMultiple),
    )]);
    assert_eq!(
        h.take(),
        strings(&[
            "c:bind:logs:high",
            "c:bind:logs:mid",
            "c:bind:logs:low",
            "c:activate",
        ])
    );
}

#[test]
fn single_reference_binds_the_highest_ranked_target() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Log", "a", 0);
    let _b = publish(&h.registry, "svc.Log", "b", 3);
    let _c = publish(&h.registry, "svc.Log", "c", 0);
    h.load([consumer("user", ReferenceDescription::new("log", "svc.Log"))]);
    assert_eq!(h.take(), strings(&["user:bind:log:b", "user:activate"]));
}

#[test]
fn equal_ranking_prefers_the_older_service() {
    let h = Harness::new();
    let _first = publish(&h.registry, "svc.Log", "first", 0);
    let _second = publish(&h.registry, "svc.Log", "second", 0);
    h.load([consumer("user", ReferenceDescription::new("log", "svc.Log"))]);
    assert_eq!(h.take(), strings(&["user:bind:log:first", "user:activate"]));
}

struct Unavailable;

impl ServiceFactory for Unavailable {
    fn get_service(&self, _consumer: &ConsumerId, _reference: &ServiceReference) -> Option<ServiceObject> {
        None
    }
    fn unget_service(&self, _consumer: &ConsumerId, _reference: &ServiceReference, _service: ServiceObject) {}
}

#[test]
fn mandatory_bind_failure_unwinds_earlier_bindings() {
    let h = Harness::new();
    let _broken = h.registry.register(
        vec!["svc.B".to_string()],
        ServiceProvider::Factory {
            factory: Arc::new(Unavailable),
            scope: mmg_scr::registry::ServiceScope::Singleton,
        },
        Properties::new().with("label", "broken"),
    );
    h.load([provider("pa", "svc.A"), two_refs("c")]);
    assert_eq!(
        h.take(),
        strings(&["pa:activate", "c:bind:first:pa", "c:unbind:first:pa"])
    );
    assert_eq!(h.state("c"), ComponentState::Satisfied);
    assert_eq!(h.configuration_states("c"), vec![ConfigurationState::Deactive]);
}

#[test]
fn optional_reference_without_target_does_not_block_activation() {
    let h = Harness::new();
    h.load([consumer(
        "c",
        ReferenceDescription::new("log", "svc.Log").cardinality(Cardinality::OptionalSingle),
    )]);
    assert_eq!(h.take(), strings(&["c:activate"]));
    assert_eq!(h.state("c"), ComponentState::Satisfied);
}

#[test]
fn target_filter_limits_candidates() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Log", "a", 10);
    let _b = publish(&h.registry, "svc.Log", "b", 0);
    h.load([consumer(
        "c",
        ReferenceDescription::new("log", "svc.Log").target("(label=b)"),
    )]);
    assert_eq!(h.take(), strings(&["c:bind:log:b", "c:activate"]));
}
