mod common;

use common::*;
use mmg_scr::{prelude::*, properties::SERVICE_RANKING};

fn log_ref() -> ReferenceDescription {
    ReferenceDescription::new("log", "svc.Log")
}

#[test]
fn dynamic_single_binds_replacement_before_unbinding() {
    let h = Harness::new();
    let _low = publish(&h.registry, "svc.Log", "low", 1);
    h.load([consumer("c", log_ref().dynamic())]);
    assert_eq!(h.take(), strings(&["c:bind:log:low", "c:activate"]));

    let high = publish(&h.registry, "svc.Log", "high", 10);
    assert_eq!(h.take(), strings(&["c:bind:log:high", "c:unbind:log:low"]));

    high.unregister();
    assert_eq!(h.take(), strings(&["c:bind:log:low", "c:unbind:log:high"]));
    assert_eq!(h.state("c"), ComponentState::Satisfied);
}

#[test]
fn static_single_restarts_on_better_target() {
    let h = Harness::new();
    let _low = publish(&h.registry, "svc.Log", "low", 1);
    h.load([consumer("c", log_ref())]);
    h.take();

    let _high = publish(&h.registry, "svc.Log", "high", 10);
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:reference-changed",
            "c:unbind:log:low",
            "c:bind:log:high",
            "c:activate",
        ])
    );
    assert_eq!(h.configuration_keys("c").len(), 1);
}

#[test]
fn static_single_ignores_lower_ranked_arrivals() {
    let h = Harness::new();
    let _high = publish(&h.registry, "svc.Log", "high", 10);
    h.load([consumer("c", log_ref())]);
    h.take();
    let _low = publish(&h.registry, "svc.Log", "low", 1);
    assert!(h.take().is_empty());
}

#[test]
fn losing_the_last_mandatory_target_makes_the_component_unsatisfied() {
    let h = Harness::new();
    let only = publish(&h.registry, "svc.Log", "only", 0);
    h.load([consumer("c", log_ref())]);
    h.take();

    only.unregister();
    assert_eq!(
        h.take(),
        strings(&["c:deactivate:reference-changed", "c:unbind:log:only"])
    );
    assert_eq!(h.state("c"), ComponentState::Enabled);
    assert!(h.configuration_keys("c").is_empty());

    // 新目标出现后自动恢复
    let _again = publish(&h.registry, "svc.Log", "again", 0);
    assert_eq!(h.take(), strings(&["c:bind:log:again", "c:activate"]));
    assert_eq!(h.state("c"), ComponentState::Satisfied);
}

#[test]
fn static_multiple_restarts_on_any_arrival_or_bound_departure() {
    let h = Harness::new();
    let a = publish(&h.registry, "svc.Log", "a", 0);
    h.load([consumer(
        "c",
        log_ref().cardinality(Cardinality::OptionalMultiple),
    )]);
    h.take();

    let _b = publish(&h.registry, "svc.Log", "b", 0);
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:reference-changed",
            "c:unbind:log:a",
            "c:bind:log:a",
            "c:bind:log:b",
            "c:activate",
        ])
    );

    a.unregister();
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:reference-changed",
            "c:unbind:log:b",
            "c:unbind:log:a",
            "c:bind:log:b",
            "c:activate",
        ])
    );
}

#[test]
fn dynamic_multiple_tracks_targets_in_place() {
    let h = Harness::new();
    h.load([consumer(
        "c",
        log_ref()
            .cardinality(Cardinality::OptionalMultiple)
            .dynamic(),
    )]);
    assert_eq!(h.take(), strings(&["c:activate"]));

    let a = publish(&h.registry, "svc.Log", "a", 0);
    let b = publish(&h.registry, "svc.Log", "b", 0);
    assert_eq!(h.take(), strings(&["c:bind:log:a", "c:bind:log:b"]));

    a.unregister();
    b.unregister();
    assert_eq!(h.take(), strings(&["c:unbind:log:a", "c:unbind:log:b"]));
    assert_eq!(h.state("c"), ComponentState::Satisfied);
}

#[test]
fn dynamic_mandatory_multiple_disposes_when_empty() {
    let h = Harness::new();
    let a = publish(&h.registry, "svc.Log", "a", 0);
    h.load([consumer(
        "c",
        log_ref()
            .cardinality(Cardinality::MandatoryMultiple)
            .dynamic(),
    )]);
    h.take();
    a.unregister();
    assert_eq!(
        h.take(),
        strings(&["c:unbind:log:a", "c:deactivate:reference-changed"])
    );
    assert_eq!(h.state("c"), ComponentState::Enabled);
}

#[test]
fn optional_dynamic_single_comes_and_goes() {
    let h = Harness::new();
    h.load([consumer(
        "c",
        log_ref()
            .cardinality(Cardinality::OptionalSingle)
            .dynamic(),
    )]);
    assert_eq!(h.take(), strings(&["c:activate"]));

    let a = publish(&h.registry, "svc.Log", "a", 0);
    assert_eq!(h.take(), strings(&["c:bind:log:a"]));
    a.unregister();
    assert_eq!(h.take(), strings(&["c:unbind:log:a"]));
    assert_eq!(h.state("c"), ComponentState::Satisfied);
}

#[test]
fn property_change_of_bound_target_calls_updated() {
    let h = Harness::new();
    let a = publish(&h.registry, "svc.Log", "a", 0);
    h.load([consumer("c", log_ref())]);
    h.take();

    a.set_properties(
        Properties::new()
            .with("label", "a")
            .with(SERVICE_RANKING, 0)
            .with("level", "debug"),
    );
    assert_eq!(h.take(), strings(&["c:updated:log:a"]));
}

#[test]
fn property_change_that_breaks_the_filter_removes_the_target() {
    let h = Harness::new();
    let a = publish(&h.registry, "svc.Log", "a", 0);
    h.load([consumer("c", log_ref().target("(label=a)"))]);
    h.take();

    a.set_properties(Properties::new().with("label", "renamed"));
    assert_eq!(
        h.take(),
        strings(&["c:deactivate:reference-changed", "c:unbind:log:a"])
    );
    assert_eq!(h.state("c"), ComponentState::Enabled);
}

#[test]
fn provider_component_churn_propagates_to_consumers() {
    let h = Harness::new();
    h.load([
        provider("p", "svc.Log"),
        consumer("c", log_ref().dynamic()),
    ]);
    h.take();

    h.scr.disable("p").unwrap();
    assert_eq!(
        h.take(),
        strings(&[
            "c:deactivate:reference-changed",
            "c:unbind:log:p",
            "p:deactivate:disabled",
        ])
    );
    assert_eq!(h.state("c"), ComponentState::Enabled);

    h.scr.enable("p").unwrap();
    assert_eq!(
        h.take(),
        strings(&["p:activate", "c:bind:log:p", "c:activate"])
    );
}

#[test]
fn consumers_unbind_before_the_provider_deactivates() {
    let h = Harness::new();
    h.load([
        provider("p", "svc.Log"),
        consumer(
            "c",
            log_ref().cardinality(Cardinality::OptionalMultiple).dynamic(),
        ),
    ]);
    h.take();

    h.scr.disable("p").unwrap();
    assert_eq!(h.take(), strings(&["c:unbind:log:p", "p:deactivate:disabled"]));
    assert_eq!(h.state("c"), ComponentState::Satisfied);

    h.scr.enable("p").unwrap();
    assert_eq!(h.take(), strings(&["p:activate", "c:bind:log:p"]));

    h.scr.remove_component("p").unwrap();
    let entries = h.take();
    let unbound = entries.iter().position(|e| e == "c:unbind:log:p");
    let gone = entries.iter().position(|e| e == "p:deactivate:disposed");
    assert!(unbound.is_some() && unbound < gone, "{entries:?}");
}
