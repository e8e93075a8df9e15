mod common;

use common::*;
use mmg_scr::{
    component::{ComponentFactoryHandle, ConfigKey, COMPONENT_FACTORY_INTERFACE},
    configuration::ConfigurationState,
    prelude::*,
    registry::ConsumerId,
};

fn factory(name: &str) -> ComponentDescription {
    component(name).factory(format!("{name}.factory"))
}

#[test]
fn satisfied_factory_publishes_capability_without_instances() {
    let h = Harness::new();
    h.load([factory("maker")]);
    assert_eq!(h.state("maker"), ComponentState::Satisfied);
    assert!(h.take().is_empty());
    assert!(h.configuration_keys("maker").is_empty());

    let published = h.registry.lookup(COMPONENT_FACTORY_INTERFACE, None);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].properties().get_str("component.factory"), Some("maker.factory"));
    assert_eq!(published[0].properties().get_str("component.name"), Some("maker"));
}

#[test]
fn new_instance_activates_synchronously() {
    let h = Harness::new();
    h.load([factory("maker").property("color", "red")]);
    let handle = h
        .scr
        .new_instance("maker", Properties::new().with("n", 7).with("color", "blue"))
        .unwrap();
    assert_eq!(h.take(), strings(&["maker:activate"]));
    assert_eq!(handle.key(), &ConfigKey::Instance(1));
    assert_eq!(handle.state(), ConfigurationState::Active);
    assert!(handle.get::<Recorder>().is_some());
    let props = handle.properties();
    assert_eq!(props.get("n"), Some(&PropertyValue::Int(7)));
    // 实例覆盖项优先于描述属性
    assert_eq!(props.get_str("color"), Some("blue"));

    let second = h.scr.new_instance("maker", Properties::new()).unwrap();
    assert_eq!(second.key(), &ConfigKey::Instance(2));
    assert_eq!(h.configuration_keys("maker"), strings(&["#1", "#2"]));
}

#[test]
fn disposed_instance_is_never_recreated() {
    let h = Harness::new();
    h.load([factory("maker")]);
    let handle = h.scr.new_instance("maker", Properties::new()).unwrap();
    h.take();
    handle.dispose().unwrap();
    assert!(handle.is_disposed());
    assert_eq!(h.take(), strings(&["maker:deactivate:disposed"]));
    assert!(h.configuration_keys("maker").is_empty());
    // 重复释放无副作用
    handle.dispose().unwrap();
    assert!(h.take().is_empty());
}

#[test]
fn factory_service_object_creates_instances() {
    let h = Harness::new();
    h.load([factory("maker")]);
    let reference = h
        .registry
        .lookup(COMPONENT_FACTORY_INTERFACE, None)
        .pop()
        .unwrap();
    let object = h
        .registry
        .get_service(&ConsumerId::new("tool"), &reference)
        .unwrap();
    let factory = object.downcast::<ComponentFactoryHandle>().unwrap();
    assert_eq!(factory.component_name(), "maker");
    let instance = factory.new_instance(Properties::new()).unwrap();
    assert_eq!(instance.component_name(), "maker");
    assert_eq!(h.take(), strings(&["maker:activate"]));
}

#[test]
fn instantiation_errors() {
    let h = Harness::new();
    h.load([component("plain")]);
    assert!(matches!(
        h.scr.new_instance("plain", Properties::new()),
        Err(ScrError::NotAFactory(_))
    ));
    assert!(matches!(
        h.scr.new_instance("nobody", Properties::new()),
        Err(ScrError::UnknownComponent(_))
    ));
}

#[test]
fn failed_instance_activation_is_reported_to_the_caller() {
    let h = Harness::new();
    h.load([factory("maker")]);
    let err = h
        .scr
        .new_instance("maker", Properties::new().with("fail.activate", true))
        .unwrap_err();
    assert!(matches!(err, ScrError::ActivationFailed { .. }));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(h.take(), strings(&["maker:activate-failed"]));
    assert!(h.configuration_keys("maker").is_empty());
}

#[test]
fn unsatisfied_factory_refuses_instances_and_withdraws_capability() {
    let h = Harness::new();
    h.load([factory("maker").reference(recorded(ReferenceDescription::new("dep", "svc.Dep")))]);
    assert!(matches!(
        h.scr.new_instance("maker", Properties::new()),
        Err(ScrError::FactoryNotSatisfied(_))
    ));
    assert!(h.registry.lookup(COMPONENT_FACTORY_INTERFACE, None).is_empty());

    let dep = publish(&h.registry, "svc.Dep", "d", 0);
    assert_eq!(h.registry.lookup(COMPONENT_FACTORY_INTERFACE, None).len(), 1);
    let handle = h.scr.new_instance("maker", Properties::new()).unwrap();
    assert_eq!(h.take(), strings(&["maker:bind:dep:d", "maker:activate"]));

    // 引用消失：撤下工厂能力；实例自身失去引用而被释放，不会重建
    dep.unregister();
    assert!(h.registry.lookup(COMPONENT_FACTORY_INTERFACE, None).is_empty());
    assert_eq!(
        h.take(),
        strings(&["maker:deactivate:reference-changed", "maker:unbind:dep:d"])
    );
    assert!(handle.is_disposed());

    let _dep = publish(&h.registry, "svc.Dep", "d2", 0);
    assert!(h.take().is_empty());
    assert!(h.configuration_keys("maker").is_empty());
}

#[test]
fn instances_survive_unrelated_factory_churn() {
    let h = Harness::new();
    let _a = publish(&h.registry, "svc.Dep", "a", 0);
    let b = publish(&h.registry, "svc.Dep", "b", 0);
    h.load([factory("maker").reference(recorded(
        ReferenceDescription::new("dep", "svc.Dep").cardinality(Cardinality::MandatoryMultiple).dynamic(),
    ))]);
    let handle = h.scr.new_instance("maker", Properties::new()).unwrap();
    h.take();
    b.unregister();
    assert_eq!(h.take(), strings(&["maker:unbind:dep:b"]));
    assert!(!handle.is_disposed());
    assert_eq!(h.registry.lookup(COMPONENT_FACTORY_INTERFACE, None).len(), 1);
}

#[test]
fn disabling_the_factory_disposes_its_instances() {
    let h = Harness::new();
    h.load([factory("maker")]);
    let handle = h.scr.new_instance("maker", Properties::new()).unwrap();
    h.take();
    h.scr.disable("maker").unwrap();
    assert_eq!(h.take(), strings(&["maker:deactivate:disabled"]));
    assert!(handle.is_disposed());
    assert!(h.registry.lookup(COMPONENT_FACTORY_INTERFACE, None).is_empty());
}
