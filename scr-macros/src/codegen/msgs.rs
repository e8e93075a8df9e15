// 宏展开阶段的诊断信息

pub(super) const ERR_TARGET: &str = "#[implementation] can only be applied to an inherent impl block";
pub(super) const ERR_TRAIT_IMPL: &str =
    "#[implementation] must be placed on an inherent impl, not a trait impl";
pub(super) const ERR_GENERICS: &str = "#[implementation] does not support generic impl blocks";
pub(super) const ERR_SELF_TY: &str = "#[implementation] requires a named self type such as `impl Greeter`";
pub(super) const ERR_UNKNOWN_ARG: &str = "unknown #[implementation] argument; expected `name = \"...\"`";
pub(super) const ERR_EMPTY_NAME: &str = "implementation name must not be empty";

pub(super) const ERR_MULTI_ATTR: &str = "a method can only carry one callback attribute";
pub(super) const ERR_CALLBACK_ARG: &str = "callback attributes only accept `name = \"...\"`";
pub(super) const ERR_DUP_CALLBACK: &str = "callback name already registered by another method";
pub(super) const ERR_RECEIVER: &str = "callback methods must take `&self`; use interior mutability for state";
pub(super) const ERR_ASYNC: &str = "callback methods are invoked synchronously and cannot be async";
pub(super) const ERR_METHOD_GENERICS: &str = "callback methods cannot be generic";

pub(super) const ERR_LIFECYCLE_SIG: &str =
    "#[activate]/#[modified] accept no parameters or a single &ComponentContext";
pub(super) const ERR_DEACTIVATE_SIG: &str =
    "#[deactivate] accepts at most one &ComponentContext and one DeactivationReason";
pub(super) const ERR_BINDER_SIG: &str = "#[bind]/#[unbind]/#[updated] require exactly one &BoundService parameter";
pub(super) const ERR_RETURN: &str = "callback methods must return () or Result<_, E> where E: Into<anyhow::Error>";
