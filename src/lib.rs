pub mod app;
pub mod component;
pub mod config;
pub mod config_store;
pub mod configuration;
pub mod context;
pub mod cycle;
pub mod description;
pub mod error;
pub mod filter;
mod gate;
pub mod implementation;
pub mod listener;
pub mod properties;
pub mod reference;
pub mod registry;
pub mod scr;

// 允许在本 crate 内通过 `mmg_scr::...` 自引用（供 proc-macro 展开使用）
extern crate self as mmg_scr;

#[doc(hidden)]
pub use inventory as __inventory;

pub mod prelude {
    pub use crate::app::{App, ConfigCommand};
    pub use crate::component::{ComponentInstanceHandle, ComponentState, ConfigKey};
    pub use crate::config::ScrConfig;
    pub use crate::configuration::DeactivationReason;
    pub use crate::context::{BoundService, ComponentContext};
    pub use crate::description::{
        Cardinality, ComponentDescription, ConfigurationPolicy, ReferenceDescription, ReferencePolicy,
    };
    pub use crate::error::{Result, ScrError};
    pub use crate::implementation::{ImplementationRegistry, ImplementationType};
    pub use crate::properties::{Properties, PropertyValue};
    pub use crate::registry::{ServiceProvider, ServiceRegistry};
    pub use crate::scr::Scr;
}

pub use scr_macros::*;
pub use scr::Scr;
