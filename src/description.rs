//! 组件与引用的静态描述，即描述符解析器的产物。
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    error::{Result, ScrError},
    filter::FilterTemplate,
    properties::{Properties, PropertyValue},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationPolicy {
    Ignore,
    #[default]
    Optional,
    Require,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "0..1")]
    OptionalSingle,
    #[serde(rename = "0..n")]
    OptionalMultiple,
    #[default]
    #[serde(rename = "1..1")]
    MandatorySingle,
    #[serde(rename = "1..n")]
    MandatoryMultiple,
}

impl Cardinality {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "0..1" => Some(Cardinality::OptionalSingle),
            "0..n" => Some(Cardinality::OptionalMultiple),
            "1..1" => Some(Cardinality::MandatorySingle),
            "1..n" => Some(Cardinality::MandatoryMultiple),
            _ => None,
        }
    }

    pub fn is_optional(self) -> bool {
        matches!(self, Cardinality::OptionalSingle | Cardinality::OptionalMultiple)
    }

    pub fn is_multiple(self) -> bool {
        matches!(self, Cardinality::OptionalMultiple | Cardinality::MandatoryMultiple)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    #[default]
    Static,
    Dynamic,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    pub name: String,
    pub interface: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub policy: ReferencePolicy,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub unbind: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl ReferenceDescription {
    pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            cardinality: Cardinality::default(),
            policy: ReferencePolicy::default(),
            target: None,
            bind: None,
            unbind: None,
            updated: None,
        }
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dynamic(self) -> Self {
        self.policy(ReferencePolicy::Dynamic)
    }

    pub fn target(mut self, filter: impl Into<String>) -> Self {
        self.target = Some(filter.into());
        self
    }

    pub fn bind(mut self, callback: impl Into<String>) -> Self {
        self.bind = Some(callback.into());
        self
    }

    pub fn unbind(mut self, callback: impl Into<String>) -> Self {
        self.unbind = Some(callback.into());
        self
    }

    pub fn updated(mut self, callback: impl Into<String>) -> Self {
        self.updated = Some(callback.into());
        self
    }

    pub fn is_optional(&self) -> bool {
        self.cardinality.is_optional()
    }

    pub fn is_multiple(&self) -> bool {
        self.cardinality.is_multiple()
    }

    pub fn is_dynamic(&self) -> bool {
        self.policy == ReferencePolicy::Dynamic
    }

    /// 配置条目中覆盖目标过滤器的属性名
    pub fn target_property(&self) -> String {
        format!("{}.target", self.name)
    }

    pub fn target_template(&self) -> Option<FilterTemplate> {
        self.target.as_ref().map(FilterTemplate::new)
    }

    fn callbacks(&self) -> impl Iterator<Item = &String> {
        self.bind.iter().chain(self.unbind.iter()).chain(self.updated.iter())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub service_factory: bool,
    #[serde(default)]
    pub configuration_policy: ConfigurationPolicy,
    #[serde(default)]
    pub configuration_pid: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// None：不发布服务时为 immediate，否则 delayed
    #[serde(default)]
    pub immediate: Option<bool>,
    #[serde(default)]
    pub activate: Option<String>,
    #[serde(default)]
    pub deactivate: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub references: Vec<ReferenceDescription>,
    #[serde(default)]
    pub factory: Option<String>,
}

impl ComponentDescription {
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            services: Vec::new(),
            service_factory: false,
            configuration_policy: ConfigurationPolicy::default(),
            configuration_pid: None,
            enabled: true,
            immediate: None,
            activate: None,
            deactivate: None,
            modified: None,
            properties: Properties::new(),
            references: Vec::new(),
            factory: None,
        }
    }

    pub fn service(mut self, interface: impl Into<String>) -> Self {
        self.services.push(interface.into());
        self
    }

    pub fn service_factory(mut self, enabled: bool) -> Self {
        self.service_factory = enabled;
        self
    }

    pub fn configuration_policy(mut self, policy: ConfigurationPolicy) -> Self {
        self.configuration_policy = policy;
        self
    }

    pub fn configuration_pid(mut self, pid: impl Into<String>) -> Self {
        self.configuration_pid = Some(pid.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = Some(immediate);
        self
    }

    pub fn activate(mut self, callback: impl Into<String>) -> Self {
        self.activate = Some(callback.into());
        self
    }

    pub fn deactivate(mut self, callback: impl Into<String>) -> Self {
        self.deactivate = Some(callback.into());
        self
    }

    pub fn modified(mut self, callback: impl Into<String>) -> Self {
        self.modified = Some(callback.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn reference(mut self, reference: ReferenceDescription) -> Self {
        self.references.push(reference);
        self
    }

    pub fn factory(mut self, factory: impl Into<String>) -> Self {
        self.factory = Some(factory.into());
        self
    }

    pub fn is_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub fn provides_service(&self) -> bool {
        !self.services.is_empty()
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate.unwrap_or(!self.provides_service())
    }

    pub fn config_pid(&self) -> &str {
        self.configuration_pid.as_deref().unwrap_or(&self.name)
    }

    /// 所有声明过的回调名（组件级 + 引用级）
    pub fn declared_callbacks(&self) -> Vec<&str> {
        self.activate
            .iter()
            .chain(self.deactivate.iter())
            .chain(self.modified.iter())
            .chain(self.references.iter().flat_map(ReferenceDescription::callbacks))
            .map(String::as_str)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(ScrError::invalid(name, "component name is empty"));
        }
        if self.implementation.trim().is_empty() {
            return Err(ScrError::invalid(name, "implementation is empty"));
        }
        if self.immediate == Some(false) && !self.provides_service() {
            return Err(ScrError::invalid(name, "a delayed component must publish a service"));
        }
        if self.service_factory {
            if !self.provides_service() {
                return Err(ScrError::invalid(name, "service factory without services"));
            }
            if self.immediate == Some(true) {
                return Err(ScrError::invalid(name, "a service factory cannot be immediate"));
            }
            if self.is_factory() {
                return Err(ScrError::invalid(name, "a factory component cannot be a service factory"));
            }
        }
        if self.services.iter().any(|s| s.trim().is_empty()) {
            return Err(ScrError::invalid(name, "empty service interface"));
        }
        let mut seen = HashSet::new();
        for r in &self.references {
            if r.name.trim().is_empty() {
                return Err(ScrError::invalid(name, "reference name is empty"));
            }
            if r.interface.trim().is_empty() {
                return Err(ScrError::invalid(name, format!("reference {} has no interface", r.name)));
            }
            if !seen.insert(r.name.as_str()) {
                return Err(ScrError::invalid(name, format!("duplicate reference {}", r.name)));
            }
            if let Some(template) = r.target_template() {
                if !template.is_parameterized() {
                    template.render(&Properties::new()).map_err(|e| {
                        ScrError::invalid(name, format!("reference {}: {e}", r.name))
                    })?;
                }
            }
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let desc: ComponentDescription =
            serde_json::from_str(text).map_err(|e| ScrError::invalid("<json>", e.to_string()))?;
        desc.validate()?;
        Ok(desc)
    }

    /// 单个条目解析失败不影响其余条目
    pub fn from_json_list(text: &str) -> Result<Vec<Result<Self>>> {
        let raw: Vec<serde_json::Value> =
            serde_json::from_str(text).map_err(|e| ScrError::invalid("<json>", e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|v| {
                let label = v
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("<json>")
                    .to_string();
                let desc: ComponentDescription =
                    serde_json::from_value(v).map_err(|e| ScrError::invalid(&label, e.to_string()))?;
                desc.validate()?;
                Ok(desc)
            })
            .collect())
    }
}
