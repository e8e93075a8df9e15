//! 描述、配置条目与已发布服务共用的强类型属性模型。
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use crate::error::{Result, ScrError};

pub const COMPONENT_NAME: &str = "component.name";
pub const COMPONENT_ID: &str = "component.id";
pub const COMPONENT_FACTORY: &str = "component.factory";
pub const SERVICE_PID: &str = "service.pid";
pub const SERVICE_FACTORY_PID: &str = "service.factoryPid";
pub const SERVICE_ID: &str = "service.id";
pub const SERVICE_RANKING: &str = "service.ranking";
pub const OBJECT_CLASS: &str = "objectClass";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Boolean(bool),
    Byte(i8),
    Char(char),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    String(String),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 整数类取值（service.ranking 等）
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Byte(v) => Some(i64::from(*v)),
            PropertyValue::Short(v) => Some(i64::from(*v)),
            PropertyValue::Int(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(v) => write!(f, "{v}"),
            PropertyValue::Byte(v) => write!(f, "{v}"),
            PropertyValue::Char(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Short(v) => write!(f, "{v}"),
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}
impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}
impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}
impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}
impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}
impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}
impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::Array(v.into_iter().map(PropertyValue::String).collect())
    }
}

/// 描述符解析器接受的标量类型标记
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyType {
    Boolean,
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    String,
}

impl PropertyType {
    /// 未知类型名回落为 String
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "boolean" => PropertyType::Boolean,
            "byte" => PropertyType::Byte,
            "char" | "character" => PropertyType::Char,
            "double" => PropertyType::Double,
            "float" => PropertyType::Float,
            "int" | "integer" => PropertyType::Int,
            "long" => PropertyType::Long,
            "short" => PropertyType::Short,
            _ => PropertyType::String,
        }
    }

    pub fn parse(self, text: &str) -> Result<PropertyValue> {
        let bad = |ty: &str| ScrError::InvalidProperty(format!("{text:?} is not a valid {ty}"));
        let t = text.trim();
        Ok(match self {
            PropertyType::Boolean => PropertyValue::Boolean(t.eq_ignore_ascii_case("true")),
            PropertyType::Byte => PropertyValue::Byte(t.parse().map_err(|_| bad("byte"))?),
            PropertyType::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => PropertyValue::Char(c),
                    _ => return Err(bad("char")),
                }
            }
            PropertyType::Double => PropertyValue::Double(t.parse().map_err(|_| bad("double"))?),
            PropertyType::Float => PropertyValue::Float(t.parse().map_err(|_| bad("float"))?),
            PropertyType::Int => PropertyValue::Int(t.parse().map_err(|_| bad("int"))?),
            PropertyType::Long => PropertyValue::Long(t.parse().map_err(|_| bad("long"))?),
            PropertyType::Short => PropertyValue::Short(t.parse().map_err(|_| bad("short"))?),
            PropertyType::String => PropertyValue::String(text.to_string()),
        })
    }

    pub fn parse_array<'a>(self, items: impl IntoIterator<Item = &'a str>) -> Result<PropertyValue> {
        items
            .into_iter()
            .map(|item| self.parse(item))
            .collect::<Result<Vec<_>>>()
            .map(PropertyValue::Array)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// 过滤器按键匹配时大小写不敏感
    pub fn get_ignore_case(&self, key: &str) -> Option<&PropertyValue> {
        self.0
            .get(key)
            .or_else(|| self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// 后者覆盖
    pub fn merge(&mut self, other: &Properties) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// 服务使用方可见的属性；以 `.` 开头的键为私有
    pub fn public(&self) -> Properties {
        Properties(
            self.0
                .iter()
                .filter(|(k, _)| !k.starts_with('.'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, PropertyValue)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Properties(iter.into_iter().collect())
    }
}
