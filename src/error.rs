//! 运行时统一错误类型：手写枚举 + Display，不引入派生错误栈。
//! 用户回调的错误以 `anyhow::Error` 形式携带，经 `source()` 暴露。
use std::{error::Error as StdError, fmt};

#[derive(Debug)]
pub enum ScrError {
    /// 描述不合法：在创建 Component 之前拒绝，仅跳过该组件
    InvalidDescription { component: String, reason: String },
    DuplicateComponent(String),
    UnknownComponent(String),
    ComponentDisposed(String),
    NotAFactory(String),
    FactoryNotSatisfied(String),
    UnknownImplementation(String),
    MissingCallback { component: String, callback: String },
    ActivationFailed { component: String, source: anyhow::Error },
    ReferenceUnavailable { component: String, reference: String },
    ConfigurationDisposed(String),
    CircularActivation(String),
    /// 组件闸门在超时内未能取得
    LockTimeout(String),
    InvalidFilter { filter: String, reason: String },
    InvalidProperty(String),
    Runtime(String), // 宿主层（tokio 等）失败
}

impl fmt::Display for ScrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrError::InvalidDescription { component, reason } => {
                write!(f, "invalid description for component {component}: {reason}")
            }
            ScrError::DuplicateComponent(n) => write!(f, "component {n} is already registered"),
            ScrError::UnknownComponent(n) => write!(f, "unknown component {n}"),
            ScrError::ComponentDisposed(n) => write!(f, "component {n} is disposed"),
            ScrError::NotAFactory(n) => write!(f, "component {n} is not a factory component"),
            ScrError::FactoryNotSatisfied(n) => write!(f, "factory not satisfied: {n}"),
            ScrError::UnknownImplementation(n) => write!(f, "unknown implementation {n}"),
            ScrError::MissingCallback {
                component,
                callback,
            } => write!(f, "component {component} declares missing callback {callback}"),
            ScrError::ActivationFailed { component, source } => {
                write!(f, "activation of {component} failed: {source}")
            }
            ScrError::ReferenceUnavailable {
                component,
                reference,
            } => write!(
                f,
                "mandatory reference {reference} of {component} could not be bound"
            ),
            ScrError::ConfigurationDisposed(n) => {
                write!(f, "configuration of {n} is already disposed")
            }
            ScrError::CircularActivation(n) => write!(f, "circular activation of {n}"),
            ScrError::LockTimeout(n) => write!(f, "timed out waiting for component {n}"),
            ScrError::InvalidFilter { filter, reason } => {
                write!(f, "invalid filter {filter}: {reason}")
            }
            ScrError::InvalidProperty(msg) => write!(f, "invalid property: {msg}"),
            ScrError::Runtime(msg) => write!(f, "{msg}"),
        }
    }
}

impl StdError for ScrError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ScrError::ActivationFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl ScrError {
    pub(crate) fn invalid(component: &str, reason: impl Into<String>) -> Self {
        ScrError::InvalidDescription {
            component: component.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T = ()> = std::result::Result<T, ScrError>;
