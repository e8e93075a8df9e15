use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, ScrError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrConfig {
    /// App 配置命令通道容量
    pub queue_capacity: usize,
    /// 组件未满足且发布服务时做依赖环检测
    pub detect_cycles: bool,
    /// 等待其他组件闸门的上限（毫秒）；超时后工作转交持有者
    pub lock_timeout_ms: u64,
}

pub const SCR_DEFAULT_QUEUE: usize = 1024;
pub const SCR_DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

impl Default for ScrConfig {
    fn default() -> Self {
        Self {
            queue_capacity: SCR_DEFAULT_QUEUE,
            detect_cycles: true,
            lock_timeout_ms: SCR_DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl ScrConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ScrError::Runtime(format!("invalid runtime config: {e}")))
    }
}
