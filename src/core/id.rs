//! 请求 ID：关联键与生成策略
//!
//! 生成器只需保证与「当前仍在等待」的 ID 不重复；结果返回后 ID 可被复用。

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// 关联键（宿主回调时以字符串形式带回）
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<usize> for RequestId {
    fn from(value: usize) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// ID 生成策略（可插拔）
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> RequestId;
}

/// 闭包也可作为生成器
impl<F> IdGenerator for F
where
    F: Fn() -> RequestId + Send + Sync,
{
    fn next_id(&self) -> RequestId {
        self()
    }
}

/// 平台位宽的单调递增计数器，首个 ID 为 "1"，溢出后回绕
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicUsize,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> RequestId {
        let id = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        RequestId::from(id)
    }
}

/// 随机 v4 UUID
#[derive(Debug, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> RequestId {
        RequestId(uuid::Uuid::new_v4().to_string())
    }
}

/// 配置中可选的生成策略
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Sequential,
    Uuid,
}

impl IdStrategy {
    pub fn build(self) -> Box<dyn IdGenerator> {
        match self {
            IdStrategy::Sequential => Box::new(SequentialIdGenerator::new()),
            IdStrategy::Uuid => Box::new(UuidIdGenerator),
        }
    }
}
