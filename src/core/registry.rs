//! 待决请求注册表与响应路由
//!
//! 注册表的查找是破坏性的（take）：无论成功回调、失败回调还是取消，谁先取走条目谁生效，
//! 之后针对同一 ID 的回调都是空操作。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::oneshot;

use super::error::BridgeError;
use super::id::RequestId;
use crate::observability::BridgeMetrics;

/// 单次赋值的结果槽
pub type ResultSlot = oneshot::Sender<Result<Value, BridgeError>>;

/// ID → 结果槽，同一 ID 至多一个条目
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<RequestId, ResultSlot>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, ResultSlot>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 登记结果槽；ID 已存在时不覆盖，并把槽原样交还
    pub fn register(&self, id: RequestId, slot: ResultSlot) -> Result<(), ResultSlot> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(slot);
        }
        entries.insert(id, slot);
        Ok(())
    }

    /// 取出并移除；未知 ID 返回 None（迟到 / 重复回调的正常情况）
    pub fn take(&self, id: &RequestId) -> Option<ResultSlot> {
        self.lock().remove(id)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 一次性取出全部条目（关闭时使用）
    pub fn drain(&self) -> Vec<(RequestId, ResultSlot)> {
        self.lock().drain().collect()
    }
}

/// 响应路由：宿主的两个回调最终落到这里
#[derive(Debug)]
pub struct ResponseRouter {
    registry: Arc<PendingRegistry>,
    metrics: Arc<BridgeMetrics>,
}

impl ResponseRouter {
    pub fn new(registry: Arc<PendingRegistry>, metrics: Arc<BridgeMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// 成功回调：找到则以 value 兑现，返回是否送达
    pub fn on_success(&self, id: &str, value: Value) -> bool {
        let id = RequestId::from(id);
        match self.registry.take(&id) {
            Some(slot) => {
                tracing::debug!(request_id = %id, "script resolved");
                self.metrics.record_resolved();
                self.deliver(&id, slot, Ok(value))
            }
            None => {
                self.late_arrival(&id, "respond");
                false
            }
        }
    }

    /// 失败回调：找到则以 ClientError 拒绝，返回是否送达
    pub fn on_failure(&self, id: &str, message: &str) -> bool {
        let id = RequestId::from(id);
        match self.registry.take(&id) {
            Some(slot) => {
                tracing::debug!(request_id = %id, error = %message, "script rejected");
                self.metrics.record_rejected();
                self.deliver(&id, slot, Err(BridgeError::ClientError(message.to_string())))
            }
            None => {
                self.late_arrival(&id, "reject");
                false
            }
        }
    }

    /// 派发失败：找到则以 HostError 结束；请求已结束时什么也不做
    pub fn on_dispatch_failure(&self, id: &RequestId, message: &str) -> bool {
        match self.registry.take(id) {
            Some(slot) => {
                tracing::warn!(request_id = %id, error = %message, "script dispatch failed");
                self.metrics.record_dispatch_failed();
                self.deliver(id, slot, Err(BridgeError::HostError(message.to_string())))
            }
            None => {
                tracing::debug!(request_id = %id, error = %message, "dispatch failed after request settled");
                false
            }
        }
    }

    /// 取消钩子：消费方放弃等待时移除条目
    pub fn cancel(&self, id: &RequestId) -> bool {
        if self.registry.take(id).is_some() {
            tracing::debug!(request_id = %id, "pending script cancelled");
            self.metrics.record_cancelled();
            true
        } else {
            false
        }
    }

    fn deliver(&self, id: &RequestId, slot: ResultSlot, result: Result<Value, BridgeError>) -> bool {
        if slot.send(result).is_err() {
            // 消费方已丢弃 future，但还没来得及 take
            self.late_arrival(id, "deliver");
            return false;
        }
        true
    }

    fn late_arrival(&self, id: &RequestId, channel: &str) {
        self.metrics.record_late_arrival();
        tracing::debug!(request_id = %id, channel, "callback for unknown request ignored");
    }
}
