//! 脚本桥：异步入口 defer 与「同步」入口 get
//!
//! - defer 立即返回 PendingScript，不挂起，不设超时
//! - get 在 await 处挂起当前逻辑续体，结果 / 超时 / 应用关闭三者谁先到谁生效；
//!   其余路径的 future 与计时器随之被丢弃，迟到的回调只会落空

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use super::error::BridgeError;
use super::id::{IdGenerator, RequestId};
use super::lifecycle::{AppLifecycle, ShutdownCleanup};
use super::pending::PendingScript;
use super::registry::{PendingRegistry, ResponseRouter, ResultSlot};
use super::script::{CallbackNames, ScriptTemplate};
use crate::config::BridgeSection;
use crate::host::{Dispatch, ScriptHost};
use crate::observability::{BridgeMetrics, MetricsSnapshot};

/// 生成器连续给出仍在等待的 ID 时的最大重试次数
const MAX_ID_ATTEMPTS: usize = 16;

/// 一个嵌入式宿主会话对应一个桥实例；注册表、生成器与配置均为实例私有
pub struct ScriptBridge {
    host: Arc<dyn ScriptHost>,
    lifecycle: AppLifecycle,
    registry: Arc<PendingRegistry>,
    router: Arc<ResponseRouter>,
    ids: Box<dyn IdGenerator>,
    template: ScriptTemplate,
    timeout: Duration,
    metrics: Arc<BridgeMetrics>,
}

impl ScriptBridge {
    /// 按配置中的 ID 策略创建
    pub fn new(
        section: &BridgeSection,
        host: Arc<dyn ScriptHost>,
        lifecycle: AppLifecycle,
    ) -> Result<Self, BridgeError> {
        Self::with_id_generator(section, host, lifecycle, section.id_strategy.build())
    }

    /// 使用自定义 ID 生成器创建；回调在这里绑定到宿主，且只绑定一次
    pub fn with_id_generator(
        section: &BridgeSection,
        host: Arc<dyn ScriptHost>,
        lifecycle: AppLifecycle,
        ids: Box<dyn IdGenerator>,
    ) -> Result<Self, BridgeError> {
        section.validate()?;
        let callbacks = section.callback_names();
        let timeout = section.timeout()?;

        let metrics = Arc::new(BridgeMetrics::default());
        let registry = Arc::new(PendingRegistry::new());
        let router = Arc::new(ResponseRouter::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));

        host.bind(&callbacks, Arc::clone(&router))
            .map_err(BridgeError::HostError)?;

        tracing::info!(
            success = %callbacks.success,
            failure = %callbacks.failure,
            timeout_ms = timeout.as_millis() as u64,
            "script bridge bound"
        );

        Ok(Self {
            host,
            lifecycle,
            registry,
            router,
            ids,
            template: ScriptTemplate::new(callbacks),
            timeout,
            metrics,
        })
    }

    /// 异步入口：派发脚本并立即返回结果 future
    ///
    /// 空表达式直接得到 `""`，不派发、不占用 ID。丢弃返回的 future 即取消。
    pub fn defer(&self, code: &str) -> PendingScript {
        if code.is_empty() {
            return PendingScript::ready(Ok(Value::String(String::new())));
        }

        let (tx, rx) = oneshot::channel();
        let id = match self.register(tx) {
            Ok(id) => id,
            Err(e) => return PendingScript::ready(Err(e)),
        };
        let pending = PendingScript::waiting(id.clone(), rx, Arc::clone(&self.router));

        let script = self.template.render(&id, code);
        let dispatch = Dispatch::new(id.clone(), script, Arc::clone(&self.router));
        match self.host.evaluate(dispatch) {
            Ok(()) => {
                self.metrics.record_dispatched();
                tracing::debug!(request_id = %id, "script dispatched");
            }
            // 同步失败与宿主线程上的失败走同一条路：槽里落下 HostError
            Err(e) => {
                self.router.on_dispatch_failure(&id, &e);
            }
        }
        pending
    }

    /// 「同步」入口：等待宿主结果，最长 `timeout`（默认取配置）
    ///
    /// 检查顺序：空表达式 → 文档就绪 → 应用运行中。
    pub async fn get(&self, code: &str, timeout: Option<Duration>) -> Result<Value, BridgeError> {
        if code.is_empty() {
            return Ok(Value::String(String::new()));
        }
        if !self.host.is_ready() {
            return Err(BridgeError::NotReady);
        }
        if !self.lifecycle.is_running() {
            return Err(BridgeError::ApplicationNotRunning);
        }

        let timeout = timeout.unwrap_or(self.timeout);
        let pending = self.defer(code);
        let request_id = pending.id().cloned();
        let shutdown = self.lifecycle.token();

        tokio::select! {
            biased;
            result = tokio::time::timeout(timeout, pending) => match result {
                Ok(result) => result,
                Err(_) => {
                    self.metrics.record_stalled();
                    tracing::warn!(
                        request_id = ?request_id.as_ref().map(|id| id.as_str()),
                        timeout_ms = timeout.as_millis() as u64,
                        "script request stalled"
                    );
                    Err(BridgeError::StalledRequest {
                        code: code.to_string(),
                        timeout,
                    })
                }
            },
            _ = shutdown.cancelled() => Err(BridgeError::ApplicationNotRunning),
        }
    }

    /// 宿主成功回调的直接入口
    pub fn respond(&self, id: &str, value: Value) -> bool {
        self.router.on_success(id, value)
    }

    /// 宿主失败回调的直接入口
    pub fn reject(&self, id: &str, message: &str) -> bool {
        self.router.on_failure(id, message)
    }

    pub fn router(&self) -> Arc<ResponseRouter> {
        Arc::clone(&self.router)
    }

    pub fn callbacks(&self) -> &CallbackNames {
        self.template.callbacks()
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.registry.contains(id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 以 ApplicationNotRunning 拒绝所有待决请求，返回拒绝的数量
    pub fn close(&self) -> usize {
        let drained = self.registry.drain();
        let count = drained.len();
        for (id, slot) in drained {
            tracing::debug!(request_id = %id, "rejecting pending script on close");
            let _ = slot.send(Err(BridgeError::ApplicationNotRunning));
        }
        if count > 0 {
            tracing::info!("Rejected {} pending scripts on close", count);
        }
        count
    }

    /// 取号并登记；生成器给出仍在等待的 ID 时换一个
    fn register(&self, mut slot: ResultSlot) -> Result<RequestId, BridgeError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            match self.registry.register(id.clone(), slot) {
                Ok(()) => return Ok(id),
                Err(returned) => {
                    tracing::warn!(request_id = %id, "id generator returned a pending id, drawing another");
                    slot = returned;
                }
            }
        }
        Err(BridgeError::ConfigError(format!(
            "id generator returned pending ids {} times in a row",
            MAX_ID_ATTEMPTS
        )))
    }
}

/// 关闭时拒绝所有待决请求
pub struct BridgeCleanup {
    bridge: Arc<ScriptBridge>,
}

impl BridgeCleanup {
    pub fn new(bridge: Arc<ScriptBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for BridgeCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.bridge.close();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ScriptBridge"
    }
}
