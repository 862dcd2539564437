//! 待决脚本 future
//!
//! `defer` 立即返回 PendingScript；丢弃它即取消：注册表条目被移除，之后的回调成为空操作。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use super::error::BridgeError;
use super::id::RequestId;
use super::registry::ResponseRouter;

enum Inner {
    /// 已有结果（空表达式短路、取号失败）
    Ready(Option<Result<Value, BridgeError>>),
    Waiting {
        id: RequestId,
        rx: oneshot::Receiver<Result<Value, BridgeError>>,
        router: Arc<ResponseRouter>,
        settled: bool,
    },
}

/// 一次脚本调用的结果
pub struct PendingScript {
    inner: Inner,
}

impl PendingScript {
    pub(crate) fn ready(result: Result<Value, BridgeError>) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
        }
    }

    pub(crate) fn waiting(
        id: RequestId,
        rx: oneshot::Receiver<Result<Value, BridgeError>>,
        router: Arc<ResponseRouter>,
    ) -> Self {
        Self {
            inner: Inner::Waiting {
                id,
                rx,
                router,
                settled: false,
            },
        }
    }

    /// 关联 ID；短路结果没有 ID
    pub fn id(&self) -> Option<&RequestId> {
        match &self.inner {
            Inner::Ready(_) => None,
            Inner::Waiting { id, .. } => Some(id),
        }
    }

    /// 显式取消（等价于 drop）
    pub fn cancel(self) {
        drop(self);
    }
}

impl Future for PendingScript {
    type Output = Result<Value, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("PendingScript polled after completion"),
            },
            Inner::Waiting {
                id, rx, settled, ..
            } => match Pin::new(rx).poll(cx) {
                Poll::Ready(received) => {
                    *settled = true;
                    Poll::Ready(received.unwrap_or_else(|_| Err(BridgeError::Cancelled(id.to_string()))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl Drop for PendingScript {
    fn drop(&mut self) {
        if let Inner::Waiting {
            id,
            router,
            settled: false,
            ..
        } = &self.inner
        {
            router.cancel(id);
        }
    }
}

impl std::fmt::Debug for PendingScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingScript").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::PendingRegistry;
    use crate::observability::BridgeMetrics;
    use futures_util::FutureExt;
    use serde_json::json;

    fn router() -> Arc<ResponseRouter> {
        Arc::new(ResponseRouter::new(
            Arc::new(PendingRegistry::new()),
            Arc::new(BridgeMetrics::default()),
        ))
    }

    fn pending(router: &Arc<ResponseRouter>, id: &str) -> PendingScript {
        let (tx, rx) = oneshot::channel();
        router.registry().register(RequestId::from(id), tx).unwrap();
        PendingScript::waiting(RequestId::from(id), rx, Arc::clone(router))
    }

    #[test]
    fn test_ready_resolves_immediately() {
        let script = PendingScript::ready(Ok(json!("")));
        assert!(script.id().is_none());
        assert_eq!(script.now_or_never(), Some(Ok(json!(""))));
    }

    #[tokio::test]
    async fn test_resolves_after_success_callback() {
        let router = router();
        let script = pending(&router, "1");
        assert!(router.on_success("1", json!(2)));
        assert_eq!(script.await, Ok(json!(2)));
    }

    #[test]
    fn test_drop_removes_registry_entry() {
        let router = router();
        let script = pending(&router, "5");
        assert!(router.registry().contains(&RequestId::from("5")));
        script.cancel();
        assert!(!router.registry().contains(&RequestId::from("5")));
        assert!(!router.on_success("5", json!(1)));
    }

    #[tokio::test]
    async fn test_lost_slot_reports_cancelled() {
        let router = router();
        let script = pending(&router, "9");
        drop(router.registry().take(&RequestId::from("9")));
        assert_eq!(script.await, Err(BridgeError::Cancelled("9".to_string())));
    }
}
