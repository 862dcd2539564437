//! 脚本宿主边界
//!
//! 桥只通过 ScriptHost 与嵌入式宿主交互：构造时 bind 一次两个回调名，之后 evaluate 派发脚本，
//! 结果只经由回调流回 ResponseRouter。

use std::sync::Arc;

use crate::core::{CallbackNames, RequestId, ResponseRouter};

#[cfg(feature = "browser")]
pub mod chrome;
pub mod mock;

#[cfg(feature = "browser")]
pub use chrome::ChromeHost;
pub use mock::MockHost;

/// 一次待派发的脚本
///
/// 宿主若把派发挪到别的线程，之后的失败经 `fail` 以 HostError 结束该请求。
pub struct Dispatch {
    id: RequestId,
    script: String,
    router: Arc<ResponseRouter>,
}

impl Dispatch {
    pub(crate) fn new(id: RequestId, script: String, router: Arc<ResponseRouter>) -> Self {
        Self { id, script, router }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// 派发失败；请求已结束时返回 false
    pub fn fail(&self, message: &str) -> bool {
        self.router.on_dispatch_failure(&self.id, message)
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch").field("id", &self.id).finish()
    }
}

/// 嵌入式脚本宿主（WebView、浏览器标签页等）
pub trait ScriptHost: Send + Sync {
    /// 把 success(id, value) / failure(id, message) 绑定到 router
    ///
    /// 回调名已被同一宿主上的其他桥占用时返回 Err。
    fn bind(&self, callbacks: &CallbackNames, router: Arc<ResponseRouter>) -> Result<(), String>;

    /// 交给宿主自己的运行循环执行；不等待结果，也不得阻塞调用线程
    fn evaluate(&self, dispatch: Dispatch) -> Result<(), String>;

    /// 文档 / 脚本面当前能否接收脚本
    fn is_ready(&self) -> bool {
        true
    }
}
