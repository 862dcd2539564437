//! Mock 宿主（用于测试，无需浏览器）
//!
//! 记录派发的脚本，由测试代码扮演宿主调用 respond / reject。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{Dispatch, ScriptHost};
use crate::core::{CallbackNames, DocumentState, ResponseRouter};

#[derive(Default)]
pub struct MockHost {
    scripts: Mutex<Vec<String>>,
    /// 按绑定顺序；回调名在同一宿主上唯一
    bindings: Mutex<Vec<(CallbackNames, Arc<ResponseRouter>)>>,
    document: DocumentState,
    fail_dispatch: AtomicBool,
    fail_dispatch_later: AtomicBool,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已派发的脚本（按派发顺序）
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn dispatch_count(&self) -> usize {
        self.scripts.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn document(&self) -> &DocumentState {
        &self.document
    }

    /// 第一个绑定的回调名
    pub fn bound_callbacks(&self) -> Option<CallbackNames> {
        self.bindings
            .lock()
            .ok()
            .and_then(|b| b.first().map(|(names, _)| names.clone()))
    }

    /// 之后的 evaluate 全部同步失败
    pub fn fail_dispatch(&self, fail: bool) {
        self.fail_dispatch.store(fail, Ordering::SeqCst);
    }

    /// 之后的 evaluate 先返回 Ok，再在另一线程上报派发失败
    pub fn fail_dispatch_later(&self, fail: bool) {
        self.fail_dispatch_later.store(fail, Ordering::SeqCst);
    }

    /// 扮演宿主调用第一个绑定的成功回调
    pub fn respond(&self, id: &str, value: Value) -> bool {
        self.first_router()
            .map(|r| r.on_success(id, value))
            .unwrap_or(false)
    }

    /// 扮演宿主调用第一个绑定的失败回调
    pub fn reject(&self, id: &str, message: &str) -> bool {
        self.first_router()
            .map(|r| r.on_failure(id, message))
            .unwrap_or(false)
    }

    /// 按名字调用成功回调；名字未绑定时返回 false
    pub fn respond_on(&self, success: &str, id: &str, value: Value) -> bool {
        self.router_where(|names| names.success == success)
            .map(|r| r.on_success(id, value))
            .unwrap_or(false)
    }

    fn first_router(&self) -> Option<Arc<ResponseRouter>> {
        self.router_where(|_| true)
    }

    fn router_where(&self, pred: impl Fn(&CallbackNames) -> bool) -> Option<Arc<ResponseRouter>> {
        self.bindings.lock().ok().and_then(|b| {
            b.iter()
                .find(|(names, _)| pred(names))
                .map(|(_, router)| Arc::clone(router))
        })
    }
}

impl ScriptHost for MockHost {
    fn bind(&self, callbacks: &CallbackNames, router: Arc<ResponseRouter>) -> Result<(), String> {
        let mut bindings = self.bindings.lock().map_err(|e| e.to_string())?;
        for (bound, _) in bindings.iter() {
            for name in [&callbacks.success, &callbacks.failure] {
                if *name == bound.success || *name == bound.failure {
                    return Err(format!("callback already bound on this host: {}", name));
                }
            }
        }
        bindings.push((callbacks.clone(), router));
        Ok(())
    }

    fn evaluate(&self, dispatch: Dispatch) -> Result<(), String> {
        if self.fail_dispatch.load(Ordering::SeqCst) {
            return Err("mock dispatch failure".to_string());
        }
        self.scripts
            .lock()
            .map_err(|e| e.to_string())?
            .push(dispatch.script().to_string());
        if self.fail_dispatch_later.load(Ordering::SeqCst) {
            std::thread::spawn(move || {
                dispatch.fail("mock dispatch failure");
            });
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.document.is_ready()
    }
}
