//! Headless Chrome 宿主：在浏览器标签页中执行桥接脚本
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//!
//! ## 回调绑定
//!
//! CDP 绑定只能是全局函数名，且只接收一个字符串参数；而桥的回调名是点分路径（如 `bridge.data.respond`）。
//! 因此为每个回调暴露一个扁平绑定（`__bridge_data_respond`），再注入一段 shim，在点分路径上定义
//! `(id, value)` 形式的函数，把参数序列化为 JSON 交给扁平绑定。shim 在每次导航后重新注入。

use std::sync::{Arc, RwLock};

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Dispatch, ScriptHost};
use crate::config::BrowserSection;
use crate::core::{escape_single_quoted, BridgeError, CallbackNames, DocumentState, ResponseRouter};

/// 成功回调的 JSON 负载
#[derive(Debug, Deserialize)]
struct RespondPayload {
    id: String,
    #[serde(default)]
    value: Value,
}

/// 失败回调的 JSON 负载
#[derive(Debug, Deserialize)]
struct RejectPayload {
    id: String,
    #[serde(default)]
    message: String,
}

/// 点分回调名 → 扁平 CDP 绑定名
fn binding_name(callback: &str) -> String {
    format!("__{}", callback.replace('.', "_"))
}

/// 绑定负载可能是 `{name, seq, args: ["<json>"]}`（页面包装器）或直接是我们的 JSON
fn unwrap_binding_payload(payload: Value) -> Option<Value> {
    let inner = match payload.get("args").and_then(|args| args.get(0)) {
        Some(arg) => arg.clone(),
        None => payload,
    };
    match inner {
        Value::String(raw) => serde_json::from_str(&raw).ok(),
        other => Some(other),
    }
}

/// 在页面中定义点分回调名的 shim；无法序列化的值走失败回调，保证恰好一次
fn callback_shim(callbacks: &CallbackNames) -> String {
    format!(
        r#"(function () {{
    function define(path, fn) {{
        var parts = path.split('.');
        var target = window;
        for (var i = 0; i < parts.length - 1; i++) {{
            target = target[parts[i]] = target[parts[i]] || {{}};
        }}
        target[parts[parts.length - 1]] = fn;
    }}
    var respond = '{respond_binding}';
    var reject = '{reject_binding}';
    define('{success}', function (id, value) {{
        var payload;
        try {{
            payload = JSON.stringify({{ id: id, value: value === undefined ? null : value }});
        }} catch (error) {{
            window[reject](JSON.stringify({{ id: id, message: String(error && error.message || error) }}));
            return;
        }}
        window[respond](payload);
    }});
    define('{failure}', function (id, message) {{
        window[reject](JSON.stringify({{ id: id, message: String(message) }}));
    }});
}})();"#,
        respond_binding = escape_single_quoted(&binding_name(&callbacks.success)),
        reject_binding = escape_single_quoted(&binding_name(&callbacks.failure)),
        success = escape_single_quoted(&callbacks.success),
        failure = escape_single_quoted(&callbacks.failure),
    )
}

/// 回调名（按扁平绑定名比较）是否与已绑定的任一名字冲突
fn taken_name<'a>(bound: &[(CallbackNames, String)], callbacks: &'a CallbackNames) -> Option<&'a str> {
    [&callbacks.success, &callbacks.failure]
        .into_iter()
        .find(|name| {
            let flat = binding_name(name);
            bound.iter().any(|(names, _)| {
                flat == binding_name(&names.success) || flat == binding_name(&names.failure)
            })
        })
        .map(|name| name.as_str())
}

/// 浏览器标签页宿主
///
/// CDP 调用是阻塞的：evaluate 只把脚本投递给专用派发线程，按投递顺序执行。
pub struct ChromeHost {
    _browser: Browser,
    tab: Arc<Tab>,
    document: DocumentState,
    /// 已绑定的回调名及其 shim，导航后逐个重新注入
    bindings: RwLock<Vec<(CallbackNames, String)>>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
}

impl ChromeHost {
    /// 启动浏览器、派发线程，并打开 start_url
    pub fn launch(section: &BrowserSection) -> Result<Self, BridgeError> {
        let options = LaunchOptions::default_builder()
            .headless(section.headless)
            .window_size(Some((section.window_width, section.window_height)))
            .build()
            .map_err(|e| BridgeError::HostError(format!("Invalid launch options: {}", e)))?;
        let browser = Browser::new(options).map_err(|e| {
            BridgeError::HostError(format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))
        })?;
        let tab = browser
            .new_tab()
            .map_err(|e| BridgeError::HostError(format!("Browser tab failed: {}", e)))?;

        let dispatch_tx = spawn_dispatcher(Arc::clone(&tab))?;

        let host = Self {
            _browser: browser,
            tab,
            document: DocumentState::new(false),
            bindings: RwLock::new(Vec::new()),
            dispatch_tx,
        };
        host.navigate(&section.start_url)?;
        Ok(host)
    }

    pub fn document(&self) -> &DocumentState {
        &self.document
    }

    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    /// 导航期间文档标记为未就绪；完成后重新注入回调 shim
    ///
    /// 阻塞调用，异步上下文中请放进 spawn_blocking。
    pub fn navigate(&self, url: &str) -> Result<(), BridgeError> {
        tracing::info!(url = %url, "browser navigate");
        self.document.begin_navigation();
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| BridgeError::HostError(format!("Navigate failed: {}", e)))?;
        self.install_shims()?;
        self.document.finish_navigation();
        Ok(())
    }

    fn install_shims(&self) -> Result<(), BridgeError> {
        let bindings = self
            .bindings
            .read()
            .map_err(|e| BridgeError::HostError(e.to_string()))?;
        for (_, shim) in bindings.iter() {
            self.install_shim(shim)?;
        }
        Ok(())
    }

    fn install_shim(&self, shim: &str) -> Result<(), BridgeError> {
        self.tab
            .evaluate(shim, false)
            .map(|_| ())
            .map_err(|e| BridgeError::HostError(format!("Callback shim failed: {}", e)))
    }
}

/// 派发线程：逐个执行脚本，CDP 失败经 Dispatch::fail 回到请求方；发送端全部丢弃后退出
fn spawn_dispatcher(tab: Arc<Tab>) -> Result<mpsc::UnboundedSender<Dispatch>, BridgeError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();
    std::thread::Builder::new()
        .name("chrome-dispatch".to_string())
        .spawn(move || {
            while let Some(dispatch) = rx.blocking_recv() {
                // 不等待 Promise：结果只经由回调返回
                if let Err(e) = tab.evaluate(dispatch.script(), false) {
                    dispatch.fail(&format!("Evaluate failed: {}", e));
                }
            }
            tracing::debug!("chrome dispatch thread stopped");
        })
        .map_err(|e| BridgeError::HostError(format!("Dispatch thread failed: {}", e)))?;
    Ok(tx)
}

impl ScriptHost for ChromeHost {
    fn bind(&self, callbacks: &CallbackNames, router: Arc<ResponseRouter>) -> Result<(), String> {
        let mut bindings = self.bindings.write().map_err(|e| e.to_string())?;
        if let Some(name) = taken_name(&bindings, callbacks) {
            return Err(format!("Callback already bound on this tab: {}", name));
        }

        let respond_router = Arc::clone(&router);
        self.tab
            .expose_function(
                &binding_name(&callbacks.success),
                Arc::new(move |payload: Value| {
                    match unwrap_binding_payload(payload)
                        .and_then(|v| serde_json::from_value::<RespondPayload>(v).ok())
                    {
                        Some(p) => {
                            respond_router.on_success(&p.id, p.value);
                        }
                        None => tracing::warn!("malformed respond payload from page"),
                    }
                }),
            )
            .map_err(|e| format!("Expose respond binding failed: {}", e))?;

        let reject_router = router;
        self.tab
            .expose_function(
                &binding_name(&callbacks.failure),
                Arc::new(move |payload: Value| {
                    match unwrap_binding_payload(payload)
                        .and_then(|v| serde_json::from_value::<RejectPayload>(v).ok())
                    {
                        Some(p) => {
                            reject_router.on_failure(&p.id, &p.message);
                        }
                        None => tracing::warn!("malformed reject payload from page"),
                    }
                }),
            )
            .map_err(|e| format!("Expose reject binding failed: {}", e))?;

        let shim = callback_shim(callbacks);
        self.install_shim(&shim).map_err(|e| e.to_string())?;
        bindings.push((callbacks.clone(), shim));
        Ok(())
    }

    fn evaluate(&self, dispatch: Dispatch) -> Result<(), String> {
        self.dispatch_tx
            .send(dispatch)
            .map_err(|_| "Chrome dispatch thread stopped".to_string())
    }

    fn is_ready(&self) -> bool {
        self.document.is_ready()
    }
}
