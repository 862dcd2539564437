//! 脚本模板：把用户表达式包装成「恰好回调一次」的宿主脚本
//!
//! 表达式以字符串字面量嵌入，在独立函数作用域中编译求值（非表达式时退回间接 eval）；结果是 thenable 时等待其完成；
//! 成功调用 success(id, result)，同步抛错或 Promise 拒绝调用 failure(id, message)。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::error::BridgeError;
use super::id::RequestId;

/// 宿主侧的两个回调入口名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackNames {
    pub success: String,
    pub failure: String,
}

impl CallbackNames {
    /// 默认 `<namespace>.data.respond` / `<namespace>.data.reject`
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            success: format!("{}.data.respond", namespace),
            failure: format!("{}.data.reject", namespace),
        }
    }

    /// 非空、互不相同、且为点分 JS 标识符路径（会被原样写入脚本）
    pub fn validate(&self) -> Result<(), BridgeError> {
        for name in [&self.success, &self.failure] {
            if name.is_empty() {
                return Err(BridgeError::ConfigError(
                    "callback name must not be empty".to_string(),
                ));
            }
            if !identifier_path().is_match(name) {
                return Err(BridgeError::ConfigError(format!(
                    "callback name is not a valid identifier path: {}",
                    name
                )));
            }
        }
        if self.success == self.failure {
            return Err(BridgeError::ConfigError(format!(
                "success and failure callbacks must differ: {}",
                self.success
            )));
        }
        Ok(())
    }
}

fn identifier_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$")
            .expect("identifier regex")
    })
}

/// 转义后可放进单引号 JS 字符串字面量
pub fn escape_single_quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

/// 绑定了回调名的脚本模板
#[derive(Debug, Clone)]
pub struct ScriptTemplate {
    callbacks: CallbackNames,
}

impl ScriptTemplate {
    pub fn new(callbacks: CallbackNames) -> Self {
        Self { callbacks }
    }

    pub fn callbacks(&self) -> &CallbackNames {
        &self.callbacks
    }

    /// 表达式以字符串字面量嵌入，在 try 内编译求值：语法错误同样走 failure；
    /// 上报放在 try 之外，success 抛错时不会再触发 failure
    pub fn render(&self, id: &RequestId, code: &str) -> String {
        format!(
            r#"(function () {{
    var id = '{id}';
    var code = {code};
    var fail = function (error) {{
        {failure}(id, error instanceof Error ? error.message : String(error));
    }};
    var result;
    try {{
        var evaluate;
        try {{
            evaluate = new Function('return (\n' + code + '\n);');
        }} catch (notExpression) {{
            evaluate = function () {{ return (0, eval)(code); }};
        }}
        result = evaluate();
    }} catch (error) {{
        fail(error);
        return;
    }}
    if (result !== null && (typeof result === 'object' || typeof result === 'function') && typeof result.then === 'function') {{
        result.then(function (value) {{ {success}(id, value); }}, fail);
    }} else {{
        {success}(id, result);
    }}
}})();"#,
            id = escape_single_quoted(id.as_str()),
            code = js_string_literal(code),
            success = self.callbacks.success,
            failure = self.callbacks.failure,
        )
    }
}

/// 双引号 JS 字符串字面量（JSON 转义，另转义 U+2028 / U+2029）
fn js_string_literal(raw: &str) -> String {
    Value::String(raw.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
