//! 桥接错误类型
//!
//! 同步入口只会抛出以下几类错误之一；异步入口只会看到 ClientError（或调用方自己触发的取消）。

use std::time::Duration;

use thiserror::Error;

/// 脚本桥在发起调用的位置返回的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// 文档 / 脚本面当前无法执行脚本（例如导航中）
    #[error("WebView is not ready to evaluate scripts")]
    NotReady,

    /// 宿主应用的运行循环已停止
    #[error("Application is not running")]
    ApplicationNotRunning,

    /// 宿主报告脚本执行失败，原样携带宿主给出的消息
    #[error("Client error: {0}")]
    ClientError(String),

    /// 同步入口在超时前没有收到任何回调
    #[error("Request stalled after {timeout:?} while evaluating: {code}")]
    StalledRequest { code: String, timeout: Duration },

    /// 结果槽在写入前被丢弃
    #[error("Request {0} was cancelled")]
    Cancelled(String),

    /// 绑定回调或派发脚本失败
    #[error("Host error: {0}")]
    HostError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl BridgeError {
    /// 是否为宿主侧脚本错误（调用方修正脚本后可重试）
    pub fn is_client_error(&self) -> bool {
        matches!(self, BridgeError::ClientError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stalled_request_message_carries_code_and_timeout() {
        let err = BridgeError::StalledRequest {
            code: "document.title".to_string(),
            timeout: Duration::from_millis(50),
        };
        let msg = err.to_string();
        assert!(msg.contains("document.title"));
        assert!(msg.contains("50ms"));
    }

    #[test]
    fn test_client_error_wraps_message_verbatim() {
        let err = BridgeError::ClientError("Oops".to_string());
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Client error: Oops");
        assert!(!BridgeError::NotReady.is_client_error());
    }
}
