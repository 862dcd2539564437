//! WebView 脚本桥 - 在嵌入式单线程脚本宿主上做请求/响应关联
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 请求 ID、待决注册表、响应路由、脚本模板、生命周期、脚本桥（defer / get）
//! - **host**: 脚本宿主边界（ScriptHost trait、Mock 宿主、Headless Chrome 宿主）
//! - **observability**: 日志初始化与桥接计数器

pub mod config;
pub mod core;
pub mod host;
pub mod observability;

pub use crate::core::{BridgeError, PendingScript, ScriptBridge};
