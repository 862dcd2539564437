//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BRIDGE__*` 覆盖（双下划线表示嵌套，如 `BRIDGE__BRIDGE__TIMEOUT=0.5`）。
//! 配置在桥构造时读取一次，之后不可变。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{BridgeError, CallbackNames, IdStrategy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeSection,
    pub browser: BrowserSection,
}

/// [bridge] 段：回调名、默认超时、ID 策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// 回调名前缀，默认回调为 `<namespace>.data.respond` / `<namespace>.data.reject`
    pub namespace: String,
    /// 同步调用的默认等待时间（秒）
    pub timeout: f64,
    pub success_callback: Option<String>,
    pub failure_callback: Option<String>,
    pub id_strategy: IdStrategy,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            namespace: "bridge".to_string(),
            timeout: 0.1,
            success_callback: None,
            failure_callback: None,
            id_strategy: IdStrategy::default(),
        }
    }
}

impl BridgeSection {
    /// 显式配置优先，否则由 namespace 推导
    pub fn callback_names(&self) -> CallbackNames {
        let defaults = CallbackNames::for_namespace(&self.namespace);
        CallbackNames {
            success: self.success_callback.clone().unwrap_or(defaults.success),
            failure: self.failure_callback.clone().unwrap_or(defaults.failure),
        }
    }

    pub fn timeout(&self) -> Result<Duration, BridgeError> {
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(BridgeError::ConfigError(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }
        Duration::try_from_secs_f64(self.timeout)
            .map_err(|e| BridgeError::ConfigError(format!("invalid timeout: {}", e)))
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        self.timeout()?;
        self.callback_names().validate()
    }
}

/// [browser] 段：Headless Chrome 宿主
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    /// 启动后首先打开的页面
    pub start_url: String,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            start_url: "about:blank".to_string(),
            window_width: 1280,
            window_height: 800,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BRIDGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BRIDGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bridge.timeout().unwrap(), Duration::from_secs_f64(0.1));
        assert_eq!(cfg.bridge.callback_names().success, "bridge.data.respond");
        assert_eq!(cfg.bridge.callback_names().failure, "bridge.data.reject");
        assert_eq!(cfg.bridge.id_strategy, IdStrategy::Sequential);
        assert!(cfg.browser.headless);
        assert!(cfg.bridge.validate().is_ok());
    }

    #[test]
    fn test_explicit_callbacks_override_namespace() {
        let section = BridgeSection {
            namespace: "app".to_string(),
            success_callback: Some("host.ok".to_string()),
            ..BridgeSection::default()
        };
        let names = section.callback_names();
        assert_eq!(names.success, "host.ok");
        assert_eq!(names.failure, "app.data.reject");
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        for timeout in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let section = BridgeSection {
                timeout,
                ..BridgeSection::default()
            };
            assert!(matches!(section.timeout(), Err(BridgeError::ConfigError(_))));
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[bridge]
namespace = "wv"
timeout = 0.25
id_strategy = "uuid"

[browser]
headless = false
start_url = "https://example.com"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.bridge.namespace, "wv");
        assert_eq!(cfg.bridge.timeout().unwrap(), Duration::from_millis(250));
        assert_eq!(cfg.bridge.id_strategy, IdStrategy::Uuid);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.start_url, "https://example.com");
        assert_eq!(cfg.browser.window_width, 1280);
    }
}
