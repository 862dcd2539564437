//! bridge-repl - 交互式脚本桥
//!
//! 入口：初始化日志、加载配置、启动 Headless Chrome 宿主，逐行读取表达式并通过同步入口求值。
//! 以 `:goto <url>` 导航，`:quit` 退出。
//!
//! 运行方式：
//! ```bash
//! cargo run --bin bridge-repl --features browser
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use webview_bridge::config::load_config;
use webview_bridge::core::{
    run_with_graceful_shutdown, AppLifecycle, BridgeCleanup, ScriptBridge, ShutdownCoordinator,
};
use webview_bridge::host::ChromeHost;
use webview_bridge::observability;

/// REPL 中单次求值的等待时间（配置默认值面向程序调用，对人来说太短）
const REPL_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;

    let host = Arc::new(ChromeHost::launch(&cfg.browser).context("Failed to launch browser")?);
    let lifecycle = AppLifecycle::new();
    let bridge = Arc::new(
        ScriptBridge::new(&cfg.bridge, host.clone(), lifecycle.clone())
            .context("Failed to create script bridge")?,
    );

    let mut coordinator = ShutdownCoordinator::new(lifecycle.clone());
    coordinator.register(BridgeCleanup::new(Arc::clone(&bridge)));

    tracing::info!("Bridge ready at {}", host.current_url());

    let repl = async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("stdin read failed: {}", e);
                    break;
                }
            };
            let line = line.trim();

            if line == ":quit" {
                break;
            }
            if let Some(url) = line.strip_prefix(":goto ") {
                let host = Arc::clone(&host);
                let url = url.trim().to_string();
                match tokio::task::spawn_blocking(move || host.navigate(&url)).await {
                    Ok(Ok(())) => println!("ok"),
                    Ok(Err(e)) => println!("error: {}", e),
                    Err(e) => println!("error: task join: {}", e),
                }
                continue;
            }

            match bridge.get(line, Some(REPL_TIMEOUT)).await {
                Ok(value) => println!("{}", value),
                Err(e) => println!("error: {}", e),
            }
        }
    };

    run_with_graceful_shutdown(coordinator, repl).await;

    Ok(())
}
