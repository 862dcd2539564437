//! 生命周期信号：应用是否仍在运行、文档是否可执行脚本
//!
//! - AppLifecycle：关闭信号（CancellationToken），同步入口据此判断「应用未运行」
//! - DocumentState：导航期间置为未就绪，同步入口据此判断「未就绪」
//! - ShutdownCoordinator：关闭时依次执行清理任务（例如拒绝所有待决请求）

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 应用生命周期（可克隆，共享同一关闭信号）
#[derive(Clone)]
pub struct AppLifecycle {
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// 用户发起的退出 (Ctrl+C 或 quit 命令)
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 宿主窗口 / 浏览器已关闭
    HostClosed,
}

impl AppLifecycle {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭（重复调用无副作用）
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        tracing::info!(reason = ?reason, "application shutting down");
        self.shutdown_token.cancel();
    }

    /// 运行循环是否仍在运行
    pub fn is_running(&self) -> bool {
        !self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let lifecycle = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                lifecycle.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let lifecycle = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    lifecycle.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// 文档就绪状态：宿主在导航开始 / 结束时切换
#[derive(Clone, Debug)]
pub struct DocumentState {
    ready: Arc<watch::Sender<bool>>,
}

impl DocumentState {
    pub fn new(ready: bool) -> Self {
        let (tx, _) = watch::channel(ready);
        Self {
            ready: Arc::new(tx),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn begin_navigation(&self) {
        tracing::debug!("document navigation started");
        self.ready.send_replace(false);
    }

    pub fn finish_navigation(&self) {
        tracing::debug!("document ready");
        self.ready.send_replace(true);
    }

    /// 等待文档就绪（同步入口不会等待，这里供调用方在 NotReady 后使用）
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for DocumentState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 关闭协调器：管理多个清理任务
pub struct ShutdownCoordinator {
    lifecycle: AppLifecycle,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    /// 单个清理任务的超时时间（秒）
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(lifecycle: AppLifecycle) -> Self {
        Self {
            lifecycle,
            cleanup_tasks: Vec::new(),
            timeout_secs: 5,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Cleanup task '{}' completed successfully", name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Cleanup task '{}' failed: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!("Cleanup task '{}' timed out after {}s", name, self.timeout_secs);
                }
            }
        }

        tracing::info!("All cleanup tasks finished");
    }

    pub fn lifecycle(&self) -> &AppLifecycle {
        &self.lifecycle
    }
}

/// 运行主应用直到其结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F>(coordinator: ShutdownCoordinator, app: F)
where
    F: Future<Output = ()>,
{
    let lifecycle = coordinator.lifecycle().clone();
    lifecycle.install_signal_handlers();

    tokio::select! {
        _ = app => {
            tracing::info!("Application finished normally");
            lifecycle.shutdown(ShutdownReason::UserInitiated);
        }
        _ = lifecycle.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received");
        }
    }

    coordinator.run_cleanup().await;
}
