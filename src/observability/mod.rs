//! 可观测性：日志初始化与桥接计数器

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// 桥接计数器（迟到的回调会被静默丢弃，这里至少留下计数）
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    dispatched: AtomicU64,
    resolved: AtomicU64,
    rejected: AtomicU64,
    stalled: AtomicU64,
    cancelled: AtomicU64,
    dispatch_failed: AtomicU64,
    late_arrivals: AtomicU64,
}

/// 某一时刻的计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub resolved: u64,
    pub rejected: u64,
    pub stalled: u64,
    /// 被放弃的条目（含超时后丢弃的）
    pub cancelled: u64,
    pub dispatch_failed: u64,
    pub late_arrivals: u64,
}

impl BridgeMetrics {
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stalled(&self) {
        self.stalled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failed(&self) {
        self.dispatch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_arrival(&self) {
        self.late_arrivals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            dispatch_failed: self.dispatch_failed.load(Ordering::Relaxed),
            late_arrivals: self.late_arrivals.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = BridgeMetrics::default();
        metrics.record_dispatched();
        metrics.record_dispatched();
        metrics.record_late_arrival();
        let snap = metrics.snapshot();
        assert_eq!(snap.dispatched, 2);
        assert_eq!(snap.late_arrivals, 1);
        assert_eq!(snap.resolved, 0);
    }
}
