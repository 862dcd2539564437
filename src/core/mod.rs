//! 核心关联层：ID 生成、待决注册表与响应路由、脚本模板、生命周期信号、脚本桥

pub mod bridge;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod pending;
pub mod registry;
pub mod script;

pub use bridge::{BridgeCleanup, ScriptBridge};
pub use error::BridgeError;
pub use id::{IdGenerator, IdStrategy, RequestId, SequentialIdGenerator, UuidIdGenerator};
pub use lifecycle::{
    run_with_graceful_shutdown, AppLifecycle, DocumentState, ShutdownCleanup, ShutdownCoordinator,
    ShutdownReason,
};
pub use pending::PendingScript;
pub use registry::{PendingRegistry, ResponseRouter, ResultSlot};
pub use script::{escape_single_quoted, CallbackNames, ScriptTemplate};
