//! 核心层：错误分类、编排状态、恢复预算、优雅关闭、组装构建器

pub mod builder;
pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use builder::{build_llm, default_tools, StewardBuilder};
pub use error::{
    DriverError, FailureKind, PlanningError, RegistrationError, SchemaError, ToolFailure,
};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{LoopState, SessionStatus};
