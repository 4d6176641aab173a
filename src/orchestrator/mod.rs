//! 任务编排：任务、会话、编排循环与过程事件

pub mod binding;
pub mod events;
pub mod loop_;
pub mod session;
pub mod task;

pub use binding::{bind_results, parse_reference};
pub use events::SessionEvent;
pub use loop_::{Orchestrator, OrchestratorConfig};
pub use session::{
    AbortReason, AttemptRef, Note, Plan, Session, SessionId, SessionReport, SkippedTask,
};
pub use task::{
    Action, InlineOp, Task, TaskId, TaskOrigin, TaskRecord, TaskResult, TaskStatus,
    TaskTransitionError, ToolCall,
};
