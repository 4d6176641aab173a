//! Model Driver：外部语言模型作为纯粹的决策者，只在 Planning / Recovering 两处被询问
//!
//! - propose：根据会话历史与可用工具描述符提出下一步（工具调用或最终答复）
//! - recover：根据失败详情给出回退动作（重试 / 换工具 / 放弃）

pub mod llm;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::{DriverError, ToolFailure};
use crate::orchestrator::{Session, TaskId, ToolCall};
use crate::tools::ToolDescriptor;

pub use llm::LlmDriver;

/// 规划提案
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    Invoke(ToolCall),
    FinalAnswer(String),
}

/// 回退动作
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    /// 同一工具、调整后的参数
    Retry { args: Value },
    /// 换一个工具
    Substitute(ToolCall),
    /// 放弃该任务：任务标记 SkippedWithFallback，会话继续
    GiveUp { reason: String },
}

impl Fallback {
    pub fn describe(&self) -> String {
        match self {
            Fallback::Retry { args } => format!("retry with {args}"),
            Fallback::Substitute(call) => format!("substitute {} {}", call.tool, call.args),
            Fallback::GiveUp { reason } => format!("give up: {reason}"),
        }
    }
}

/// 交给 recover 的失败详情
#[derive(Debug, Clone, Serialize)]
pub struct FailureDetail {
    pub task_id: TaskId,
    /// 回退链所属的原始任务
    pub original: TaskId,
    pub action: String,
    pub args: Value,
    pub failure: ToolFailure,
    /// 若给出回退，这将是第几次（从 1 开始）
    pub attempt: u32,
    pub max_attempts: u32,
}

#[async_trait]
pub trait ModelDriver: Send + Sync {
    async fn propose(
        &self,
        session: &Session,
        tools: &[ToolDescriptor],
    ) -> Result<Proposal, DriverError>;

    async fn recover(
        &self,
        session: &Session,
        failure: &FailureDetail,
    ) -> Result<Fallback, DriverError>;
}
