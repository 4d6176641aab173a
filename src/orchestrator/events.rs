//! 会话过程事件：供 CLI / 上层界面实时展示状态转换与任务结果

use serde::Serialize;
use serde_json::Value;

use crate::core::{LoopState, SessionStatus, ToolFailure};
use crate::orchestrator::session::SessionId;
use crate::orchestrator::task::{TaskId, TaskOrigin};

/// 单条会话事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        session: SessionId,
        from: LoopState,
        to: LoopState,
    },
    TaskStarted {
        task: TaskId,
        action: String,
        args: Value,
        origin: TaskOrigin,
    },
    /// 任务结束：成功时带载荷预览，失败时带失败详情
    TaskFinished {
        task: TaskId,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        preview: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<ToolFailure>,
    },
    ProposalRejected {
        proposal: String,
        reason: String,
        attempt: usize,
    },
    /// 回退动作（retry / substitute / give_up / exhausted）
    FallbackChosen {
        task: TaskId,
        action: String,
        detail: String,
    },
    Warning { text: String },
    Finished {
        session: SessionId,
        status: SessionStatus,
    },
}

/// 载荷预览，避免事件过长
pub fn preview(payload: &Value) -> String {
    let s = payload.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
