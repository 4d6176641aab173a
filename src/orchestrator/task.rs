//! 任务：编排的最小单元
//!
//! 生命周期：Pending → Running → Completed | Failed，终态只设置一次；
//! 唯一允许离开终态的转换是 Failed → SkippedWithFallback（放弃或回退预算耗尽）。
//! 失败任务可派生新的回退任务，但原任务不会回到 Pending。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::ToolFailure;
use crate::tools::Completion;

/// 任务 ID：会话内的递增序号
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    SkippedWithFallback,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::SkippedWithFallback
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::SkippedWithFallback => "skipped_with_fallback",
        };
        f.write_str(s)
    }
}

/// 任务来源：计划内，或某原始任务的第 n 次回退
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOrigin {
    Planned,
    Fallback { of: TaskId, attempt: u32 },
}

/// 工具调用：已注册的工具名 + 参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

type InlineFn = dyn Fn() -> BoxFuture<'static, Result<Value, String>> + Send + Sync;

/// 内联操作：不经注册表的异步闭包，与工具调用走同样的判定与恢复逻辑
#[derive(Clone)]
pub struct InlineOp {
    pub label: String,
    pub completion: Completion,
    run: Arc<InlineFn>,
}

impl InlineOp {
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            label: label.into(),
            completion: Completion::OnSuccess,
            run: Arc::new(move || f().boxed()),
        }
    }

    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    pub fn invoke(&self) -> BoxFuture<'static, Result<Value, String>> {
        (self.run)()
    }
}

impl fmt::Debug for InlineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineOp")
            .field("label", &self.label)
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}

/// 任务动作
#[derive(Clone, Debug)]
pub enum Action {
    Tool(ToolCall),
    Inline(InlineOp),
}

impl Action {
    pub fn tool(name: impl Into<String>, args: Value) -> Self {
        Action::Tool(ToolCall::new(name, args))
    }

    pub fn inline<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Action::Inline(InlineOp::new(label, f))
    }

    /// 报告与日志中使用的名称
    pub fn label(&self) -> String {
        match self {
            Action::Tool(call) => call.tool.clone(),
            Action::Inline(op) => format!("inline:{}", op.label),
        }
    }

    pub fn tool_call(&self) -> Option<&ToolCall> {
        match self {
            Action::Tool(call) => Some(call),
            Action::Inline(_) => None,
        }
    }

    pub fn args(&self) -> Value {
        match self {
            Action::Tool(call) => call.args.clone(),
            Action::Inline(_) => Value::Null,
        }
    }
}

impl From<ToolCall> for Action {
    fn from(call: ToolCall) -> Self {
        Action::Tool(call)
    }
}

/// 任务结果：成功载荷或失败详情
#[derive(Clone, Debug, PartialEq)]
pub enum TaskResult {
    Payload(Value),
    Failure(ToolFailure),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Task {task}: illegal transition {from} -> {to}")]
pub struct TaskTransitionError {
    pub task: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub action: Action,
    pub origin: TaskOrigin,
    status: TaskStatus,
    result: Option<TaskResult>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, action: Action, origin: TaskOrigin) -> Self {
        Self {
            id,
            action,
            origin,
            status: TaskStatus::Pending,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match &self.result {
            Some(TaskResult::Failure(f)) => Some(f),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.result {
            Some(TaskResult::Payload(v)) => Some(v),
            _ => None,
        }
    }

    /// 回退链所属的原始任务
    pub fn original(&self) -> TaskId {
        match self.origin {
            TaskOrigin::Planned => self.id,
            TaskOrigin::Fallback { of, .. } => of,
        }
    }

    pub fn label(&self) -> String {
        self.action.label()
    }

    fn transition(&mut self, from: TaskStatus, to: TaskStatus) -> Result<(), TaskTransitionError> {
        if self.status != from {
            return Err(TaskTransitionError {
                task: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Pending, TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, payload: Value) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Running, TaskStatus::Completed)?;
        self.result = Some(TaskResult::Payload(payload));
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, failure: ToolFailure) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Running, TaskStatus::Failed)?;
        self.result = Some(TaskResult::Failure(failure));
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Failed → SkippedWithFallback；失败详情保留
    pub fn skip(&mut self) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Failed, TaskStatus::SkippedWithFallback)
    }

    pub fn record(&self) -> TaskRecord {
        TaskRecord {
            id: self.id,
            action: self.label(),
            args: self.action.tool_call().map(|c| c.args.clone()),
            origin: self.origin,
            status: self.status,
            payload: self.payload().cloned(),
            failure: self.failure().cloned(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// 任务的可序列化快照（审计用）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    pub origin: TaskOrigin,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ToolFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn task() -> Task {
        Task::new(
            TaskId::new(1),
            Action::tool("list_files", json!({"folder": "/tmp/x"})),
            TaskOrigin::Planned,
        )
    }

    #[test]
    fn test_happy_path() {
        let mut t = task();
        assert_eq!(t.status(), TaskStatus::Pending);
        t.start().unwrap();
        t.complete(json!({"files": []})).unwrap();
        assert_eq!(t.status(), TaskStatus::Completed);
        assert!(t.payload().is_some());
        let record = t.record();
        assert!(record.started_at.is_some() && record.finished_at.is_some());
    }

    #[test]
    fn test_terminal_status_is_set_once() {
        let mut t = task();
        t.start().unwrap();
        t.complete(json!(true)).unwrap();
        let err = t.fail(ToolFailure::execution("late")).unwrap_err();
        assert_eq!(err.from, TaskStatus::Completed);
        assert!(t.skip().is_err());
        assert!(t.start().is_err());
        assert_eq!(t.status(), TaskStatus::Completed);
    }

    #[test]
    fn test_failed_can_only_be_skipped() {
        let mut t = task();
        t.start().unwrap();
        t.fail(ToolFailure::execution("boom")).unwrap();
        assert!(t.complete(json!(true)).is_err());
        t.skip().unwrap();
        assert_eq!(t.status(), TaskStatus::SkippedWithFallback);
        assert_eq!(t.failure().unwrap().detail, "boom");
        assert!(t.skip().is_err());
    }

    #[test]
    fn test_fallback_origin_points_at_original() {
        let t = Task::new(
            TaskId::new(4),
            Action::tool("get_user", json!({})),
            TaskOrigin::Fallback {
                of: TaskId::new(2),
                attempt: 2,
            },
        );
        assert_eq!(t.original(), TaskId::new(2));
        assert_eq!(task().original(), TaskId::new(1));
    }

    #[tokio::test]
    async fn test_inline_action() {
        let action = Action::inline("greet", || async { Ok(json!("hello")) });
        assert_eq!(action.label(), "inline:greet");
        assert!(action.tool_call().is_none());
        let Action::Inline(op) = action else {
            panic!("expected inline");
        };
        assert_eq!(op.invoke().await.unwrap(), json!("hello"));
    }

    #[test]
    fn test_record_serializes() {
        let mut t = task();
        t.start().unwrap();
        t.fail(ToolFailure::argument("missing required parameter 'folder'"))
            .unwrap();
        let v = serde_json::to_value(t.record()).unwrap();
        assert_eq!(v["id"], 1);
        assert_eq!(v["status"], "failed");
        assert_eq!(v["origin"]["kind"], "planned");
        assert_eq!(v["failure"]["kind"], "argument");
    }
}
