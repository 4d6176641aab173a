//! 编排会话：执行历史 + 待执行计划 + 会话记录
//!
//! 一个会话只被一个循环实例使用，不存在并发修改。

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::{LoopState, PlanningError, SessionStatus, ToolFailure};
use crate::orchestrator::task::{Action, Task, TaskId, TaskOrigin, TaskRecord, TaskStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 计划输入
#[derive(Clone, Debug)]
pub enum Plan {
    /// 固定的有序动作列表；Model Driver 只在恢复时被询问
    Fixed(Vec<Action>),
    /// 开放目标，由 Model Driver 逐步分解；seed 中的动作先执行
    Goal { goal: String, seed: Vec<Action> },
}

impl Plan {
    pub fn fixed(actions: impl IntoIterator<Item = Action>) -> Self {
        Plan::Fixed(actions.into_iter().collect())
    }

    pub fn goal(goal: impl Into<String>) -> Self {
        Plan::Goal {
            goal: goal.into(),
            seed: Vec::new(),
        }
    }

    pub fn seeded(goal: impl Into<String>, seed: impl IntoIterator<Item = Action>) -> Self {
        Plan::Goal {
            goal: goal.into(),
            seed: seed.into_iter().collect(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Plan::Goal { .. })
    }
}

/// 会话记录条目，按发生顺序保存，作为 Model Driver 的上下文
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Note {
    /// 提案被拒绝（未注册的工具、驱动错误）
    Rejected { proposal: String, reason: String },
    Completed {
        task: TaskId,
        action: String,
        payload: Value,
    },
    Failed {
        task: TaskId,
        action: String,
        args: Value,
        failure: ToolFailure,
    },
    /// 选定的回退动作
    Fallback { task: TaskId, choice: String },
    Skipped { task: TaskId, reason: String },
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::Rejected { proposal, reason } => {
                write!(f, "Proposal {proposal} was rejected: {reason}")
            }
            Note::Completed {
                task,
                action,
                payload,
            } => write!(f, "Task {task} ({action}) completed: {payload}"),
            Note::Failed {
                task,
                action,
                args,
                failure,
            } => write!(f, "Task {task} ({action} {args}) failed with {failure}"),
            Note::Fallback { task, choice } => write!(f, "Fallback for task {task}: {choice}"),
            Note::Skipped { task, reason } => write!(f, "Task {task} skipped: {reason}"),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    goal: Option<String>,
    dynamic: bool,
    tasks: Vec<Task>,
    /// 计划步骤 → 原始任务，供结果引用查找
    steps: Vec<TaskId>,
    pending: VecDeque<(Action, TaskOrigin)>,
    notes: Vec<Note>,
    warnings: Vec<String>,
    state: LoopState,
    final_answer: Option<String>,
    next_seq: u64,
}

impl Session {
    pub fn new(plan: Plan) -> Self {
        let (goal, dynamic, actions) = match plan {
            Plan::Fixed(actions) => (None, false, actions),
            Plan::Goal { goal, seed } => (Some(goal), true, seed),
        };
        Self {
            id: SessionId::new(),
            goal,
            dynamic,
            tasks: Vec::new(),
            steps: Vec::new(),
            pending: actions
                .into_iter()
                .map(|a| (a, TaskOrigin::Planned))
                .collect(),
            notes: Vec::new(),
            warnings: Vec::new(),
            state: LoopState::Planning,
            final_answer: None,
            next_seq: 1,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// 已执行（或正在执行）的任务，按派发顺序
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// 第 `step` 个计划步骤（从 1 开始）的载荷：取其回退链中完成的任务
    pub fn step_result(&self, step: usize) -> Option<&Value> {
        let original = *self.steps.get(step.checked_sub(1)?)?;
        self.chain(original)
            .find(|t| t.status() == TaskStatus::Completed)
            .and_then(Task::payload)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Action> {
        self.pending.iter().map(|(a, _)| a)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub(crate) fn set_state(&mut self, state: LoopState) {
        self.state = state;
    }

    pub(crate) fn note(&mut self, note: Note) {
        self.notes.push(note);
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn set_final_answer(&mut self, answer: String) {
        self.final_answer = Some(answer);
    }

    /// 回退任务插到队首，先于后续计划执行
    pub(crate) fn enqueue_fallback(&mut self, action: Action, of: TaskId, attempt: u32) {
        self.pending
            .push_front((action, TaskOrigin::Fallback { of, attempt }));
    }

    pub(crate) fn enqueue(&mut self, action: Action) {
        self.pending.push_back((action, TaskOrigin::Planned));
    }

    /// 取出下一个待执行动作并建为 Pending 任务
    pub(crate) fn next_task(&mut self) -> Option<TaskId> {
        let (action, origin) = self.pending.pop_front()?;
        let id = TaskId::new(self.next_seq);
        self.next_seq += 1;
        if origin == TaskOrigin::Planned {
            self.steps.push(id);
        }
        self.tasks.push(Task::new(id, action, origin));
        Some(id)
    }

    /// 原始任务及其全部回退任务
    pub fn chain(&self, original: TaskId) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.original() == original)
    }

    /// 最后一个被派发的任务
    pub fn last_attempted(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .rev()
            .find(|t| t.status() != TaskStatus::Pending)
    }

    pub fn report(&self, status: SessionStatus, abort_reason: Option<AbortReason>) -> SessionReport {
        let skipped = self
            .tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::SkippedWithFallback)
            .map(|t| {
                let original = t.original();
                SkippedTask {
                    task_id: original,
                    action: self
                        .task(original)
                        .map(Task::label)
                        .unwrap_or_else(|| t.label()),
                    failures: self
                        .chain(original)
                        .filter_map(|c| c.failure().cloned())
                        .collect(),
                }
            })
            .collect();

        SessionReport {
            session_id: self.id,
            goal: self.goal.clone(),
            status,
            abort_reason,
            last_attempted: self.last_attempted().map(|t| AttemptRef {
                task_id: t.id,
                action: t.label(),
            }),
            tasks: self.tasks.iter().map(Task::record).collect(),
            skipped,
            pending: self.pending().map(Action::label).collect(),
            warnings: self.warnings.clone(),
            final_answer: self.final_answer.clone(),
        }
    }
}

/// 会话终止原因
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    Planning(PlanningError),
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Planning(e) => write!(f, "{e}"),
            AbortReason::Cancelled => f.write_str("Cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttemptRef {
    pub task_id: TaskId,
    pub action: String,
}

/// 被跳过的原始任务及其回退链上的全部失败详情（按发生顺序）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedTask {
    pub task_id: TaskId,
    pub action: String,
    pub failures: Vec<ToolFailure>,
}

/// 会话报告：Completed 时用于审计完整历史，Aborted 时说明最后尝试的任务与被跳过任务的失败详情
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    pub last_attempted: Option<AttemptRef>,
    pub tasks: Vec<TaskRecord>,
    pub skipped: Vec<SkippedTask>,
    /// 未执行的计划动作
    pub pending: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

impl SessionReport {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn task(&self, id: u64) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id.value() == id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fixed_plan_tasks_are_created_on_dispatch() {
        let mut session = Session::new(Plan::fixed([
            Action::tool("list_files", json!({"folder": "/tmp/x"})),
            Action::tool("copy_file", json!({})),
        ]));
        assert!(!session.is_dynamic());
        assert!(session.tasks().is_empty());
        assert_eq!(session.pending().count(), 2);

        let id = session.next_task().unwrap();
        assert_eq!(id, TaskId::new(1));
        assert_eq!(session.task(id).unwrap().status(), TaskStatus::Pending);
        assert_eq!(session.pending().count(), 1);
    }

    #[test]
    fn test_fallback_runs_before_rest_of_plan() {
        let mut session = Session::new(Plan::fixed([
            Action::tool("a", json!({})),
            Action::tool("b", json!({})),
        ]));
        let first = session.next_task().unwrap();
        session.enqueue_fallback(Action::tool("a2", json!({})), first, 1);
        let next = session.next_task().unwrap();
        let task = session.task(next).unwrap();
        assert_eq!(task.label(), "a2");
        assert_eq!(task.original(), first);
    }

    #[test]
    fn test_report_collects_skipped_chain() {
        let mut session = Session::new(Plan::fixed([Action::tool("get_user", json!({}))]));
        let first = session.next_task().unwrap();
        let t = session.task_mut(first).unwrap();
        t.start().unwrap();
        t.fail(ToolFailure::not_completed(json!("Couldn't find a user")))
            .unwrap();

        session.enqueue_fallback(Action::tool("get_user", json!({"key": "phone"})), first, 1);
        let second = session.next_task().unwrap();
        let t = session.task_mut(second).unwrap();
        t.start().unwrap();
        t.fail(ToolFailure::execution("timeout")).unwrap();
        t.skip().unwrap();
        session.warn("gave up");

        let report = session.report(SessionStatus::Completed, None);
        assert_eq!(report.tasks.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].task_id, first);
        assert_eq!(report.skipped[0].failures.len(), 2);
        assert_eq!(report.last_attempted.as_ref().unwrap().task_id, second);
        assert_eq!(report.warnings, vec!["gave up"]);
    }

    #[test]
    fn test_report_serializes_abort_reason() {
        let session = Session::new(Plan::goal("organize downloads"));
        let report = session.report(
            SessionStatus::Aborted,
            Some(AbortReason::Planning(PlanningError::StepLimit { limit: 3 })),
        );
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["status"], "aborted");
        assert_eq!(v["abort_reason"]["reason"], "planning");
        assert_eq!(v["abort_reason"]["detail"]["type"], "step_limit");
        assert_eq!(v["goal"], "organize downloads");
        assert!(v["last_attempted"].is_null());
    }

    #[test]
    fn test_note_display() {
        let note = Note::Rejected {
            proposal: "send_fax".into(),
            reason: "Unknown tool: send_fax".into(),
        };
        assert_eq!(
            note.to_string(),
            "Proposal send_fax was rejected: Unknown tool: send_fax"
        );
    }
}
