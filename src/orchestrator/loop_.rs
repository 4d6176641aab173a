//! 任务编排循环
//!
//! 状态机：Planning → Dispatched → Evaluating → (Advancing | Recovering) → Completed | Aborted。
//! 每个会话单线程推进，同一时刻至多一个任务处于 Running；模型只在 Planning 与 Recovering 时被询问。
//! 取消是协作式的：在 Planning 前、派发前、调用返回后检查，不打断进行中的调用。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{LoopState, PlanningError, RecoveryEngine, SessionStatus, ToolFailure};
use crate::driver::{FailureDetail, Fallback, ModelDriver, Proposal};
use crate::orchestrator::binding;
use crate::orchestrator::events::{preview, SessionEvent};
use crate::orchestrator::session::{AbortReason, Note, Plan, Session, SessionReport};
use crate::orchestrator::task::{Action, TaskId};
use crate::tools::ToolRegistry;

/// 编排配置（`[orchestrator]`）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// 每个原始任务允许的回退次数
    pub max_fallback_attempts: u32,
    /// 连续被拒绝的提案之后允许的重新提示次数
    pub max_replans: usize,
    /// 动态计划的规划轮数上限
    pub max_steps: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_fallback_attempts: 3,
            max_replans: 1,
            max_steps: 20,
        }
    }
}

/// 编排器：可在多个 tokio 任务上并发运行互不相关的会话
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    driver: Arc<dyn ModelDriver>,
    config: OrchestratorConfig,
    event_tx: Option<UnboundedSender<SessionEvent>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ToolRegistry>, driver: Arc<dyn ModelDriver>) -> Self {
        Self {
            registry,
            driver,
            config: OrchestratorConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// 运行一个会话直至终态；任何调用期失败都不会越过循环
    pub async fn run(&self, plan: Plan, cancel: &CancellationToken) -> SessionReport {
        let mut run = SessionRun {
            orch: self,
            session: Session::new(plan),
            recovery: RecoveryEngine::new(&self.config),
            planning_rounds: 0,
        };
        tracing::info!(
            session = %run.session.id(),
            dynamic = run.session.is_dynamic(),
            "Session started"
        );

        let (status, reason) = match run.drive(cancel).await {
            Ok(()) => (SessionStatus::Completed, None),
            Err(reason) => (SessionStatus::Aborted, Some(reason)),
        };
        run.transition(status.into());

        match &reason {
            None => tracing::info!(
                session = %run.session.id(),
                tasks = run.session.tasks().len(),
                warnings = run.session.warnings().len(),
                "Session completed"
            ),
            Some(r) => tracing::warn!(session = %run.session.id(), reason = %r, "Session aborted"),
        }
        self.emit(SessionEvent::Finished {
            session: run.session.id(),
            status,
        });
        run.session.report(status, reason)
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// 单个会话的可变状态
struct SessionRun<'a> {
    orch: &'a Orchestrator,
    session: Session,
    recovery: RecoveryEngine,
    planning_rounds: usize,
}

impl SessionRun<'_> {
    fn transition(&mut self, to: LoopState) {
        let from = self.session.state();
        if from == to {
            return;
        }
        tracing::debug!(session = %self.session.id(), from = %from, to = %to, "State transition");
        self.session.set_state(to);
        self.orch.emit(SessionEvent::StateChanged {
            session: self.session.id(),
            from,
            to,
        });
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<(), AbortReason> {
        loop {
            if cancel.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            self.transition(LoopState::Planning);

            let task_id = match self.session.next_task() {
                Some(id) => id,
                None if !self.session.is_dynamic() => return Ok(()),
                None => match self.plan_next(cancel).await? {
                    Some(id) => id,
                    None => return Ok(()),
                },
            };

            if cancel.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            let result = self.dispatch(task_id).await;

            let completed = self.evaluate(task_id, result);
            if cancel.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            if !completed {
                self.recover(task_id).await;
            }
            self.transition(LoopState::Advancing);
        }
    }

    /// 询问 Model Driver 下一步；被拒绝的提案带原因重新提示，超出预算则终止会话
    async fn plan_next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<TaskId>, AbortReason> {
        let tools = self.orch.registry.descriptors();
        loop {
            let limit = self.orch.config.max_steps;
            if self.planning_rounds >= limit {
                return Err(AbortReason::Planning(PlanningError::StepLimit { limit }));
            }
            self.planning_rounds += 1;

            let proposed = self.orch.driver.propose(&self.session, &tools).await;
            // 往返期间被取消：提案不入队，报告中不出现未派发的任务
            if cancel.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            let (proposal, reason) = match proposed {
                Ok(Proposal::FinalAnswer(answer)) => {
                    tracing::info!(session = %self.session.id(), "Final answer received");
                    self.recovery.accept();
                    self.session.set_final_answer(answer);
                    return Ok(None);
                }
                Ok(Proposal::Invoke(call)) if self.orch.registry.contains(&call.tool) => {
                    tracing::debug!(session = %self.session.id(), tool = %call.tool, "Proposal accepted");
                    self.recovery.accept();
                    self.session.enqueue(Action::Tool(call));
                    return Ok(self.session.next_task());
                }
                Ok(Proposal::Invoke(call)) => {
                    let reason = ToolFailure::unknown_tool(&call.tool).detail;
                    (call.tool, reason)
                }
                Err(e) => ("(driver error)".to_string(), e.to_string()),
            };

            let can_retry = self.recovery.reject();
            let attempts = self.recovery.rejections();
            tracing::warn!(
                session = %self.session.id(),
                proposal = %proposal,
                reason = %reason,
                attempts,
                "Proposal rejected"
            );
            self.orch.emit(SessionEvent::ProposalRejected {
                proposal: proposal.clone(),
                reason: reason.clone(),
                attempt: attempts,
            });
            self.session.note(Note::Rejected {
                proposal,
                reason: reason.clone(),
            });

            if !can_retry {
                return Err(AbortReason::Planning(PlanningError::RejectedProposals {
                    attempts,
                    last_reason: reason,
                }));
            }
            if cancel.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
        }
    }

    /// 派发任务：工具经注册表 resolve，内联操作经同一执行器保护并按其完成规则判定
    async fn dispatch(&mut self, task_id: TaskId) -> Result<Value, ToolFailure> {
        self.transition(LoopState::Dispatched);
        let Some(task) = self.session.task_mut(task_id) else {
            return Err(ToolFailure::execution(format!("Task {task_id} not found")));
        };
        if let Err(e) = task.start() {
            return Err(ToolFailure::execution(e.to_string()));
        }
        let action = task.action.clone();
        let origin = task.origin;

        tracing::info!(session = %self.session.id(), task_id = %task_id, action = %action.label(), "Task dispatched");
        self.orch.emit(SessionEvent::TaskStarted {
            task: task_id,
            action: action.label(),
            args: action.args(),
            origin,
        });

        match &action {
            Action::Tool(call) => {
                let args = if binding::has_references(&call.args) {
                    let bound = binding::bind_results(&call.args, &|step| {
                        self.session.step_result(step).cloned()
                    })
                    .map_err(ToolFailure::argument)?;
                    tracing::debug!(task_id = %task_id, args = %bound, "Result references bound");
                    bound
                } else {
                    call.args.clone()
                };
                self.orch.registry.resolve(&call.tool, args).await
            }
            Action::Inline(op) => {
                let payload = self
                    .orch
                    .registry
                    .executor()
                    .run(&action.label(), &Value::Null, op.invoke())
                    .await?;
                if op.completion.is_met(&payload) {
                    Ok(payload)
                } else {
                    Err(ToolFailure::not_completed(payload))
                }
            }
        }
    }

    /// 按带标签结果设置任务终态；返回是否完成
    fn evaluate(&mut self, task_id: TaskId, result: Result<Value, ToolFailure>) -> bool {
        self.transition(LoopState::Evaluating);
        let session_id = self.session.id();
        let Some(task) = self.session.task_mut(task_id) else {
            return false;
        };
        let action = task.label();
        let args = task.action.args();

        let (completed, note, event) = match result {
            Ok(payload) => {
                if let Err(e) = task.complete(payload.clone()) {
                    tracing::error!(session = %session_id, error = %e, "Task transition rejected");
                }
                tracing::info!(session = %session_id, task_id = %task_id, action = %action, "Task completed");
                let event = SessionEvent::TaskFinished {
                    task: task_id,
                    ok: true,
                    preview: Some(preview(&payload)),
                    failure: None,
                };
                let note = Note::Completed {
                    task: task_id,
                    action,
                    payload,
                };
                (true, note, event)
            }
            Err(failure) => {
                if let Err(e) = task.fail(failure.clone()) {
                    tracing::error!(session = %session_id, error = %e, "Task transition rejected");
                }
                tracing::warn!(
                    session = %session_id,
                    task_id = %task_id,
                    action = %action,
                    failure = %failure,
                    "Task failed"
                );
                let event = SessionEvent::TaskFinished {
                    task: task_id,
                    ok: false,
                    preview: None,
                    failure: Some(failure.clone()),
                };
                let note = Note::Failed {
                    task: task_id,
                    action,
                    args,
                    failure,
                };
                (false, note, event)
            }
        };
        self.session.note(note);
        self.orch.emit(event);
        completed
    }

    /// 失败任务的恢复：在预算内询问回退动作，否则跳过并记录警告
    async fn recover(&mut self, task_id: TaskId) {
        self.transition(LoopState::Recovering);
        let Some(task) = self.session.task(task_id) else {
            return;
        };
        let original = task.original();
        let action = task.action.clone();
        let failure = task
            .failure()
            .cloned()
            .unwrap_or_else(|| ToolFailure::execution("missing failure detail"));

        let max_attempts = self.recovery.max_fallback_attempts();
        let Some(attempt) = self.recovery.next_fallback_attempt(original) else {
            self.skip(
                task_id,
                "exhausted",
                format!(
                    "Task {original} ({}) skipped: {max_attempts} fallback attempts exhausted",
                    self.chain_label(original)
                ),
            );
            return;
        };

        let detail = FailureDetail {
            task_id,
            original,
            action: action.label(),
            args: action.args(),
            failure,
            attempt,
            max_attempts,
        };
        let fallback = match self.orch.driver.recover(&self.session, &detail).await {
            Ok(f) => f,
            Err(e) => {
                self.skip(
                    task_id,
                    "driver_error",
                    format!(
                        "Task {original} ({}) skipped: recovery failed: {e}",
                        self.chain_label(original)
                    ),
                );
                return;
            }
        };

        let next = match (&fallback, &action) {
            (Fallback::GiveUp { reason }, _) => {
                self.skip(
                    task_id,
                    "give_up",
                    format!(
                        "Task {original} ({}) given up: {reason}",
                        self.chain_label(original)
                    ),
                );
                return;
            }
            (Fallback::Retry { .. }, Action::Inline(op)) => {
                self.skip(
                    task_id,
                    "give_up",
                    format!(
                        "Task {original} ({}) given up: inline operation '{}' cannot be retried",
                        self.chain_label(original),
                        op.label
                    ),
                );
                return;
            }
            (Fallback::Retry { args }, Action::Tool(call)) => Action::tool(call.tool.clone(), args.clone()),
            (Fallback::Substitute(call), _) => Action::Tool(call.clone()),
        };

        let choice = fallback.describe();
        tracing::info!(
            session = %self.session.id(),
            task_id = %task_id,
            attempt,
            fallback = %choice,
            "Fallback scheduled"
        );
        self.orch.emit(SessionEvent::FallbackChosen {
            task: task_id,
            action: match fallback {
                Fallback::Retry { .. } => "retry".to_string(),
                _ => "substitute".to_string(),
            },
            detail: choice.clone(),
        });
        self.session.note(Note::Fallback {
            task: task_id,
            choice,
        });
        self.session.enqueue_fallback(next, original, attempt);
    }

    fn chain_label(&self, original: TaskId) -> String {
        self.session
            .task(original)
            .map(|t| t.label())
            .unwrap_or_default()
    }

    /// Failed → SkippedWithFallback，并记录会话级警告
    fn skip(&mut self, task_id: TaskId, kind: &str, warning: String) {
        if let Some(task) = self.session.task_mut(task_id) {
            if let Err(e) = task.skip() {
                tracing::error!(session = %self.session.id(), error = %e, "Task transition rejected");
                return;
            }
        }
        tracing::warn!(session = %self.session.id(), task_id = %task_id, "{warning}");
        self.orch.emit(SessionEvent::FallbackChosen {
            task: task_id,
            action: kind.to_string(),
            detail: warning.clone(),
        });
        self.orch.emit(SessionEvent::Warning {
            text: warning.clone(),
        });
        self.session.note(Note::Skipped {
            task: task_id,
            reason: warning.clone(),
        });
        self.session.warn(warning);
    }
}
