//! 编排状态：循环所处阶段与会话终态
//!
//! Planning → Dispatched → Evaluating → (Advancing | Recovering) → Completed / Aborted

use std::fmt;

use serde::Serialize;

/// 编排循环阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// 取下一步：固定计划出队，或询问 Model Driver
    Planning,
    /// 已交给 Registry 执行
    Dispatched,
    /// 根据带标签结果判定任务状态
    Evaluating,
    /// 任务完成或被跳过，推进计划
    Advancing,
    /// 任务失败，向 Model Driver 询问回退动作
    Recovering,
    Completed,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Completed | LoopState::Aborted)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Planning => "planning",
            LoopState::Dispatched => "dispatched",
            LoopState::Evaluating => "evaluating",
            LoopState::Advancing => "advancing",
            LoopState::Recovering => "recovering",
            LoopState::Completed => "completed",
            LoopState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// 会话终态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Aborted,
}

impl From<SessionStatus> for LoopState {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Completed => LoopState::Completed,
            SessionStatus::Aborted => LoopState::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LoopState::Completed.is_terminal());
        assert!(LoopState::Aborted.is_terminal());
        assert!(!LoopState::Recovering.is_terminal());
        assert_eq!(LoopState::from(SessionStatus::Aborted), LoopState::Aborted);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LoopState::Dispatched).unwrap(),
            "\"dispatched\""
        );
    }
}
