//! 恢复预算
//!
//! 两类有界重试：每个原始任务的回退次数（max_fallback_attempts），
//! 以及连续被拒绝的规划提案次数（max_replans，任一被接受的提案清零）。

use std::collections::HashMap;

use crate::orchestrator::{OrchestratorConfig, TaskId};

/// 单个会话的恢复预算，随会话创建，不跨会话共享
#[derive(Debug)]
pub struct RecoveryEngine {
    max_fallback_attempts: u32,
    max_replans: usize,
    fallbacks: HashMap<TaskId, u32>,
    rejections: usize,
}

impl RecoveryEngine {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            max_fallback_attempts: config.max_fallback_attempts,
            max_replans: config.max_replans,
            fallbacks: HashMap::new(),
            rejections: 0,
        }
    }

    pub fn max_fallback_attempts(&self) -> u32 {
        self.max_fallback_attempts
    }

    /// 为原始任务申请一次回退；返回本次回退的序号（从 1 开始），预算耗尽时返回 None
    pub fn next_fallback_attempt(&mut self, original: TaskId) -> Option<u32> {
        let used = self.fallbacks.entry(original).or_insert(0);
        if *used >= self.max_fallback_attempts {
            return None;
        }
        *used += 1;
        Some(*used)
    }

    /// 已为该原始任务消耗的回退次数
    pub fn fallbacks_used(&self, original: TaskId) -> u32 {
        self.fallbacks.get(&original).copied().unwrap_or(0)
    }

    /// 记录一次被拒绝的提案；仍可重新提示模型时返回 true
    pub fn reject(&mut self) -> bool {
        self.rejections += 1;
        self.rejections <= self.max_replans
    }

    /// 当前连续被拒绝的次数
    pub fn rejections(&self) -> usize {
        self.rejections
    }

    /// 提案被接受：清零连续拒绝计数
    pub fn accept(&mut self) {
        self.rejections = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(max_fallback_attempts: u32, max_replans: usize) -> RecoveryEngine {
        RecoveryEngine::new(&OrchestratorConfig {
            max_fallback_attempts,
            max_replans,
            ..OrchestratorConfig::default()
        })
    }

    #[test]
    fn test_fallback_budget_is_per_original_task() {
        let mut engine = engine(2, 1);
        let a = TaskId::new(1);
        let b = TaskId::new(2);
        assert_eq!(engine.next_fallback_attempt(a), Some(1));
        assert_eq!(engine.next_fallback_attempt(a), Some(2));
        assert_eq!(engine.next_fallback_attempt(a), None);
        assert_eq!(engine.fallbacks_used(a), 2);
        assert_eq!(engine.next_fallback_attempt(b), Some(1));
    }

    #[test]
    fn test_zero_fallback_budget() {
        let mut engine = engine(0, 1);
        assert_eq!(engine.next_fallback_attempt(TaskId::new(1)), None);
    }

    #[test]
    fn test_default_allows_one_reprompt() {
        let mut engine = engine(3, 1);
        assert!(engine.reject());
        assert!(!engine.reject());
        assert_eq!(engine.rejections(), 2);
    }

    #[test]
    fn test_accept_resets_consecutive_rejections() {
        let mut engine = engine(3, 1);
        assert!(engine.reject());
        engine.accept();
        assert!(engine.reject());
        assert_eq!(engine.rejections(), 1);
    }
}
