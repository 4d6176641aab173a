//! 工具执行器
//!
//! 对每次调用施加超时并捕获 panic，结果统一映射为 ToolFailure（ExecutionError）；
//! 每次调用输出结构化审计日志（JSON）。内联操作与注册工具走同一条路径。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolFailure;

/// 默认单次调用超时（秒）
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ToolExecutor {
    /// None 表示不限时
    timeout: Option<Duration>,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT_SECS)
    }
}

enum Outcome {
    Ok(Value),
    Error(String),
    Panicked(String),
    TimedOut(Duration),
}

impl ToolExecutor {
    /// `timeout_secs == 0` 关闭超时
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// 在保护下运行一次调用；工具返回 Err、panic、超时都转为 ExecutionError
    pub async fn run<F>(&self, label: &str, args: &Value, call: F) -> Result<Value, ToolFailure>
    where
        F: Future<Output = Result<Value, String>> + Send,
    {
        let start = Instant::now();
        let guarded = AssertUnwindSafe(call).catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => match timeout(limit, guarded).await {
                Ok(r) => flatten(r),
                Err(_) => Outcome::TimedOut(limit),
            },
            None => flatten(guarded.await),
        };

        let (ok, kind) = match &outcome {
            Outcome::Ok(_) => (true, "ok"),
            Outcome::Error(_) => (false, "error"),
            Outcome::Panicked(_) => (false, "panic"),
            Outcome::TimedOut(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": label,
            "ok": ok,
            "outcome": kind,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "tool");

        match outcome {
            Outcome::Ok(v) => Ok(v),
            Outcome::Error(e) => Err(ToolFailure::execution(e)),
            Outcome::Panicked(msg) => Err(ToolFailure::execution(format!(
                "{label} panicked: {msg}"
            ))),
            Outcome::TimedOut(limit) => Err(ToolFailure::execution(format!(
                "{label} timed out after {}s",
                limit.as_secs_f64()
            ))),
        }
    }
}

fn flatten(result: Result<Result<Value, String>, Box<dyn Any + Send>>) -> Outcome {
    match result {
        Ok(Ok(v)) => Outcome::Ok(v),
        Ok(Err(e)) => Outcome::Error(e),
        Err(panic) => Outcome::Panicked(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
