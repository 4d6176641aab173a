//! 错误分类
//!
//! - 注册期：SchemaError（工具被略过并记录警告）、RegistrationError（重名即失败）
//! - 调用期：ToolFailure（Argument / Execution / NotCompleted / UnknownTool），在 Registry 边界转为带标签结果
//! - 会话期：PlanningError（有界重试后终止会话）、DriverError（模型驱动往返失败）

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// 工具 Schema 编译错误：注册时发现，工具不会进入注册表
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid tool name: {0:?}")]
    InvalidName(String),

    #[error("Missing summary: tool {tool} has no description")]
    MissingSummary { tool: String },

    #[error("Missing annotation: {tool}.{param} has no type")]
    MissingAnnotation { tool: String, param: String },

    #[error("Undocumented parameter: {tool}.{param}")]
    UndocumentedParameter { tool: String, param: String },

    #[error("Stale documentation: {tool} documents {param}, which is not in its signature")]
    StaleDocumentation { tool: String, param: String },

    #[error("Unsupported type: {tool}.{param} is {type_name}")]
    UnsupportedType {
        tool: String,
        param: String,
        type_name: String,
    },

    #[error("Duplicate parameter: {tool}.{param}")]
    DuplicateParameter { tool: String, param: String },
}

/// 注册失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Duplicate tool: {0}")]
    Duplicate(String),
}

/// 单次调用失败的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 参数不满足描述符契约（缺必填、未知参数、类型不符）；工具未被调用
    Argument,
    /// 工具自身失败（外部 API 报错、超时、panic）
    Execution,
    /// 工具正常返回，但按其完成声明未达成目标（如 "user not found"）
    NotCompleted,
    /// 名称未注册
    UnknownTool,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Argument => "ArgumentError",
            FailureKind::Execution => "ExecutionError",
            FailureKind::NotCompleted => "NotCompleted",
            FailureKind::UnknownTool => "UnknownTool",
        };
        f.write_str(s)
    }
}

/// 带标签的失败结果：Err(kind, detail)
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{kind}: {detail}")]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// NotCompleted 时保留工具返回的载荷，供审计与回退决策
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            payload: None,
        }
    }

    pub fn argument(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Argument, detail)
    }

    pub fn execution(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Execution, detail)
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(FailureKind::UnknownTool, format!("Unknown tool: {name}"))
    }

    /// 工具返回了载荷，但未满足其完成规则
    pub fn not_completed(payload: Value) -> Self {
        let detail = match &payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            kind: FailureKind::NotCompleted,
            detail,
            payload: Some(payload),
        }
    }
}

/// 规划失败：会话因此终止
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanningError {
    #[error("Model proposed {attempts} consecutive unusable actions; last: {last_reason}")]
    RejectedProposals { attempts: usize, last_reason: String },

    #[error("Planning step limit ({limit}) reached")]
    StepLimit { limit: usize },
}

/// Model Driver 往返失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Unparseable model output: {0}")]
    Parse(String),
}
