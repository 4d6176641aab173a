//! 基于 LlmClient 的 Model Driver
//!
//! system prompt 列出按供应商渲染的工具 schema 与回复格式（schemars 生成）；
//! 会话记录作为上下文回放；输出解析接受 ```json 代码块或最外层 `{...}`。

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::core::DriverError;
use crate::driver::{FailureDetail, Fallback, ModelDriver, Proposal};
use crate::llm::{LlmClient, Message};
use crate::orchestrator::{Session, ToolCall};
use crate::tools::{Provider, ToolDescriptor};

/// 规划回复：`{"tool": name, "args": {...}}` 或 `{"answer": text}`
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
enum PlanReply {
    Call {
        /// Name of a registered tool
        tool: String,
        /// Arguments matching the tool's parameters
        #[serde(default)]
        args: Value,
    },
    Answer {
        /// Final answer once the goal is reached
        answer: String,
    },
}

/// 恢复回复
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RecoveryReply {
    /// Run the failed tool again with adjusted arguments
    Retry {
        #[serde(default)]
        args: Value,
    },
    /// Run a different registered tool instead
    Substitute {
        tool: String,
        #[serde(default)]
        args: Value,
    },
    /// Skip the failed task and move on
    #[serde(alias = "giveUp", alias = "giveup")]
    GiveUp {
        #[serde(default)]
        reason: String,
    },
}

fn schema_json<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default()
}

pub struct LlmDriver {
    llm: Arc<dyn LlmClient>,
    provider: Provider,
    /// recover 时展示的可替换工具
    catalog: Vec<ToolDescriptor>,
    request_timeout: Option<Duration>,
}

impl LlmDriver {
    pub fn new(llm: Arc<dyn LlmClient>, provider: Provider) -> Self {
        Self {
            llm,
            provider,
            catalog: Vec::new(),
            request_timeout: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Vec<ToolDescriptor>) -> Self {
        self.catalog = catalog;
        self
    }

    /// `secs == 0` 不限时
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    fn tools_section(&self, tools: &[ToolDescriptor]) -> String {
        let rendered = self.provider.render_all(tools);
        serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| "[]".to_string())
    }

    fn planning_prompt(&self, tools: &[ToolDescriptor]) -> String {
        format!(
            "You are a task orchestrator. Reach the user's goal by calling one tool at a time.\n\n\
             Available tools ({provider} format):\n{tools}\n\n\
             Reply with exactly one JSON object matching this schema:\n{schema}\n\n\
             Use {{\"tool\": ..., \"args\": {{...}}}} to call a tool, or {{\"answer\": ...}} when the goal is reached. \
             Only call tools listed above.",
            provider = self.provider,
            tools = self.tools_section(tools),
            schema = schema_json::<PlanReply>(),
        )
    }

    fn recovery_prompt(&self) -> String {
        format!(
            "You are a task orchestrator recovering from a failed task.\n\n\
             Available tools ({provider} format):\n{tools}\n\n\
             Reply with exactly one JSON object matching this schema:\n{schema}\n\n\
             Choose \"retry\" to run the same tool with adjusted args, \"substitute\" to use another tool, \
             or \"give_up\" to skip the task.",
            provider = self.provider,
            tools = self.tools_section(&self.catalog),
            schema = schema_json::<RecoveryReply>(),
        )
    }

    async fn ask(&self, messages: &[Message]) -> Result<String, DriverError> {
        let call = self.llm.complete(messages);
        let reply = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                DriverError::Llm(format!("request timed out after {}s", limit.as_secs()))
            })?,
            None => call.await,
        };
        reply.map_err(DriverError::Llm)
    }
}

/// 会话记录：目标 + 按顺序的记录条目
fn transcript(session: &Session) -> String {
    let mut out = String::new();
    match session.goal() {
        Some(goal) => {
            let _ = writeln!(out, "Goal: {goal}");
        }
        None => out.push_str("Working through a fixed plan.\n"),
    }
    if session.notes().is_empty() {
        out.push_str("Nothing has been done yet.\n");
    } else {
        out.push_str("History:\n");
        for (i, note) in session.notes().iter().enumerate() {
            let _ = writeln!(out, "{}. {note}", i + 1);
        }
    }
    out
}

#[async_trait]
impl ModelDriver for LlmDriver {
    async fn propose(
        &self,
        session: &Session,
        tools: &[ToolDescriptor],
    ) -> Result<Proposal, DriverError> {
        let messages = [
            Message::system(self.planning_prompt(tools)),
            Message::user(format!("{}\nWhat is the next step?", transcript(session))),
        ];
        let output = self.ask(&messages).await?;
        tracing::debug!(session = %session.id(), output = %output, "Planning reply");
        parse_proposal(&output)
    }

    async fn recover(
        &self,
        session: &Session,
        failure: &FailureDetail,
    ) -> Result<Fallback, DriverError> {
        let detail = serde_json::to_string_pretty(failure).unwrap_or_default();
        let messages = [
            Message::system(self.recovery_prompt()),
            Message::user(format!(
                "{}\nThis task failed (fallback attempt {} of {}):\n{detail}\nHow should we recover?",
                transcript(session),
                failure.attempt,
                failure.max_attempts,
            )),
        ];
        let output = self.ask(&messages).await?;
        tracing::debug!(session = %session.id(), output = %output, "Recovery reply");
        parse_fallback(&output)
    }
}

/// 提取 JSON：优先 ```json 代码块，其次最外层花括号；找不到返回 None
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析规划回复；纯文本视为最终答复
pub fn parse_proposal(output: &str) -> Result<Proposal, DriverError> {
    let Some(json_str) = extract_json(output) else {
        let text = output.trim();
        if text.is_empty() {
            return Err(DriverError::Parse("empty reply".to_string()));
        }
        return Ok(Proposal::FinalAnswer(text.to_string()));
    };

    let reply: PlanReply = serde_json::from_str(json_str)
        .map_err(|e| DriverError::Parse(format!("{e}: {json_str}")))?;
    match reply {
        PlanReply::Call { tool, .. } if tool.trim().is_empty() => {
            Err(DriverError::Parse(format!("empty tool name: {json_str}")))
        }
        PlanReply::Call { tool, args } => Ok(Proposal::Invoke(ToolCall::new(tool, args))),
        PlanReply::Answer { answer } => Ok(Proposal::FinalAnswer(answer)),
    }
}

/// 解析恢复回复
pub fn parse_fallback(output: &str) -> Result<Fallback, DriverError> {
    let json_str = extract_json(output)
        .ok_or_else(|| DriverError::Parse(format!("no JSON object in reply: {}", output.trim())))?;
    let reply: RecoveryReply = serde_json::from_str(json_str)
        .map_err(|e| DriverError::Parse(format!("{e}: {json_str}")))?;
    Ok(match reply {
        RecoveryReply::Retry { args } => Fallback::Retry { args },
        RecoveryReply::Substitute { tool, args } => Fallback::Substitute(ToolCall::new(tool, args)),
        RecoveryReply::GiveUp { reason } => Fallback::GiveUp { reason },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::{MockLlmClient, Role};
    use crate::orchestrator::Plan;
    use crate::tools::{ParamSpec, ParamType, ReturnKind, ReturnSpec};

    #[test]
    fn test_parse_bare_and_fenced_tool_call() {
        let p = parse_proposal(r#"{"tool": "list_files", "args": {"folder": "/tmp/x"}}"#).unwrap();
        assert_eq!(
            p,
            Proposal::Invoke(ToolCall::new("list_files", json!({"folder": "/tmp/x"})))
        );

        let p = parse_proposal(
            "I'll look at the folder first.\n```json\n{\"tool\": \"list_files\", \"args\": {\"folder\": \".\"}}\n```",
        )
        .unwrap();
        assert!(matches!(p, Proposal::Invoke(call) if call.tool == "list_files"));
    }

    #[test]
    fn test_parse_answer_and_plain_text() {
        assert_eq!(
            parse_proposal(r#"{"answer": "All files organized."}"#).unwrap(),
            Proposal::FinalAnswer("All files organized.".into())
        );
        assert_eq!(
            parse_proposal("Everything is done.").unwrap(),
            Proposal::FinalAnswer("Everything is done.".into())
        );
    }

    #[test]
    fn test_parse_missing_args_defaults_to_null() {
        let p = parse_proposal(r#"{"tool": "list_files"}"#).unwrap();
        assert_eq!(p, Proposal::Invoke(ToolCall::new("list_files", Value::Null)));
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(
            parse_proposal(r#"{"tool": "list_files", "args": {"folder": }}"#),
            Err(DriverError::Parse(_))
        ));
        assert!(matches!(
            parse_proposal(r#"{"tool": "", "args": {}}"#),
            Err(DriverError::Parse(_))
        ));
        assert!(matches!(parse_proposal("   "), Err(DriverError::Parse(_))));
    }

    #[test]
    fn test_parse_recovery_actions() {
        assert_eq!(
            parse_fallback(r#"{"action": "retry", "args": {"key": "phone"}}"#).unwrap(),
            Fallback::Retry {
                args: json!({"key": "phone"})
            }
        );
        assert_eq!(
            parse_fallback(r#"{"action": "substitute", "tool": "search_user", "args": {}}"#)
                .unwrap(),
            Fallback::Substitute(ToolCall::new("search_user", json!({})))
        );
        assert_eq!(
            parse_fallback(r#"{"action": "giveUp", "reason": "no such user"}"#).unwrap(),
            Fallback::GiveUp {
                reason: "no such user".into()
            }
        );
        assert!(matches!(
            parse_fallback(r#"{"action": "panic"}"#),
            Err(DriverError::Parse(_))
        ));
        assert!(matches!(
            parse_fallback("let's give up"),
            Err(DriverError::Parse(_))
        ));
    }

    fn list_files() -> ToolDescriptor {
        ToolDescriptor {
            name: "list_files".into(),
            description: "List all the files in a directory.".into(),
            parameters: vec![ParamSpec {
                name: "folder".into(),
                ty: ParamType::String,
                description: "Directory location".into(),
                required: true,
            }],
            returns: ReturnSpec {
                kind: ReturnKind::Structured,
                description: None,
            },
        }
    }

    #[tokio::test]
    async fn test_propose_sends_rendered_tools_and_goal() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"tool": "list_files", "args": {"folder": "/tmp/x"}}"#,
        ]));
        let driver = LlmDriver::new(llm.clone(), Provider::Gemini);
        let session = Session::new(Plan::goal("organize /tmp/x"));

        let proposal = driver.propose(&session, &[list_files()]).await.unwrap();
        assert!(matches!(proposal, Proposal::Invoke(_)));

        let request = llm.request(0).unwrap();
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains("\"list_files\""));
        assert!(request[0].content.contains("\"OBJECT\""));
        assert!(request[1].content.contains("Goal: organize /tmp/x"));
    }

    #[tokio::test]
    async fn test_llm_error_becomes_driver_error() {
        struct Down;

        #[async_trait]
        impl LlmClient for Down {
            async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
                Err("connection refused".to_string())
            }
        }

        let driver = LlmDriver::new(Arc::new(Down), Provider::OpenAi);
        let session = Session::new(Plan::goal("anything"));
        let err = driver.propose(&session, &[]).await.unwrap_err();
        assert_eq!(err, DriverError::Llm("connection refused".into()));
    }

    #[test]
    fn test_reply_schemas_are_generated() {
        assert!(schema_json::<PlanReply>().contains("answer"));
        assert!(schema_json::<RecoveryReply>().contains("give_up"));
    }
}
