//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预设回复；回复用尽后返回最终答复 `{"answer": "done"}`，会话据此正常结束。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 回复用尽后的默认输出
pub const MOCK_FINAL_REPLY: &str = r#"{"answer": "done"}"#;

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    /// 每次调用收到的消息，供测试断言
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply.into());
        }
    }

    /// 已收到的请求数
    pub fn calls(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 第 n 次请求的消息
    pub fn request(&self, n: usize) -> Option<Vec<Message>> {
        self.seen.lock().ok().and_then(|s| s.get(n).cloned())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        Ok(next.unwrap_or_else(|| MOCK_FINAL_REPLY.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_final_answer() {
        let client = MockLlmClient::with_replies([r#"{"tool": "list_files"}"#]);
        let msgs = [Message::user("organize my downloads")];
        assert_eq!(client.complete(&msgs).await.unwrap(), r#"{"tool": "list_files"}"#);
        assert_eq!(client.complete(&msgs).await.unwrap(), MOCK_FINAL_REPLY);
        assert_eq!(client.calls(), 2);
        assert_eq!(client.request(0).unwrap()[0].content, "organize my downloads");
    }
}
