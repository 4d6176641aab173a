//! 工具文档块
//!
//! 两种来源：
//! - 文档字符串风格的文本块：首段为摘要，`:param name: 描述`、`:return: 描述`（`:raises ...:` 忽略）
//! - 参数结构体的文档注释：结构体注释为摘要，字段注释为参数描述

use std::sync::OnceLock;

use regex::Regex;
use schemars::schema::{RootSchema, Schema};
use schemars::JsonSchema;

/// 解析后的文档：摘要、按出现顺序的参数描述、返回值描述
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolDoc {
    pub summary: String,
    pub params: Vec<(String, String)>,
    pub returns: Option<String>,
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 允许 `:param name:` 与带类型的 `:param str name:`
    RE.get_or_init(|| Regex::new(r"^:param\s+(?:[^\s:]+\s+)?(\w+)\s*:(.*)$").expect("valid regex"))
}

fn returns_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^:returns?\s*:(.*)$").expect("valid regex"))
}

enum Target {
    Param(usize),
    Returns,
}

impl ToolDoc {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.params.push((name.into(), description.into()));
        self
    }

    pub fn returns(mut self, description: impl Into<String>) -> Self {
        self.returns = Some(description.into());
        self
    }

    /// 某参数的描述
    pub fn describe(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_str())
    }

    /// 解析文档字符串风格的文本块
    ///
    /// 行首缩进会被去掉；摘要取第一个空行之前、且不以 `:` 开头的行；
    /// 字段行之后的非空续行拼接到上一个字段。
    pub fn parse(text: &str) -> Self {
        let mut doc = ToolDoc::default();
        let mut summary_lines: Vec<&str> = Vec::new();
        let mut in_summary = true;
        let mut last: Option<Target> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                if !summary_lines.is_empty() {
                    in_summary = false;
                }
                last = None;
                continue;
            }

            if let Some(caps) = param_re().captures(line) {
                in_summary = false;
                let name = caps[1].to_string();
                let desc = caps[2].trim().to_string();
                doc.params.retain(|(n, _)| *n != name);
                doc.params.push((name, desc));
                last = Some(Target::Param(doc.params.len() - 1));
                continue;
            }
            if let Some(caps) = returns_re().captures(line) {
                in_summary = false;
                doc.returns = Some(caps[1].trim().to_string());
                last = Some(Target::Returns);
                continue;
            }
            if line.starts_with(':') {
                // :raises / :type 等其它字段
                in_summary = false;
                last = None;
                continue;
            }

            if in_summary {
                summary_lines.push(line);
                continue;
            }
            match last {
                Some(Target::Param(i)) => append(&mut doc.params[i].1, line),
                Some(Target::Returns) => {
                    if let Some(r) = doc.returns.as_mut() {
                        append(r, line);
                    }
                }
                None => {}
            }
        }

        doc.summary = summary_lines.join(" ");
        doc
    }

    /// 从参数结构体的文档注释构造
    pub fn from_schema<T: JsonSchema>() -> Self {
        Self::from_root(&schemars::schema_for!(T))
    }

    pub fn from_root(root: &RootSchema) -> Self {
        let summary = root
            .schema
            .metadata
            .as_ref()
            .and_then(|m| m.title.clone().or_else(|| m.description.clone()))
            .map(|d| first_paragraph(&d))
            .unwrap_or_default();

        let params = root
            .schema
            .object
            .as_ref()
            .map(|o| {
                o.properties
                    .iter()
                    .filter_map(|(name, schema)| {
                        field_description(schema).map(|d| (name.clone(), d))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            summary,
            params,
            returns: None,
        }
    }
}

fn append(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(line);
}

fn first_paragraph(text: &str) -> String {
    text.split("\n\n").next().unwrap_or("").trim().to_string()
}

fn field_description(schema: &Schema) -> Option<String> {
    match schema {
        Schema::Object(obj) => obj
            .metadata
            .as_ref()
            .and_then(|m| m.description.clone())
            .map(|d| d.trim().to_string()),
        Schema::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use schemars::JsonSchema;
    use serde::Deserialize;

    use super::*;

    const GET_USER_DOC: &str = "
        Looks up a user by email, phone, or username.

        :param key: The attribute to search for a user by (email, phone, or username).
        :param value: The value to match for the specified attribute.
        :return:
        ";

    #[test]
    fn test_parse_docstring_block() {
        let doc = ToolDoc::parse(GET_USER_DOC);
        assert_eq!(doc.summary, "Looks up a user by email, phone, or username.");
        assert_eq!(
            doc.describe("key"),
            Some("The attribute to search for a user by (email, phone, or username).")
        );
        assert_eq!(
            doc.describe("value"),
            Some("The value to match for the specified attribute.")
        );
        assert_eq!(doc.returns.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_multiline_summary_typed_param_and_continuation() {
        let doc = ToolDoc::parse(
            "Send an email
            to a single recipient.

            More details that are not part of the summary.

            :param str recipient: Address to send to
                (one address only)
            :raises ValueError: never documented as a param
            :returns: True if the email is sent successfully",
        );
        assert_eq!(doc.summary, "Send an email to a single recipient.");
        assert_eq!(doc.describe("recipient"), Some("Address to send to (one address only)"));
        assert_eq!(doc.params.len(), 1);
        assert_eq!(
            doc.returns.as_deref(),
            Some("True if the email is sent successfully")
        );
    }

    #[test]
    fn test_parse_empty_text() {
        let doc = ToolDoc::parse("");
        assert!(doc.summary.is_empty());
        assert!(doc.params.is_empty());
        assert!(doc.returns.is_none());
    }

    /// List all the files in a directory.
    ///
    /// Hidden files are skipped.
    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct ListArgs {
        /// Directory location on the local system
        path: String,
        recursive: Option<bool>,
    }

    #[test]
    fn test_from_schema_uses_doc_comments() {
        let doc = ToolDoc::from_schema::<ListArgs>();
        assert_eq!(doc.summary, "List all the files in a directory.");
        assert_eq!(doc.describe("path"), Some("Directory location on the local system"));
        assert_eq!(doc.describe("recursive"), None);
    }

    #[test]
    fn test_builder() {
        let doc = ToolDoc::new("Echo text")
            .param("text", "Message to echo")
            .returns("The same text");
        assert_eq!(doc.describe("text"), Some("Message to echo"));
        assert_eq!(doc.returns.as_deref(), Some("The same text"));
    }
}
