//! 供应商 schema 渲染
//!
//! 描述符本身与供应商无关；只在与 Model Driver 的边界处渲染成具体格式，内部从不读取渲染结果。
//! - OpenAI：`{"type":"function","function":{name, description, parameters}}`，小写 JSON Schema 词汇
//! - Gemini：`{name, description, parameters}`，大写词汇（STRING / INTEGER / OBJECT ...），枚举带 `format: enum`
//! - Anthropic：`{name, description, input_schema}`，小写 JSON Schema 词汇

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::descriptor::{ParamType, ToolDescriptor};

/// 目标模型供应商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI 兼容端点（含 DeepSeek）
    #[default]
    #[serde(alias = "deepseek")]
    OpenAi,
    Gemini,
    Anthropic,
}

impl Provider {
    /// 渲染单个描述符
    pub fn render(&self, descriptor: &ToolDescriptor) -> Value {
        match self {
            Provider::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": descriptor.name,
                    "description": descriptor.description,
                    "parameters": object_schema(descriptor, Vocabulary::JsonSchema),
                }
            }),
            Provider::Gemini => json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "parameters": object_schema(descriptor, Vocabulary::Gemini),
            }),
            Provider::Anthropic => json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "input_schema": object_schema(descriptor, Vocabulary::JsonSchema),
            }),
        }
    }

    /// 按顺序渲染一组描述符
    pub fn render_all<'a>(&self, descriptors: impl IntoIterator<Item = &'a ToolDescriptor>) -> Value {
        Value::Array(descriptors.into_iter().map(|d| self.render(d)).collect())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Anthropic => "anthropic",
        };
        f.write_str(s)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "deepseek" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(format!(
                "unknown provider '{other}' (expected openai, gemini or anthropic)"
            )),
        }
    }
}

#[derive(Clone, Copy)]
enum Vocabulary {
    JsonSchema,
    Gemini,
}

impl Vocabulary {
    fn word(&self, lower: &'static str) -> Value {
        match self {
            Vocabulary::JsonSchema => Value::String(lower.to_string()),
            Vocabulary::Gemini => Value::String(lower.to_ascii_uppercase()),
        }
    }
}

fn object_schema(descriptor: &ToolDescriptor, vocab: Vocabulary) -> Value {
    let mut properties = Map::new();
    for p in &descriptor.parameters {
        let mut schema = type_schema(&p.ty, vocab);
        if let Value::Object(obj) = &mut schema {
            obj.insert("description".into(), Value::String(p.description.clone()));
        }
        properties.insert(p.name.clone(), schema);
    }
    let required: Vec<Value> = descriptor
        .required_params()
        .map(|p| Value::String(p.name.clone()))
        .collect();

    json!({
        "type": vocab.word("object"),
        "properties": properties,
        "required": required,
    })
}

fn type_schema(ty: &ParamType, vocab: Vocabulary) -> Value {
    match ty {
        ParamType::String => json!({ "type": vocab.word("string") }),
        ParamType::Integer => json!({ "type": vocab.word("integer") }),
        ParamType::Number => json!({ "type": vocab.word("number") }),
        ParamType::Boolean => json!({ "type": vocab.word("boolean") }),
        ParamType::Enum(variants) => match vocab {
            Vocabulary::JsonSchema => json!({ "type": "string", "enum": variants }),
            Vocabulary::Gemini => json!({ "type": "STRING", "format": "enum", "enum": variants }),
        },
        ParamType::Array(item) => json!({
            "type": vocab.word("array"),
            "items": type_schema(item, vocab),
        }),
        ParamType::Object(value) => match vocab {
            Vocabulary::JsonSchema => json!({
                "type": "object",
                "additionalProperties": type_schema(value, vocab),
            }),
            // Gemini 不支持 additionalProperties
            Vocabulary::Gemini => json!({ "type": "OBJECT" }),
        },
    }
}
