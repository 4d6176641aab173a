//! 工具描述符：与模型供应商无关的工具说明
//!
//! 编译后不可变；Registry 用它校验调用参数，渲染层（render）用它生成各供应商的 schema。

use serde::Serialize;
use serde_json::{Map, Value};

/// 参数类型词汇：string | integer | number | boolean | enum | array | object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "of", rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Enum(Vec<String>),
    Array(Box<ParamType>),
    /// 字符串键映射，值均为同一类型
    Object(Box<ParamType>),
}

impl ParamType {
    /// JSON 值是否符合该类型
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Enum(variants) => value
                .as_str()
                .is_some_and(|s| variants.iter().any(|v| v == s)),
            ParamType::Array(item) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| item.accepts(v))),
            ParamType::Object(inner) => value
                .as_object()
                .is_some_and(|map| map.values().all(|v| inner.accepts(v))),
        }
    }

    /// 供错误信息使用的类型名，如 `array<string>`
    pub fn label(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Integer => "integer".to_string(),
            ParamType::Number => "number".to_string(),
            ParamType::Boolean => "boolean".to_string(),
            ParamType::Enum(variants) => format!("enum[{}]", variants.join("|")),
            ParamType::Array(item) => format!("array<{}>", item.label()),
            ParamType::Object(inner) => format!("object<string, {}>", inner.label()),
        }
    }
}

/// 单个参数说明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub description: String,
    pub required: bool,
}

/// 返回值语义类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum ReturnKind {
    None,
    Primitive(ParamType),
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnSpec {
    pub kind: ReturnKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 工具描述符
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// 按声明顺序排列
    pub parameters: Vec<ParamSpec>,
    pub returns: ReturnSpec,
}

impl ToolDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// 按参数契约校验调用参数，返回规范化后的参数表
    ///
    /// - `null` 视为空参数表，其它非对象值直接拒绝
    /// - 未知参数名、缺少必填参数、类型不符都返回错误描述
    /// - 可选参数传 `null` 视为未传，从结果中移除
    pub fn check_arguments(&self, args: &Value) -> Result<Map<String, Value>, String> {
        let map = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(format!(
                    "arguments for {} must be a JSON object, got {}",
                    self.name,
                    json_kind(other)
                ))
            }
        };

        let mut checked = Map::new();
        for (name, value) in map {
            let Some(spec) = self.param(&name) else {
                return Err(format!("unknown parameter '{name}' for {}", self.name));
            };
            if value.is_null() && !spec.required {
                continue;
            }
            if !spec.ty.accepts(&value) {
                return Err(format!(
                    "parameter '{name}' of {} expects {}, got {}",
                    self.name,
                    spec.ty.label(),
                    json_kind(&value)
                ));
            }
            checked.insert(name, value);
        }

        if let Some(missing) = self
            .required_params()
            .find(|p| !checked.contains_key(&p.name))
        {
            return Err(format!(
                "missing required parameter '{}' for {}",
                missing.name, self.name
            ));
        }

        Ok(checked)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lookup_user() -> ToolDescriptor {
        ToolDescriptor {
            name: "lookup_user".into(),
            description: "Looks up a user by email, phone, or username.".into(),
            parameters: vec![
                ParamSpec {
                    name: "key".into(),
                    ty: ParamType::Enum(vec!["email".into(), "phone".into(), "username".into()]),
                    description: "The attribute to search for a user by".into(),
                    required: true,
                },
                ParamSpec {
                    name: "value".into(),
                    ty: ParamType::String,
                    description: "The value to match".into(),
                    required: true,
                },
                ParamSpec {
                    name: "limit".into(),
                    ty: ParamType::Integer,
                    description: "Maximum matches".into(),
                    required: false,
                },
            ],
            returns: ReturnSpec {
                kind: ReturnKind::Structured,
                description: None,
            },
        }
    }

    #[test]
    fn test_accepts_valid_arguments() {
        let d = lookup_user();
        let args = d
            .check_arguments(&json!({"key": "email", "value": "x@y.com", "limit": 3}))
            .unwrap();
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_missing_required() {
        let err = lookup_user()
            .check_arguments(&json!({"key": "email"}))
            .unwrap_err();
        assert!(err.contains("missing required parameter 'value'"));
    }

    #[test]
    fn test_unknown_parameter() {
        let err = lookup_user()
            .check_arguments(&json!({"key": "email", "value": "a", "cc": "b"}))
            .unwrap_err();
        assert!(err.contains("unknown parameter 'cc'"));
    }

    #[test]
    fn test_type_mismatch() {
        let d = lookup_user();
        let err = d
            .check_arguments(&json!({"key": "email", "value": 42}))
            .unwrap_err();
        assert!(err.contains("expects string, got integer"));

        let err = d
            .check_arguments(&json!({"key": "fax", "value": "1"}))
            .unwrap_err();
        assert!(err.contains("enum[email|phone|username]"));

        let err = d
            .check_arguments(&json!({"key": "email", "value": "a", "limit": 1.5}))
            .unwrap_err();
        assert!(err.contains("expects integer, got number"));
    }

    #[test]
    fn test_optional_null_is_absent_and_null_args_is_empty() {
        let d = lookup_user();
        let args = d
            .check_arguments(&json!({"key": "phone", "value": "1", "limit": null}))
            .unwrap();
        assert!(!args.contains_key("limit"));

        let err = d.check_arguments(&Value::Null).unwrap_err();
        assert!(err.contains("missing required parameter 'key'"));

        let err = d.check_arguments(&json!(["email"])).unwrap_err();
        assert!(err.contains("must be a JSON object"));
    }

    #[test]
    fn test_nested_types() {
        let map = ParamType::Object(Box::new(ParamType::Array(Box::new(ParamType::String))));
        assert!(map.accepts(&json!({"pdf": ["a.pdf", "b.pdf"]})));
        assert!(!map.accepts(&json!({"pdf": ["a.pdf", 1]})));
        assert!(!map.accepts(&json!(["a.pdf"])));
        assert_eq!(map.label(), "object<string, array<string>>");
        assert!(ParamType::Number.accepts(&json!(3)));
    }
}
