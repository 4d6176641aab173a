//! 结果引用：计划中的参数可以写 `"<result_from_N>"`，派发时替换为第 N 个计划步骤的载荷
//!
//! N 从 1 开始，按计划步骤（不含回退任务）计数；该步骤或其回退链中完成的任务提供载荷。
//! 引用可出现在任意嵌套位置，但必须占据整个字符串。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<result_from_(\d+)>$").expect("valid regex"))
}

/// 解析 `<result_from_N>`，返回 N
pub fn parse_reference(text: &str) -> Option<usize> {
    reference_re()
        .captures(text.trim())
        .and_then(|caps| caps[1].parse().ok())
}

/// 是否含有结果引用
pub fn has_references(args: &Value) -> bool {
    match args {
        Value::String(s) => parse_reference(s).is_some(),
        Value::Array(items) => items.iter().any(has_references),
        Value::Object(map) => map.values().any(has_references),
        _ => false,
    }
}

/// 替换全部结果引用；`lookup(n)` 返回第 n 步的载荷，缺失时整个绑定失败
pub fn bind_results<F>(args: &Value, lookup: &F) -> Result<Value, String>
where
    F: Fn(usize) -> Option<Value>,
{
    Ok(match args {
        Value::String(s) => match parse_reference(s) {
            Some(step) => lookup(step).ok_or_else(|| {
                format!("unresolved result reference {s}: step {step} has no completed result")
            })?,
            None => args.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| bind_results(item, lookup))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut bound = Map::with_capacity(map.len());
            for (key, value) in map {
                bound.insert(key.clone(), bind_results(value, lookup)?);
            }
            Value::Object(bound)
        }
        other => other.clone(),
    })
}
