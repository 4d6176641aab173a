//! 工具 Schema 编译器
//!
//! 把签名（ToolSignature）与文档（ToolDoc）编译成 ToolDescriptor。所有校验在注册时完成：
//! 名称合法、有摘要、形参不重复、每个形参有类型标注且有描述、文档不含签名之外的参数、类型可映射。
//! 编译是纯函数，同一输入两次编译得到结构相同的描述符。

use std::collections::HashSet;

use crate::core::SchemaError;
use crate::tools::descriptor::{ParamSpec, ParamType, ReturnKind, ReturnSpec, ToolDescriptor};
use crate::tools::doc::ToolDoc;
use crate::tools::signature::{ReturnAnnotation, ToolSignature, TypeAnnotation};

/// 工具名最大长度（各供应商函数名限制的交集）
const MAX_NAME_LEN: usize = 64;

/// 编译工具描述符
pub fn compile(
    name: &str,
    signature: &ToolSignature,
    doc: &ToolDoc,
) -> Result<ToolDescriptor, SchemaError> {
    validate_name(name)?;

    let summary = doc.summary.trim();
    if summary.is_empty() {
        return Err(SchemaError::MissingSummary {
            tool: name.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for p in &signature.params {
        if !seen.insert(p.name.as_str()) {
            return Err(SchemaError::DuplicateParameter {
                tool: name.to_string(),
                param: p.name.clone(),
            });
        }
    }

    if let Some(p) = signature.params.iter().find(|p| p.annotation.is_none()) {
        return Err(SchemaError::MissingAnnotation {
            tool: name.to_string(),
            param: p.name.clone(),
        });
    }

    if let Some(p) = signature
        .params
        .iter()
        .find(|p| doc.describe(&p.name).map_or(true, |d| d.trim().is_empty()))
    {
        return Err(SchemaError::UndocumentedParameter {
            tool: name.to_string(),
            param: p.name.clone(),
        });
    }

    if let Some((documented, _)) = doc.params.iter().find(|(n, _)| !seen.contains(n.as_str())) {
        return Err(SchemaError::StaleDocumentation {
            tool: name.to_string(),
            param: documented.clone(),
        });
    }

    let mut parameters = Vec::with_capacity(signature.params.len());
    for p in &signature.params {
        // 前面已确认每个形参都有标注
        let Some(annotation) = p.annotation.as_ref() else {
            continue;
        };
        let ty = map_type(annotation).map_err(|type_name| SchemaError::UnsupportedType {
            tool: name.to_string(),
            param: p.name.clone(),
            type_name,
        })?;
        parameters.push(ParamSpec {
            name: p.name.clone(),
            ty,
            description: doc.describe(&p.name).unwrap_or_default().trim().to_string(),
            required: p.required,
        });
    }

    let kind = match &signature.returns {
        ReturnAnnotation::None => ReturnKind::None,
        ReturnAnnotation::Structured => ReturnKind::Structured,
        ReturnAnnotation::Primitive(a) => {
            ReturnKind::Primitive(map_type(a).map_err(|type_name| SchemaError::UnsupportedType {
                tool: name.to_string(),
                param: "return".to_string(),
                type_name,
            })?)
        }
    };
    let returns = ReturnSpec {
        kind,
        description: doc
            .returns
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    };

    Ok(ToolDescriptor {
        name: name.to_string(),
        description: summary.to_string(),
        parameters,
        returns,
    })
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidName(name.to_string()))
    }
}

/// 类型映射规则；无规则的类型返回其名称
fn map_type(annotation: &TypeAnnotation) -> Result<ParamType, String> {
    Ok(match annotation {
        TypeAnnotation::String => ParamType::String,
        TypeAnnotation::Integer => ParamType::Integer,
        TypeAnnotation::Number => ParamType::Number,
        TypeAnnotation::Boolean => ParamType::Boolean,
        TypeAnnotation::Enum(variants) if variants.is_empty() => {
            return Err("empty enum".to_string())
        }
        TypeAnnotation::Enum(variants) => ParamType::Enum(variants.clone()),
        TypeAnnotation::Array(item) => ParamType::Array(Box::new(map_type(item)?)),
        TypeAnnotation::Map(value) => ParamType::Object(Box::new(map_type(value)?)),
        TypeAnnotation::Custom(type_name) => return Err(type_name.clone()),
    })
}
