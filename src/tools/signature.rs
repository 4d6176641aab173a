//! 工具签名：形参列表与类型标注
//!
//! Rust 没有可在运行期反射的函数签名，签名在注册时以显式值给出：
//! 手写（`ToolSignature::new().param(..)`），或由参数结构体的 JsonSchema 推导（`ToolSignature::of::<Args>()`）。
//! 推导只做映射，不做校验；缺失标注、不支持的类型由 `schema::compile` 统一报错。

use schemars::schema::{InstanceType, RootSchema, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;

/// 形参的类型标注
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotation {
    String,
    Integer,
    Number,
    Boolean,
    /// 字符串枚举
    Enum(Vec<String>),
    Array(Box<TypeAnnotation>),
    /// 字符串键、同类型值的映射（如 `HashMap<String, Vec<String>>`）
    Map(Box<TypeAnnotation>),
    /// 没有映射规则的类型（嵌套结构体、联合类型等）
    Custom(String),
}

/// 单个形参
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormalParam {
    pub name: String,
    /// None 表示没有类型标注
    pub annotation: Option<TypeAnnotation>,
    pub required: bool,
}

/// 返回值类型标注
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReturnAnnotation {
    #[default]
    None,
    Primitive(TypeAnnotation),
    Structured,
}

/// 可调用对象的签名
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolSignature {
    pub params: Vec<FormalParam>,
    pub returns: ReturnAnnotation,
}

impl ToolSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// 必填参数
    pub fn param(mut self, name: impl Into<String>, ty: TypeAnnotation) -> Self {
        self.params.push(FormalParam {
            name: name.into(),
            annotation: Some(ty),
            required: true,
        });
        self
    }

    /// 可选参数（有默认值）
    pub fn optional(mut self, name: impl Into<String>, ty: TypeAnnotation) -> Self {
        self.params.push(FormalParam {
            name: name.into(),
            annotation: Some(ty),
            required: false,
        });
        self
    }

    /// 没有类型标注的参数
    pub fn untyped(mut self, name: impl Into<String>) -> Self {
        self.params.push(FormalParam {
            name: name.into(),
            annotation: None,
            required: true,
        });
        self
    }

    pub fn returns(mut self, returns: ReturnAnnotation) -> Self {
        self.returns = returns;
        self
    }

    /// 从参数结构体的 JsonSchema 推导签名
    ///
    /// `Option<T>` 与 `#[serde(default)]` 字段为可选参数；字段顺序即结构体声明顺序。
    pub fn of<T: JsonSchema>() -> Self {
        Self::from_root(&schemars::schema_for!(T))
    }

    pub fn from_root(root: &RootSchema) -> Self {
        let Some(object) = root.schema.object.as_ref() else {
            return Self::default();
        };
        let params = object
            .properties
            .iter()
            .map(|(name, schema)| FormalParam {
                name: name.clone(),
                annotation: annotate(schema, root),
                required: object.required.contains(name),
            })
            .collect();
        Self {
            params,
            returns: ReturnAnnotation::None,
        }
    }
}

fn annotate(schema: &Schema, root: &RootSchema) -> Option<TypeAnnotation> {
    match schema {
        Schema::Bool(_) => None,
        Schema::Object(obj) => annotate_object(obj, root),
    }
}

fn annotate_object(obj: &SchemaObject, root: &RootSchema) -> Option<TypeAnnotation> {
    if let Some(reference) = &obj.reference {
        return Some(annotate_reference(reference, root));
    }

    if let Some(sub) = &obj.subschemas {
        // 带文档注释的 $ref 字段：allOf: [{$ref}]
        if let Some([only]) = sub.all_of.as_deref() {
            return annotate(only, root);
        }
        // Option<引用类型>：anyOf: [{$ref}, {type: null}]
        if let Some(any_of) = &sub.any_of {
            let non_null: Vec<&Schema> = any_of.iter().filter(|s| !is_null(s)).collect();
            return match non_null.as_slice() {
                [only] => annotate(only, root),
                _ => Some(TypeAnnotation::Custom("union".to_string())),
            };
        }
        // 变体带文档注释的单元枚举：oneOf: [{enum: [a]}, {enum: [b]}]
        if let Some(one_of) = &sub.one_of {
            let mut variants = Vec::new();
            for member in one_of {
                match member {
                    Schema::Object(m) => match string_enum(m) {
                        Some(vs) => variants.extend(vs),
                        None => return Some(TypeAnnotation::Custom("union".to_string())),
                    },
                    Schema::Bool(_) => return Some(TypeAnnotation::Custom("union".to_string())),
                }
            }
            return Some(TypeAnnotation::Enum(variants));
        }
    }

    let ty = match &obj.instance_type {
        Some(SingleOrVec::Single(t)) => **t,
        Some(SingleOrVec::Vec(types)) => {
            let non_null: Vec<InstanceType> = types
                .iter()
                .copied()
                .filter(|t| *t != InstanceType::Null)
                .collect();
            match non_null.as_slice() {
                [only] => *only,
                _ => return Some(TypeAnnotation::Custom("union".to_string())),
            }
        }
        None => return string_enum(obj).map(TypeAnnotation::Enum),
    };

    let annotation = match ty {
        InstanceType::String => match string_enum(obj) {
            Some(variants) => TypeAnnotation::Enum(variants),
            None => TypeAnnotation::String,
        },
        InstanceType::Integer => TypeAnnotation::Integer,
        InstanceType::Number => TypeAnnotation::Number,
        InstanceType::Boolean => TypeAnnotation::Boolean,
        InstanceType::Array => {
            let item = obj.array.as_ref().and_then(|a| match &a.items {
                Some(SingleOrVec::Single(item)) => annotate(item, root),
                _ => None,
            });
            match item {
                Some(item) => TypeAnnotation::Array(Box::new(item)),
                None => TypeAnnotation::Custom("array of untyped items".to_string()),
            }
        }
        InstanceType::Object => {
            let Some(validation) = obj.object.as_ref() else {
                return Some(TypeAnnotation::Custom("object".to_string()));
            };
            if !validation.properties.is_empty() {
                return Some(TypeAnnotation::Custom(object_name(obj)));
            }
            match validation
                .additional_properties
                .as_deref()
                .and_then(|s| annotate(s, root))
            {
                Some(value) => TypeAnnotation::Map(Box::new(value)),
                None => TypeAnnotation::Custom("object".to_string()),
            }
        }
        InstanceType::Null => TypeAnnotation::Custom("null".to_string()),
    };
    Some(annotation)
}

fn annotate_reference(reference: &str, root: &RootSchema) -> TypeAnnotation {
    let name = reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string();
    match root.definitions.get(&name) {
        // 单元枚举以 $ref 指向 definitions 中的字符串枚举
        Some(Schema::Object(def)) => match annotate_object(def, root) {
            Some(TypeAnnotation::Enum(variants)) => TypeAnnotation::Enum(variants),
            _ => TypeAnnotation::Custom(name),
        },
        _ => TypeAnnotation::Custom(name),
    }
}

fn string_enum(obj: &SchemaObject) -> Option<Vec<String>> {
    let values = obj.enum_values.as_ref()?;
    values
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn is_null(schema: &Schema) -> bool {
    match schema {
        Schema::Object(obj) => matches!(
            &obj.instance_type,
            Some(SingleOrVec::Single(t)) if **t == InstanceType::Null
        ),
        Schema::Bool(_) => false,
    }
}

fn object_name(obj: &SchemaObject) -> String {
    obj.metadata
        .as_ref()
        .and_then(|m| m.title.clone())
        .unwrap_or_else(|| "object".to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use schemars::JsonSchema;
    use serde::Deserialize;

    use super::*;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "snake_case")]
    enum LookupKey {
        Email,
        Phone,
        Username,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct LookupArgs {
        key: LookupKey,
        value: String,
        limit: Option<i64>,
        #[serde(default)]
        verbose: bool,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct CompressArgs {
        file_paths: HashMap<String, Vec<String>>,
        quality: f64,
        tags: Vec<String>,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Inner {
        x: i32,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct NestedArgs {
        inner: Inner,
        extra: serde_json::Value,
    }

    #[test]
    fn test_derive_primitive_enum_and_optional() {
        let sig = ToolSignature::of::<LookupArgs>();
        let names: Vec<&str> = sig.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["key", "value", "limit", "verbose"]);

        assert_eq!(
            sig.params[0].annotation,
            Some(TypeAnnotation::Enum(vec![
                "email".into(),
                "phone".into(),
                "username".into()
            ]))
        );
        assert!(sig.params[0].required);
        assert_eq!(sig.params[1].annotation, Some(TypeAnnotation::String));
        assert_eq!(sig.params[2].annotation, Some(TypeAnnotation::Integer));
        assert!(!sig.params[2].required);
        assert_eq!(sig.params[3].annotation, Some(TypeAnnotation::Boolean));
        assert!(!sig.params[3].required);
    }

    #[test]
    fn test_derive_map_and_array() {
        let sig = ToolSignature::of::<CompressArgs>();
        assert_eq!(
            sig.params[0].annotation,
            Some(TypeAnnotation::Map(Box::new(TypeAnnotation::Array(
                Box::new(TypeAnnotation::String)
            ))))
        );
        assert_eq!(sig.params[1].annotation, Some(TypeAnnotation::Number));
        assert_eq!(
            sig.params[2].annotation,
            Some(TypeAnnotation::Array(Box::new(TypeAnnotation::String)))
        );
    }

    #[test]
    fn test_nested_struct_is_custom_and_value_is_unannotated() {
        let sig = ToolSignature::of::<NestedArgs>();
        assert_eq!(
            sig.params[0].annotation,
            Some(TypeAnnotation::Custom("Inner".into()))
        );
        assert_eq!(sig.params[1].annotation, None);
    }

    #[test]
    fn test_manual_builder() {
        let sig = ToolSignature::new()
            .param("path", TypeAnnotation::String)
            .optional("depth", TypeAnnotation::Integer)
            .untyped("mode")
            .returns(ReturnAnnotation::Structured);
        assert_eq!(sig.params.len(), 3);
        assert!(sig.params[0].required);
        assert!(!sig.params[1].required);
        assert_eq!(sig.params[2].annotation, None);
        assert_eq!(sig.returns, ReturnAnnotation::Structured);
    }

    #[test]
    fn test_unit_args_have_no_params() {
        assert!(ToolSignature::of::<()>().params.is_empty());
    }
}
