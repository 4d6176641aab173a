//! 工具 Schema 编译集成测试：参数结构体 → 描述符 → 各供应商格式

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use steward::core::{RegistrationError, SchemaError};
use steward::tools::{
    compile, ParamType, Provider, ReturnAnnotation, ToolDoc, ToolRegistry, ToolSignature,
    TypedTool,
};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum Priority {
    Low,
    High,
}

/// Create a reminder for the user.
#[derive(Debug, Deserialize, JsonSchema)]
struct ReminderArgs {
    /// What to be reminded about
    text: String,
    /// Minutes from now
    delay_minutes: i64,
    /// Urgency of the reminder
    priority: Priority,
    /// Labels attached to the reminder
    #[serde(default)]
    tags: Vec<String>,
    /// Extra key/value metadata
    metadata: Option<HashMap<String, String>>,
}

struct ReminderTool;

#[async_trait]
impl TypedTool for ReminderTool {
    type Args = ReminderArgs;

    fn tool_name(&self) -> &str {
        "create_reminder"
    }

    fn return_annotation(&self) -> ReturnAnnotation {
        ReturnAnnotation::None
    }

    async fn run(&self, _args: ReminderArgs) -> Result<Value, String> {
        Ok(Value::Null)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Address {
    street: String,
}

/// Ship a parcel.
#[derive(Debug, Deserialize, JsonSchema)]
struct ShipArgs {
    /// Destination address
    address: Address,
}

struct ShipTool;

#[async_trait]
impl TypedTool for ShipTool {
    type Args = ShipArgs;

    fn tool_name(&self) -> &str {
        "ship"
    }

    async fn run(&self, _args: ShipArgs) -> Result<Value, String> {
        Ok(json!({"shipped": true}))
    }
}

/// Store arbitrary data.
#[derive(Debug, Deserialize, JsonSchema)]
struct StoreArgs {
    /// Anything at all
    blob: Value,
}

struct StoreTool;

#[async_trait]
impl TypedTool for StoreTool {
    type Args = StoreArgs;

    fn tool_name(&self) -> &str {
        "store"
    }

    async fn run(&self, _args: StoreArgs) -> Result<Value, String> {
        Ok(Value::Null)
    }
}

#[test]
fn test_derived_descriptor_keeps_declaration_order() {
    let mut registry = ToolRegistry::new();
    let descriptor = registry.register(ReminderTool).unwrap().clone();

    assert_eq!(descriptor.description, "Create a reminder for the user.");
    let names: Vec<&str> = descriptor.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["text", "delay_minutes", "priority", "tags", "metadata"]
    );

    let required: Vec<&str> = descriptor.required_params().map(|p| p.name.as_str()).collect();
    assert_eq!(required, vec!["text", "delay_minutes", "priority"]);

    assert_eq!(descriptor.param("delay_minutes").unwrap().ty, ParamType::Integer);
    assert_eq!(
        descriptor.param("priority").unwrap().ty,
        ParamType::Enum(vec!["low".to_string(), "high".to_string()])
    );
    assert_eq!(
        descriptor.param("tags").unwrap().ty,
        ParamType::Array(Box::new(ParamType::String))
    );
    assert_eq!(
        descriptor.param("metadata").unwrap().ty,
        ParamType::Object(Box::new(ParamType::String))
    );
    assert_eq!(descriptor.param("text").unwrap().description, "What to be reminded about");
}

#[test]
fn test_rendered_formats_agree_on_parameters() {
    let mut registry = ToolRegistry::new();
    registry.register(ReminderTool).unwrap();

    let openai = registry.render(Provider::OpenAi);
    let params = &openai[0]["function"]["parameters"];
    assert_eq!(params["type"], "object");
    assert_eq!(params["properties"]["priority"]["enum"], json!(["low", "high"]));
    assert_eq!(
        params["required"],
        json!(["text", "delay_minutes", "priority"])
    );

    let gemini = registry.render(Provider::Gemini);
    let params = &gemini[0]["parameters"];
    assert_eq!(params["type"], "OBJECT");
    assert_eq!(params["properties"]["tags"]["type"], "ARRAY");
    assert_eq!(params["properties"]["tags"]["items"]["type"], "STRING");

    let anthropic = registry.render(Provider::Anthropic);
    assert_eq!(anthropic[0]["name"], "create_reminder");
    assert_eq!(
        anthropic[0]["input_schema"]["properties"]["delay_minutes"]["type"],
        "integer"
    );
}

#[test]
fn test_nested_struct_parameter_is_rejected() {
    let mut registry = ToolRegistry::new();
    let err = registry.register(ShipTool).unwrap_err();
    match err {
        RegistrationError::Schema(SchemaError::UnsupportedType { tool, param, .. }) => {
            assert_eq!(tool, "ship");
            assert_eq!(param, "address");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(registry.is_empty());
    assert_eq!(registry.warnings().len(), 1);
}

#[test]
fn test_untyped_field_is_missing_annotation() {
    let mut registry = ToolRegistry::new();
    let err = registry.register(StoreTool).unwrap_err();
    assert_eq!(
        err,
        RegistrationError::Schema(SchemaError::MissingAnnotation {
            tool: "store".to_string(),
            param: "blob".to_string(),
        })
    );
    assert!(!registry.contains("store"));
}

#[test]
fn test_docstring_tool_compiles() {
    let signature = ToolSignature::new()
        .param("user_id", steward::tools::TypeAnnotation::String)
        .returns(ReturnAnnotation::Structured);
    let doc = ToolDoc::parse(
        "Fetch a user record.\n\n:param user_id: Identifier of the user\n:return: The user record",
    );
    let descriptor = compile("get_user", &signature, &doc).unwrap();
    assert_eq!(descriptor.description, "Fetch a user record.");
    assert_eq!(descriptor.returns.description.as_deref(), Some("The user record"));

    let stale = ToolDoc::parse(
        "Fetch a user record.\n\n:param user_id: Identifier\n:param email: Old parameter",
    );
    assert_eq!(
        compile("get_user", &signature, &stale).unwrap_err(),
        SchemaError::StaleDocumentation {
            tool: "get_user".to_string(),
            param: "email".to_string(),
        }
    );
}
