//! 工具注册表
//!
//! 工具实现 Tool trait（name / signature / doc / call），或实现 TypedTool 由参数结构体自动推导签名与文档。
//! 注册时编译描述符：Schema 错误的工具不进入注册表（记录警告），重名注册直接失败。
//! resolve(name, args) 先按描述符校验参数，再经 ToolExecutor 保护调用，最后按完成规则判定；
//! 任何失败都以 ToolFailure 返回，不会越过注册表边界。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::{RegistrationError, ToolFailure};
use crate::tools::descriptor::ToolDescriptor;
use crate::tools::doc::ToolDoc;
use crate::tools::executor::ToolExecutor;
use crate::tools::render::Provider;
use crate::tools::schema;
use crate::tools::signature::{ReturnAnnotation, ToolSignature};

/// 完成规则：工具正常返回后，载荷是否表示目标已达成
#[derive(Clone, Copy, Default)]
pub enum Completion {
    /// 任何 Ok 载荷都算完成
    #[default]
    OnSuccess,
    /// 载荷必须是 JSON `true`
    Flag,
    /// 载荷对象的该字段必须为 `true`
    Field(&'static str),
    /// 自定义判定
    Check(fn(&Value) -> bool),
}

impl Completion {
    pub fn is_met(&self, payload: &Value) -> bool {
        match self {
            Completion::OnSuccess => true,
            Completion::Flag => payload.as_bool() == Some(true),
            Completion::Field(field) => {
                payload.get(*field).and_then(Value::as_bool) == Some(true)
            }
            Completion::Check(check) => check(payload),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::OnSuccess => f.write_str("OnSuccess"),
            Completion::Flag => f.write_str("Flag"),
            Completion::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Completion::Check(_) => f.write_str("Check(..)"),
        }
    }
}

/// 工具 trait：名称、签名、文档（供编译描述符）、完成规则、异步执行（args 已按描述符校验）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型提案中的 "tool" 字段）
    fn name(&self) -> &str;

    fn signature(&self) -> ToolSignature;

    fn doc(&self) -> ToolDoc;

    fn completion(&self) -> Completion {
        Completion::OnSuccess
    }

    /// 参数别名（别名 → 参数名）：模型常用的同义参数名在校验前改写
    fn arg_aliases(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// 类型之外的参数约束（取值范围等），失败即参数错误，工具不会被调用
    fn validate(&self, _args: &Map<String, Value>) -> Result<(), String> {
        Ok(())
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, String>;
}

/// 强类型工具：参数结构体派生 Deserialize + JsonSchema，签名与文档由 schema 推导
///
/// 结构体的文档注释即工具摘要，字段的文档注释即参数描述；`Option` / `#[serde(default)]` 字段为可选参数。
#[async_trait]
pub trait TypedTool: Send + Sync {
    type Args: DeserializeOwned + JsonSchema + Send;

    fn tool_name(&self) -> &str;

    /// 覆盖参数结构体上的摘要
    fn summary(&self) -> Option<&str> {
        None
    }

    fn return_annotation(&self) -> ReturnAnnotation {
        ReturnAnnotation::Structured
    }

    fn return_doc(&self) -> Option<&str> {
        None
    }

    fn completion_rule(&self) -> Completion {
        Completion::OnSuccess
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    async fn run(&self, args: Self::Args) -> Result<Value, String>;
}

#[async_trait]
impl<T: TypedTool> Tool for T {
    fn name(&self) -> &str {
        self.tool_name()
    }

    fn signature(&self) -> ToolSignature {
        ToolSignature::of::<T::Args>().returns(self.return_annotation())
    }

    fn doc(&self) -> ToolDoc {
        let mut doc = ToolDoc::from_schema::<T::Args>();
        if let Some(summary) = self.summary() {
            doc.summary = summary.to_string();
        }
        doc.returns = self.return_doc().map(str::to_string);
        doc
    }

    fn completion(&self) -> Completion {
        self.completion_rule()
    }

    fn arg_aliases(&self) -> &[(&'static str, &'static str)] {
        self.aliases()
    }

    /// 试反序列化到参数结构体：u8 越界、负数等 JSON 类型正确但取值非法的参数在此拒绝
    fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        serde_json::from_value::<T::Args>(Value::Object(args.clone()))
            .map(|_| ())
            .map_err(|e| format!("invalid arguments: {e}"))
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, String> {
        let typed: T::Args = serde_json::from_value(Value::Object(args))
            .map_err(|e| format!("invalid arguments: {e}"))?;
        self.run(typed).await
    }
}

struct Binding {
    descriptor: ToolDescriptor,
    completion: Completion,
    tool: Arc<dyn Tool>,
}

/// 工具注册表：名称唯一，按注册顺序保存描述符
#[derive(Default)]
pub struct ToolRegistry {
    bindings: HashMap<String, Binding>,
    order: Vec<String>,
    warnings: Vec<String>,
    executor: ToolExecutor,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(executor: ToolExecutor) -> Self {
        Self {
            executor,
            ..Self::default()
        }
    }

    pub fn register(
        &mut self,
        tool: impl Tool + 'static,
    ) -> Result<&ToolDescriptor, RegistrationError> {
        self.register_arc(Arc::new(tool))
    }

    /// 编译并绑定；重名返回 Duplicate（原绑定不变），Schema 错误记录警告且工具不进入注册表
    pub fn register_arc(
        &mut self,
        tool: Arc<dyn Tool>,
    ) -> Result<&ToolDescriptor, RegistrationError> {
        let name = tool.name().to_string();
        if self.bindings.contains_key(&name) {
            return Err(RegistrationError::Duplicate(name));
        }

        let descriptor = match schema::compile(&name, &tool.signature(), &tool.doc()) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool skipped: schema error");
                self.warnings.push(e.to_string());
                return Err(e.into());
            }
        };

        tracing::debug!(tool = %name, params = descriptor.parameters.len(), "Tool registered");
        let binding = Binding {
            descriptor,
            completion: tool.completion(),
            tool,
        };
        self.order.push(name.clone());
        let binding = self.bindings.entry(name).or_insert(binding);
        Ok(&binding.descriptor)
    }

    /// 批量注册；失败的工具记录日志后跳过，返回成功注册的数量
    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> usize {
        let mut registered = 0;
        for tool in tools {
            let name = tool.name().to_string();
            match self.register_arc(tool) {
                Ok(_) => registered += 1,
                Err(RegistrationError::Duplicate(_)) => {
                    tracing::warn!(tool = %name, "Duplicate tool skipped");
                    self.warnings.push(format!("Duplicate tool: {name}"));
                }
                // Schema 错误已在 register_arc 中记录
                Err(RegistrationError::Schema(_)) => {}
            }
        }
        registered
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.bindings.get(name).map(|b| &b.descriptor)
    }

    /// 所有描述符，按注册顺序
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.descriptor(n).cloned())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 注册期警告（被略过的工具）
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn completion(&self, name: &str) -> Option<Completion> {
        self.bindings.get(name).map(|b| b.completion)
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 以某供应商格式渲染全部描述符
    pub fn render(&self, provider: Provider) -> Value {
        provider.render_all(self.order.iter().filter_map(|n| self.descriptor(n)))
    }

    /// 查找、校验参数、保护调用、按完成规则判定
    pub async fn resolve(&self, name: &str, args: Value) -> Result<Value, ToolFailure> {
        let binding = self
            .bindings
            .get(name)
            .ok_or_else(|| ToolFailure::unknown_tool(name))?;

        let args = apply_aliases(args, binding.tool.arg_aliases());
        let checked = binding
            .descriptor
            .check_arguments(&args)
            .map_err(ToolFailure::argument)?;
        binding
            .tool
            .validate(&checked)
            .map_err(ToolFailure::argument)?;

        let payload = self
            .executor
            .run(name, &args, binding.tool.call(checked))
            .await?;

        if binding.completion.is_met(&payload) {
            Ok(payload)
        } else {
            Err(ToolFailure::not_completed(payload))
        }
    }
}

/// 别名改写为参数名；参数名已存在时保留别名，交给契约校验报未知参数
fn apply_aliases(args: Value, aliases: &[(&'static str, &'static str)]) -> Value {
    let Value::Object(mut map) = args else {
        return args;
    };
    for (alias, name) in aliases {
        if map.contains_key(*name) {
            continue;
        }
        if let Some(value) = map.remove(*alias) {
            map.insert((*name).to_string(), value);
        }
    }
    Value::Object(map)
}
