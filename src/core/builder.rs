//! 编排器构建器：CLI 与集成测试共用同一套组装逻辑

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::driver::LlmDriver;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::orchestrator::Orchestrator;
use crate::tools::{CopyFileTool, ListFilesTool, Provider, Tool, ToolExecutor, ToolRegistry};

/// 内置工具集合（均限制在 `root` 之下）
pub fn default_tools(root: impl AsRef<Path>) -> Vec<Arc<dyn Tool>> {
    let root = root.as_ref();
    vec![
        Arc::new(ListFilesTool::new(root)),
        Arc::new(CopyFileTool::new(root)),
    ]
}

/// 按配置创建 LLM 客户端：deepseek / openai 需要对应的 API Key，否则退回 Mock
pub fn build_llm(config: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = config.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    match provider.as_str() {
        "deepseek" if deepseek_key || openai_key.is_some() => {
            tracing::info!(model = %config.llm.model, "Using DeepSeek LLM");
            Arc::new(create_deepseek_client(Some(&config.llm.model)))
        }
        "openai" if openai_key.is_some() => {
            tracing::info!(model = %config.llm.model, "Using OpenAI LLM");
            Arc::new(OpenAiClient::new(
                config.llm.base_url.as_deref(),
                &config.llm.model,
                openai_key.as_deref(),
            ))
        }
        "mock" => Arc::new(MockLlmClient::new()),
        other => {
            tracing::warn!(provider = %other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 编排器构建器
pub struct StewardBuilder {
    config: AppConfig,
    workspace: PathBuf,
    schema_format: Provider,
    llm: Option<Arc<dyn LlmClient>>,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl StewardBuilder {
    pub fn new(config: AppConfig) -> Self {
        let workspace = config.app.workspace_root();
        let schema_format = config.llm.schema_format;
        Self {
            config,
            workspace,
            schema_format,
            llm: None,
            extra_tools: Vec::new(),
        }
    }

    /// 覆盖文件工具的沙箱根目录
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// 覆盖渲染给模型的 schema 格式
    pub fn with_schema_format(mut self, provider: Provider) -> Self {
        self.schema_format = provider;
        self
    }

    /// 注入 LLM 客户端（测试用 Mock）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 追加内置工具之外的工具
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// 构建工具注册表：内置工具在前，额外工具按追加顺序在后
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let executor = ToolExecutor::new(self.config.tools.tool_timeout_secs);
        let mut registry = ToolRegistry::with_executor(executor);
        let count = registry.register_all(
            default_tools(&self.workspace)
                .into_iter()
                .chain(self.extra_tools.iter().cloned()),
        );
        tracing::debug!(count, root = %self.workspace.display(), "Tool registry built");
        registry
    }

    /// 组装 LLM 驱动的编排器
    pub fn build(self) -> Orchestrator {
        let registry = Arc::new(self.build_tool_registry());
        let llm = self.llm.clone().unwrap_or_else(|| build_llm(&self.config));
        let driver = LlmDriver::new(llm, self.schema_format)
            .with_catalog(registry.descriptors())
            .with_request_timeout(self.config.llm.timeouts.request);
        Orchestrator::new(registry, Arc::new(driver)).with_config(self.config.orchestrator)
    }
}
