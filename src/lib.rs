//! Steward - 个人自动化智能体内核
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、编排状态、恢复预算、优雅关闭、组装构建器
//! - **driver**: 模型驱动抽象（下一步提议、失败回退）及基于 LLM 的实现
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 订阅器初始化
//! - **orchestrator**: 任务、会话与编排主循环
//! - **tools**: 工具 Schema 编译器、注册表、执行器与内置文件工具

pub mod config;
pub mod core;
pub mod driver;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod tools;

pub use crate::core::StewardBuilder;
pub use orchestrator::{Orchestrator, Plan, SessionReport};
