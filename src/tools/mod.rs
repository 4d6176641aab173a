//! 工具层：签名与文档 → 描述符编译 → 注册表 → 供应商渲染

pub mod descriptor;
pub mod doc;
pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod render;
pub mod schema;
pub mod signature;

pub use descriptor::{ParamSpec, ParamType, ReturnKind, ReturnSpec, ToolDescriptor};
pub use doc::ToolDoc;
pub use executor::ToolExecutor;
pub use filesystem::{CopyFileTool, ListFilesTool, SafeFs};
pub use registry::{Completion, Tool, ToolRegistry, TypedTool};
pub use render::Provider;
pub use schema::compile;
pub use signature::{FormalParam, ReturnAnnotation, ToolSignature, TypeAnnotation};
