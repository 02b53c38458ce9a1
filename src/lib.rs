//! # OCS Answerer
//!
//! 在线课程题目的智能答题核心：选择模型、调用模型、把模型输出还原为选项原文。
//!
//! ## 架构设计
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 模型调用的边界适配，把传输错误归类为 `TransportErrorKind`
//! - `OpenAiTransport` - 基于 async-openai 的 OpenAI 兼容接口调用
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单道题
//! - `ProviderRegistry` - 模型注册表和题型优先级
//! - `RoutingPolicy` - 选出候选模型和思考模式
//! - `PromptComposer` - 按题型构建提示词
//! - `HttpImageFetcher` - 图片下载和内联
//! - `AnswerNormalizer` - 答案清洗和选项匹配
//! - `JsonlAuditSink` - 答题记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整答题流程
//! - `InvocationExecutor` - 重试、退避、去图降级、切换候选
//! - `AnswerResolver` - 路由 → 提示词 → 调用 → 标准化 → 记录
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ChatTransport, OpenAiTransport};
pub use config::Config;
pub use error::{FailureClassification, RegistryError, ResolveError, ResolveResult, TransportError, TransportErrorKind};
pub use models::{AnswerOutcome, AnswerRequest, ProviderConfig, Question, QuestionType};
pub use services::{AnswerNormalizer, HttpImageFetcher, ImageFetcher, ProviderRegistry, RoutingPolicy, RoutingSlot};
pub use workflow::{AnswerResolver, InvocationExecutor, RetryPolicy};
