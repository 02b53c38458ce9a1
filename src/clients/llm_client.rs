//! 模型调用客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（DeepSeek、豆包等）
//!
//! 错误在这里转换为 [`TransportErrorKind`]，上层只看错误类型，不解析错误文本。

use std::collections::HashMap;
use std::sync::Mutex;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl, ReasoningEffort,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportErrorKind};
use crate::models::{ProviderConfig, TokenUsage};

/// 一次模型调用的请求参数
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_message: String,
    pub prompt: String,
    /// 内联图片的 data URI
    pub images: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// 仅在思考模式下设置
    pub reasoning_effort: Option<String>,
}

/// 模型返回内容
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: String,
    pub reasoning: Option<String>,
    pub usage: TokenUsage,
}

/// 模型调用接口
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(
        &self,
        provider: &ProviderConfig,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, TransportError>;
}

/// 基于 async-openai 的调用实现
///
/// 按 (endpoint, 密钥) 缓存客户端，复用连接池。
#[derive(Default)]
pub struct OpenAiTransport {
    clients: Mutex<HashMap<(String, String), Client<OpenAIConfig>>>,
}

impl OpenAiTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, provider: &ProviderConfig) -> Client<OpenAIConfig> {
        let key = (provider.endpoint.clone(), provider.credential.clone());
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(key)
            .or_insert_with(|| {
                let config = OpenAIConfig::new()
                    .with_api_key(&provider.credential)
                    .with_api_base(&provider.endpoint);
                Client::with_config(config)
            })
            .clone()
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn complete(
        &self,
        provider: &ProviderConfig,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, TransportError> {
        debug!(
            "调用模型 API: {} / {}，提示词长度: {} 字符，图片: {} 张",
            provider.id,
            request.model,
            request.prompt.len(),
            request.images.len()
        );

        let body = build_request(request).map_err(map_openai_error)?;
        let client = self.client_for(provider);

        // 按原始 JSON 解析，保留类型化响应里没有的 reasoning_content
        let response: RawChatResponse = client.chat().create_byot(body).await.map_err(|e| {
            warn!("模型 API 调用失败: {}", e);
            map_openai_error(e)
        })?;

        response.into_completion()
    }
}

/// OpenAI 兼容接口的响应，只保留用到的字段
#[derive(Debug, Deserialize)]
struct RawChatResponse {
    #[serde(default)]
    choices: Vec<RawChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<String>,
    /// DeepSeek Reasoner 返回的推理过程
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl RawChatResponse {
    fn into_completion(self) -> Result<ChatCompletion, TransportError> {
        let usage = self
            .usage
            .map(|u| TokenUsage::with_total(u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or_default();

        let message = self
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| TransportError::new(TransportErrorKind::EmptyResponse, "模型未返回任何结果"))?;

        let reasoning = message
            .reasoning_content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if let Some(text) = &reasoning {
            debug!("推理过程: {}", crate::utils::logging::truncate_text(text, 100));
        }

        let content = message
            .content
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| TransportError::new(TransportErrorKind::EmptyResponse, "模型返回内容为空"))?;

        Ok(ChatCompletion {
            content,
            reasoning,
            usage,
        })
    }
}

fn build_request(request: &ChatRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let system = ChatCompletionRequestSystemMessageArgs::default()
        .content(request.system_message.as_str())
        .build()?;

    let user = if request.images.is_empty() {
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()?
    } else {
        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> =
            vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.prompt.clone(),
                },
            )];
        parts.extend(request.images.iter().map(|uri| {
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: uri.clone(),
                        detail: Some(ImageDetail::Auto),
                    },
                },
            )
        }));
        ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(parts))
            .build()?
    };

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(request.model.as_str())
        .messages(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
        .temperature(request.temperature)
        .top_p(request.top_p)
        .max_tokens(request.max_tokens);

    if let Some(effort) = request.reasoning_effort.as_deref() {
        match parse_reasoning_effort(effort) {
            Some(effort) => {
                args.reasoning_effort(effort);
            }
            None => warn!("⚠️ 未知的 reasoning_effort: {}，已忽略", effort),
        }
    }

    args.build()
}

/// low / medium / high 等取值，不区分大小写
fn parse_reasoning_effort(value: &str) -> Option<ReasoningEffort> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase())).ok()
}

/// 把 async-openai 的错误归类
pub fn map_openai_error(err: OpenAIError) -> TransportError {
    let message = err.to_string();
    let kind = match &err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                TransportErrorKind::Timeout
            } else if e.is_connect() {
                TransportErrorKind::Connection
            } else if e.is_decode() || e.is_body() {
                TransportErrorKind::Encoding
            } else if let Some(status) = e.status() {
                TransportErrorKind::from_status(status.as_u16())
            } else {
                TransportErrorKind::Connection
            }
        }
        OpenAIError::ApiError(api) => classify_api_error(api.r#type.as_deref(), api.param.as_deref()),
        OpenAIError::JSONDeserialize(..) => TransportErrorKind::Encoding,
        OpenAIError::InvalidArgument(_) => TransportErrorKind::InvalidParameter,
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, message)
}

/// 按 API 错误体中的 type / param 字段归类
pub fn classify_api_error(error_type: Option<&str>, param: Option<&str>) -> TransportErrorKind {
    if matches!(param, Some("max_tokens") | Some("max_completion_tokens")) {
        return TransportErrorKind::OutputLimit;
    }
    match error_type {
        Some("invalid_request_error") | Some("invalid_parameter_error") => TransportErrorKind::BadRequest,
        Some("rate_limit_error") | Some("rate_limit_exceeded") | Some("requests") => {
            TransportErrorKind::RateLimited
        }
        _ => TransportErrorKind::Server,
    }
}
