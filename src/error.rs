use serde::Serialize;
use thiserror::Error;

/// 返回给调用方的失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClassification {
    FatalParameter,
    TransientProvider,
    ImagePayload,
    AllCandidatesExhausted,
    NoProviderConfigured,
}

/// 传输层给出的失败类型
///
/// 由适配器在边界上根据 HTTP 状态、错误类型字段等明确信息生成，
/// 核心逻辑只看这个枚举，不解析错误文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// 400 / invalid_request_error
    BadRequest,
    /// 请求参数无法构造或被拒绝
    InvalidParameter,
    /// max_tokens 等输出长度参数越界
    OutputLimit,
    Connection,
    Timeout,
    /// 请求体或响应体编解码失败
    Encoding,
    RateLimited,
    Server,
    /// 模型返回了空内容
    EmptyResponse,
    Other,
}

impl TransportErrorKind {
    /// 是否属于请求本身有问题，重试无意义
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            TransportErrorKind::BadRequest
                | TransportErrorKind::InvalidParameter
                | TransportErrorKind::OutputLimit
        )
    }

    /// 携带内联图片时，这几类错误通常由图片引起
    pub fn is_image_sensitive(self) -> bool {
        matches!(
            self,
            TransportErrorKind::Connection | TransportErrorKind::Timeout | TransportErrorKind::Encoding
        )
    }

    /// 按 HTTP 状态码归类
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => TransportErrorKind::BadRequest,
            408 | 504 => TransportErrorKind::Timeout,
            429 => TransportErrorKind::RateLimited,
            500..=599 => TransportErrorKind::Server,
            _ => TransportErrorKind::Other,
        }
    }
}

/// 模型调用失败
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self::new(TransportErrorKind::Timeout, format!("请求超时 ({}秒)", secs))
    }
}

/// 答题流程错误
#[derive(Debug, Error)]
pub enum ResolveError {
    /// 参数错误，不重试，直接终止本次答题
    #[error("请求参数错误 (模型: {provider}): {message}")]
    FatalParameter { provider: String, message: String },

    /// 模型暂时不可用，重试耗尽后放弃该候选
    #[error("模型调用失败 (模型: {provider}): {message}")]
    TransientProvider { provider: String, message: String },

    /// 携带图片时的传输失败
    #[error("图片载荷导致调用失败 (模型: {provider}): {message}")]
    ImagePayload { provider: String, message: String },

    /// 所有候选模型都失败
    #[error("所有候选模型均调用失败 (已尝试: {attempted:?}): {last}")]
    AllCandidatesExhausted {
        attempted: Vec<String>,
        #[source]
        last: Box<ResolveError>,
    },

    /// 没有满足条件的已启用模型
    #[error("没有可用的模型，请至少配置并启用一个模型")]
    NoProviderConfigured,
}

impl ResolveError {
    pub fn classification(&self) -> FailureClassification {
        match self {
            ResolveError::FatalParameter { .. } => FailureClassification::FatalParameter,
            ResolveError::TransientProvider { .. } => FailureClassification::TransientProvider,
            ResolveError::ImagePayload { .. } => FailureClassification::ImagePayload,
            ResolveError::AllCandidatesExhausted { .. } => FailureClassification::AllCandidatesExhausted,
            ResolveError::NoProviderConfigured => FailureClassification::NoProviderConfigured,
        }
    }
}

/// 模型注册表管理操作的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("模型ID已存在: {0}")]
    DuplicateProvider(String),

    #[error("模型不存在: {0}")]
    UnknownProvider(String),

    #[error("缺少必需字段: {0}")]
    MissingField(&'static str),

    #[error("系统模型不可修改或删除: {0}")]
    SystemProvider(String),
}

/// 答题流程结果类型
pub type ResolveResult<T> = Result<T, ResolveError>;
