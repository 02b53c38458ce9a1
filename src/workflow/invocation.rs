//! 模型调用执行 - 流程层
//!
//! 按候选顺序调用模型：
//! 1. 参数类错误：不重试，直接终止本次答题
//! 2. 带图片时的连接/超时/编码错误：首次失败后去掉图片重试一次（不等待）
//! 3. 其他错误：指数退避后重试，次数用完换下一个候选
//!
//! 所有候选都失败时返回 `AllCandidatesExhausted`。

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::clients::{ChatRequest, ChatTransport};
use crate::config::Config;
use crate::error::{ResolveError, ResolveResult, TransportError, TransportErrorKind};
use crate::models::{InvocationResult, ProviderConfig, Question};
use crate::services::image::{materialize, ImageFetcher, InlineImage};
use crate::services::{PromptComposer, RoutingDecision};

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 每个候选的最大尝试次数（含去图重试）
    pub max_attempts: u32,
    pub max_backoff: Duration,
    /// 单次调用超时
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            max_backoff: config.max_backoff(),
            request_timeout: config.request_timeout(),
        }
    }

    /// 第 `attempt` 次失败后的等待时间：min(2^attempt 秒, 上限)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fatal,
    ImagePayload,
    Transient,
}

/// 按传输层错误类型和是否携带图片归类
pub fn classify(kind: TransportErrorKind, images_sent: bool) -> FailureKind {
    if kind.is_fatal() {
        FailureKind::Fatal
    } else if images_sent && kind.is_image_sensitive() {
        FailureKind::ImagePayload
    } else {
        FailureKind::Transient
    }
}

/// 输出长度上限：思考模式且模型支持时用较大的上限，请求值被限制在上限之内
///
/// 返回 (max_tokens, 是否实际使用了思考模式)
pub fn output_budget(provider: &ProviderConfig, reasoning: bool, requested: u32, requested_reasoning: u32) -> (u32, bool) {
    let applied = reasoning && provider.supports_reasoning;
    let (ceiling, requested) = if applied {
        (provider.max_output_tokens_reasoning, requested_reasoning)
    } else {
        (provider.max_output_tokens, requested)
    };
    (requested.clamp(1, ceiling.max(1)), applied)
}

/// 单个候选的请求载荷状态
#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    /// 携带内联图片（data URI）
    WithImages(Vec<String>),
    /// 纯文本；`degraded` 表示是去图重试后的状态
    TextOnly { degraded: bool },
}

impl Payload {
    fn images(&self) -> &[String] {
        match self {
            Payload::WithImages(images) => images,
            Payload::TextOnly { .. } => &[],
        }
    }
}

/// 单个候选的结束方式
enum CandidateFailure {
    /// 终止整个答题流程
    Fatal(ResolveError),
    /// 放弃该候选，继续下一个
    Exhausted(ResolveError),
}

/// 模型调用执行器
pub struct InvocationExecutor {
    transport: Arc<dyn ChatTransport>,
    fetcher: Arc<dyn ImageFetcher>,
    policy: RetryPolicy,
    requested_tokens: u32,
    requested_reasoning_tokens: u32,
}

impl InvocationExecutor {
    /// 不限制请求长度，直接使用模型配置的上限
    pub fn new(transport: Arc<dyn ChatTransport>, fetcher: Arc<dyn ImageFetcher>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            fetcher,
            policy,
            requested_tokens: u32::MAX,
            requested_reasoning_tokens: u32::MAX,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn ChatTransport>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self::new(transport, fetcher, RetryPolicy::new(config))
            .with_requested_tokens(config.max_tokens, config.reasoning_max_tokens)
    }

    pub fn with_requested_tokens(mut self, normal: u32, reasoning: u32) -> Self {
        self.requested_tokens = normal;
        self.requested_reasoning_tokens = reasoning;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 依次尝试候选模型
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
        candidates: &[ProviderConfig],
        question: &Question,
        prompt: &str,
    ) -> ResolveResult<InvocationResult> {
        if candidates.is_empty() {
            return Err(ResolveError::NoProviderConfigured);
        }

        // 图片只下载一次，多个多模态候选共用
        let mut inline_images: Option<Vec<InlineImage>> = None;
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<ResolveError> = None;

        for (index, provider) in candidates.iter().enumerate() {
            info!(
                "🤖 尝试模型 [{}/{}]: {} ({})",
                index + 1,
                candidates.len(),
                provider.id,
                provider.model
            );

            let payload = if question.has_images() && provider.supports_multimodal {
                if inline_images.is_none() {
                    inline_images = Some(materialize(self.fetcher.as_ref(), &question.image_urls).await);
                }
                let uris: Vec<String> = inline_images
                    .iter()
                    .flatten()
                    .map(InlineImage::to_data_uri)
                    .collect();
                if uris.is_empty() {
                    warn!("⚠️ 所有图片都下载失败，以纯文本方式作答");
                    Payload::TextOnly { degraded: false }
                } else {
                    Payload::WithImages(uris)
                }
            } else {
                if question.has_images() {
                    warn!("⚠️ 模型 {} 不支持图片，以纯文本方式作答", provider.id);
                }
                Payload::TextOnly { degraded: false }
            };

            attempted.push(provider.id.clone());
            match self.run_candidate(provider, decision.reasoning, question, prompt, payload).await {
                Ok(result) => return Ok(result),
                Err(CandidateFailure::Fatal(err)) => {
                    error!("❌ 参数错误，终止答题: {}", err);
                    return Err(err);
                }
                Err(CandidateFailure::Exhausted(err)) => {
                    warn!("⚠️ 模型 {} 重试次数用完: {}", provider.id, err);
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.unwrap_or(ResolveError::NoProviderConfigured);
        error!("❌ 所有候选模型均调用失败: {:?}", attempted);
        Err(ResolveError::AllCandidatesExhausted {
            attempted,
            last: Box::new(last),
        })
    }

    async fn run_candidate(
        &self,
        provider: &ProviderConfig,
        reasoning: bool,
        question: &Question,
        prompt: &str,
        mut payload: Payload,
    ) -> Result<InvocationResult, CandidateFailure> {
        let (max_tokens, reasoning_applied) =
            output_budget(provider, reasoning, self.requested_tokens, self.requested_reasoning_tokens);
        let model = provider.model_for(reasoning_applied).to_string();
        if reasoning && !reasoning_applied {
            info!("💡 模型 {} 不支持思考模式，按普通模式调用", provider.id);
        }

        let mut last_error: Option<ResolveError> = None;

        for attempt in 1..=self.policy.max_attempts {
            let images_sent = payload.images().len();
            let request = ChatRequest {
                model: model.clone(),
                system_message: PromptComposer::system_message(images_sent > 0).to_string(),
                prompt: prompt.to_string(),
                images: payload.images().to_vec(),
                max_tokens,
                temperature: provider.temperature,
                top_p: provider.top_p,
                reasoning_effort: provider.effort_for(reasoning_applied).map(str::to_string),
            };

            let err = match self.call_with_timeout(provider, &request).await {
                Ok(completion) => {
                    info!(
                        "✅ 模型 {} 调用成功（第 {} 次尝试，tokens: {}）",
                        provider.id, attempt, completion.usage.total
                    );
                    return Ok(InvocationResult {
                        raw_text: completion.content,
                        reasoning_text: completion.reasoning,
                        token_usage: completion.usage,
                        used_provider: provider.id.clone(),
                        model,
                        used_reasoning: reasoning,
                        reasoning_applied,
                        attempts: attempt,
                        images_sent,
                        image_fallback: question.has_images() && images_sent == 0,
                    });
                }
                Err(err) => err,
            };

            warn!(
                "⚠️ 模型 {} 第 {}/{} 次调用失败: {}",
                provider.id, attempt, self.policy.max_attempts, err
            );

            match classify(err.kind, images_sent > 0) {
                FailureKind::Fatal => {
                    return Err(CandidateFailure::Fatal(ResolveError::FatalParameter {
                        provider: provider.id.clone(),
                        message: err.message,
                    }));
                }
                FailureKind::ImagePayload if attempt == 1 => {
                    warn!("🖼️ 疑似图片导致请求失败，去掉图片后重试");
                    payload = Payload::TextOnly { degraded: true };
                    last_error = Some(ResolveError::ImagePayload {
                        provider: provider.id.clone(),
                        message: err.message,
                    });
                    continue;
                }
                FailureKind::ImagePayload => {
                    last_error = Some(ResolveError::ImagePayload {
                        provider: provider.id.clone(),
                        message: err.message,
                    });
                }
                FailureKind::Transient => {
                    last_error = Some(ResolveError::TransientProvider {
                        provider: provider.id.clone(),
                        message: err.message,
                    });
                }
            }

            if attempt < self.policy.max_attempts {
                let wait = self.policy.backoff_for(attempt);
                info!("⏳ 等待 {:?} 后重试...", wait);
                tokio::time::sleep(wait).await;
            }
        }

        if matches!(payload, Payload::TextOnly { degraded: true }) {
            warn!("⚠️ 模型 {} 去图重试后仍然失败", provider.id);
        }

        Err(CandidateFailure::Exhausted(last_error.unwrap_or_else(|| {
            ResolveError::TransientProvider {
                provider: provider.id.clone(),
                message: "没有进行任何尝试".to_string(),
            }
        })))
    }

    async fn call_with_timeout(
        &self,
        provider: &ProviderConfig,
        request: &ChatRequest,
    ) -> Result<crate::clients::ChatCompletion, TransportError> {
        match tokio::time::timeout(self.policy.request_timeout, self.transport.complete(provider, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(self.policy.request_timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::clients::ChatCompletion;
    use crate::models::{QuestionType, TokenUsage};

    /// 按预设顺序返回结果，并记录每次请求
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<ChatCompletion, TransportError>>>,
        calls: Mutex<Vec<(String, usize, u32, String, Option<String>)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<ChatCompletion, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// (模型ID, 图片数, max_tokens, 模型名, reasoning_effort)
        fn calls(&self) -> Vec<(String, usize, u32, String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn complete(
            &self,
            provider: &ProviderConfig,
            request: &ChatRequest,
        ) -> Result<ChatCompletion, TransportError> {
            self.calls.lock().unwrap().push((
                provider.id.clone(),
                request.images.len(),
                request.max_tokens,
                request.model.clone(),
                request.reasoning_effort.clone(),
            ));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Server, "script exhausted")))
        }
    }

    struct StaticFetcher {
        ok: bool,
    }

    #[async_trait]
    impl ImageFetcher for StaticFetcher {
        async fn fetch_as_inline(&self, url: &str) -> Option<InlineImage> {
            self.ok.then(|| InlineImage::new(url, Some("image/png"), vec![1, 2, 3]))
        }
    }

    fn ok(text: &str) -> Result<ChatCompletion, TransportError> {
        Ok(ChatCompletion {
            content: text.to_string(),
            reasoning: None,
            usage: TokenUsage::new(10, 5),
        })
    }

    fn fail(kind: TransportErrorKind) -> Result<ChatCompletion, TransportError> {
        Err(TransportError::new(kind, format!("{:?}", kind)))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            max_backoff: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn executor(transport: Arc<ScriptedTransport>, images_ok: bool) -> InvocationExecutor {
        InvocationExecutor::new(transport, Arc::new(StaticFetcher { ok: images_ok }), policy())
    }

    fn provider(id: &str) -> ProviderConfig {
        ProviderConfig::new(id, "https://api.example.com/v1", "sk-test", "test-model")
    }

    fn text_question() -> Question {
        Question::new("1+1=?", QuestionType::Single, vec!["1".to_string(), "2".to_string()], &[])
    }

    fn image_question() -> Question {
        Question::new(
            "看图作答",
            QuestionType::Single,
            vec!["甲".to_string(), "乙".to_string()],
            &["https://a.com/q.png".to_string()],
        )
    }

    fn decision(reasoning: bool) -> RoutingDecision {
        RoutingDecision {
            reasoning,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_backoff: Duration::from_secs(10),
            ..policy()
        };
        let schedule: Vec<u64> = (1..=5).map(|a| policy.backoff_for(a).as_secs()).collect();
        assert_eq!(schedule, vec![2, 4, 8, 10, 10]);
        assert_eq!(policy.backoff_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_output_budget() {
        let plain = provider("p").with_output_tokens(500, 4096);
        assert_eq!(output_budget(&plain, true, 800, 8000), (500, false));
        assert_eq!(output_budget(&plain, false, 300, 8000), (300, false));

        let thinker = provider("t").reasoning(true).with_output_tokens(500, 4096);
        assert_eq!(output_budget(&thinker, true, 800, 8000), (4096, true));
        assert_eq!(output_budget(&thinker, true, 800, 0), (1, true));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(TransportErrorKind::OutputLimit, true), FailureKind::Fatal);
        assert_eq!(classify(TransportErrorKind::Timeout, true), FailureKind::ImagePayload);
        assert_eq!(classify(TransportErrorKind::Timeout, false), FailureKind::Transient);
        assert_eq!(classify(TransportErrorKind::Server, true), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let transport = ScriptedTransport::new(vec![fail(TransportErrorKind::BadRequest), ok("2")]);
        let executor = executor(transport.clone(), true);
        let candidates = vec![provider("a"), provider("b")];

        let err = executor
            .execute(&decision(false), &candidates, &text_question(), "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::FatalParameter { .. }));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_retry_then_success() {
        let transport = ScriptedTransport::new(vec![fail(TransportErrorKind::RateLimited), ok("2")]);
        let executor = executor(transport.clone(), true);

        let result = executor
            .execute(&decision(false), &[provider("a")], &text_question(), "prompt")
            .await
            .unwrap();

        assert_eq!(result.raw_text, "2");
        assert_eq!(result.attempts, 2);
        assert_eq!(result.token_usage.total, 15);
    }

    #[tokio::test]
    async fn test_image_degrade_once() {
        let transport = ScriptedTransport::new(vec![
            fail(TransportErrorKind::Timeout),
            fail(TransportErrorKind::Timeout),
            ok("甲"),
        ]);
        let executor = executor(transport.clone(), true);
        let candidates = vec![provider("vision").multimodal(true)];

        let result = executor
            .execute(&decision(false), &candidates, &image_question(), "prompt")
            .await
            .unwrap();

        let images: Vec<usize> = transport.calls().iter().map(|c| c.1).collect();
        assert_eq!(images, vec![1, 0, 0]);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.images_sent, 0);
        assert!(result.image_fallback);
    }

    #[tokio::test]
    async fn test_all_images_fail_goes_text_only() {
        let transport = ScriptedTransport::new(vec![fail(TransportErrorKind::Timeout), ok("甲")]);
        let executor = executor(transport.clone(), false);
        let candidates = vec![provider("vision").multimodal(true)];

        let result = executor
            .execute(&decision(true), &candidates, &image_question(), "prompt")
            .await
            .unwrap();

        let images: Vec<usize> = transport.calls().iter().map(|c| c.1).collect();
        assert_eq!(images, vec![0, 0]);
        assert!(result.image_fallback);
        assert!(result.used_reasoning);
    }

    #[tokio::test]
    async fn test_non_multimodal_never_gets_images() {
        let transport = ScriptedTransport::new(vec![ok("甲")]);
        let executor = executor(transport.clone(), true);

        executor
            .execute(&decision(false), &[provider("text")], &image_question(), "prompt")
            .await
            .unwrap();

        assert_eq!(transport.calls()[0].1, 0);
    }

    #[tokio::test]
    async fn test_exhaustion_moves_to_next_candidate() {
        let transport = ScriptedTransport::new(vec![
            fail(TransportErrorKind::Server),
            fail(TransportErrorKind::Connection),
            fail(TransportErrorKind::EmptyResponse),
            ok("2"),
        ]);
        let executor = executor(transport.clone(), true);
        let candidates = vec![provider("a"), provider("b")];

        let result = executor
            .execute(&decision(false), &candidates, &text_question(), "prompt")
            .await
            .unwrap();

        assert_eq!(result.used_provider, "b");
        assert_eq!(result.attempts, 1);
        let ids: Vec<String> = transport.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(ids, vec!["a", "a", "a", "b"]);
    }

    #[tokio::test]
    async fn test_all_candidates_exhausted() {
        let transport = ScriptedTransport::new(vec![]);
        let executor = executor(transport.clone(), true);
        let candidates = vec![provider("a"), provider("b")];

        let err = executor
            .execute(&decision(false), &candidates, &text_question(), "prompt")
            .await
            .unwrap_err();

        match err {
            ResolveError::AllCandidatesExhausted { attempted, last } => {
                assert_eq!(attempted, vec!["a", "b"]);
                assert!(matches!(*last, ResolveError::TransientProvider { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let transport = ScriptedTransport::new(vec![]);
        let executor = executor(transport, true);
        let err = executor
            .execute(&decision(false), &[], &text_question(), "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoProviderConfigured));
    }

    #[tokio::test]
    async fn test_reasoning_model_and_budget() {
        let transport = ScriptedTransport::new(vec![ok("2")]);
        let executor = executor(transport.clone(), true).with_requested_tokens(500, 4096);
        let thinker = provider("t")
            .reasoning(true)
            .with_reasoning_model("thinker-r1")
            .with_output_tokens(2000, 8192);

        let result = executor
            .execute(&decision(true), &[thinker], &text_question(), "prompt")
            .await
            .unwrap();

        assert!(result.reasoning_applied);
        assert_eq!(result.model, "thinker-r1");
        assert_eq!(transport.calls()[0].2, 4096);
    }

    #[tokio::test]
    async fn test_reasoning_effort_only_when_applied() {
        let transport = ScriptedTransport::new(vec![ok("2"), ok("2")]);
        let executor = executor(transport.clone(), true);
        let doubao = provider("db").reasoning(true).with_reasoning_effort("medium");

        executor
            .execute(&decision(true), &[doubao.clone()], &text_question(), "prompt")
            .await
            .unwrap();
        executor
            .execute(&decision(false), &[doubao], &text_question(), "prompt")
            .await
            .unwrap();

        let efforts: Vec<Option<String>> = transport.calls().into_iter().map(|c| c.4).collect();
        assert_eq!(efforts, vec![Some("medium".to_string()), None]);
    }

    #[tokio::test]
    async fn test_system_chat_provider_switches_to_reasoner() {
        use crate::services::{ProviderRegistry, RoutingPolicy, RoutingSlot};

        let config = Config {
            deepseek_api_key: "sk-ds".to_string(),
            ..Config::default()
        };
        let mut registry = ProviderRegistry::with_system_providers(&config);
        registry
            .set_priority_list(RoutingSlot::Judgement, vec!["system_deepseek_chat".to_string()], Some(true))
            .unwrap();

        let decision = RoutingPolicy::new(&config).select(QuestionType::Judgement, false, &registry);
        assert!(decision.reasoning);
        let candidates: Vec<ProviderConfig> = decision
            .candidates
            .iter()
            .filter_map(|id| registry.get(id).cloned())
            .collect();

        let transport = ScriptedTransport::new(vec![ok("正确")]);
        let executor = InvocationExecutor::from_config(&config, transport.clone(), Arc::new(StaticFetcher { ok: true }));
        let question = Question::new("地球是圆的", QuestionType::Judgement, vec![], &[]);
        let result = executor
            .execute(&decision, &candidates, &question, "prompt")
            .await
            .unwrap();

        assert!(result.reasoning_applied);
        assert_eq!(result.model, "deepseek-reasoner");
        assert_eq!(transport.calls()[0].2, config.reasoning_max_tokens);
    }
}
