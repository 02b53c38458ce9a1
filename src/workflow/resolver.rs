//! 答题流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整答题流程
//!
//! 流程顺序：
//! 1. 路由：按题型和是否有图片选出候选模型
//! 2. 构建提示词
//! 3. 调用模型（重试、去图降级、切换候选）
//! 4. 标准化答案
//! 5. 写入答题记录（失败不影响结果）

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::clients::ChatTransport;
use crate::config::Config;
use crate::error::ResolveError;
use crate::models::{AnswerOutcome, AnswerRequest, ProviderConfig, Question, TokenPricing};
use crate::services::audit::append_quietly;
use crate::services::{
    AnswerNormalizer, AuditRecord, AuditSink, ImageFetcher, JsonlAuditSink, PromptComposer,
    RoutingDecision, RoutingPolicy, SharedRegistry,
};
use crate::utils::logging;
use crate::workflow::invocation::InvocationExecutor;

/// 答题流程
///
/// - 不持有注册表锁跨越网络调用
/// - 每次答题相互独立
pub struct AnswerResolver {
    registry: SharedRegistry,
    routing: RoutingPolicy,
    executor: InvocationExecutor,
    audit: Option<Arc<dyn AuditSink>>,
}

impl AnswerResolver {
    pub fn new(registry: SharedRegistry, routing: RoutingPolicy, executor: InvocationExecutor) -> Self {
        Self {
            registry,
            routing,
            executor,
            audit: None,
        }
    }

    /// 按配置组装，配置了记录文件时启用 JSONL 答题记录
    pub fn from_config(
        config: &Config,
        registry: SharedRegistry,
        transport: Arc<dyn ChatTransport>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let resolver = Self::new(
            registry,
            RoutingPolicy::new(config),
            InvocationExecutor::from_config(config, transport, fetcher),
        );
        match &config.audit_log_file {
            Some(path) => resolver.with_audit(Arc::new(JsonlAuditSink::new(path))),
            None => resolver,
        }
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// 处理服务层传来的请求，题干为空时直接返回参数错误
    pub async fn resolve_request(&self, request: AnswerRequest) -> AnswerOutcome {
        match request.into_question() {
            Some(question) => self.resolve(&question).await,
            None => {
                let err = ResolveError::FatalParameter {
                    provider: "-".to_string(),
                    message: "题目内容不能为空".to_string(),
                };
                error!("❌ {}", err);
                AnswerOutcome::failed(&err, false)
            }
        }
    }

    /// 回答一道题，总是返回答案或明确分类的失败
    pub async fn resolve(&self, question: &Question) -> AnswerOutcome {
        let started = Instant::now();
        logging::log_question(question);

        let (decision, candidates) = self.plan(question);
        debug!("候选模型: {:?}，思考模式: {}", decision.candidates, decision.reasoning);

        if decision.is_empty() {
            let mut outcome = AnswerOutcome::failed(&ResolveError::NoProviderConfigured, decision.reasoning);
            outcome.total_time_secs = started.elapsed().as_secs_f64();
            logging::log_outcome(&outcome);
            return outcome;
        }

        let prompt = PromptComposer::build(&question.text, &question.options, question.question_type);

        let ai_started = Instant::now();
        let result = self.executor.execute(&decision, &candidates, question, &prompt).await;
        let ai_time_secs = ai_started.elapsed().as_secs_f64();

        let mut outcome = match result {
            Ok(result) => {
                let final_answer =
                    AnswerNormalizer::normalize(&result.raw_text, question.question_type, &question.options);
                AnswerOutcome {
                    final_answer,
                    raw_answer: result.raw_text,
                    reasoning_text: result.reasoning_text,
                    used_provider: result.used_provider,
                    model: result.model,
                    used_reasoning: result.used_reasoning,
                    token_usage: result.token_usage,
                    multimodal_fallback: decision.multimodal_fallback,
                    image_fallback: result.image_fallback,
                    ai_time_secs,
                    total_time_secs: 0.0,
                    failure: None,
                }
            }
            Err(err) => {
                let mut outcome = AnswerOutcome::failed(&err, decision.reasoning);
                outcome.multimodal_fallback = decision.multimodal_fallback;
                outcome.ai_time_secs = ai_time_secs;
                outcome
            }
        };
        outcome.total_time_secs = started.elapsed().as_secs_f64();

        if outcome.is_success() {
            if let Some(sink) = &self.audit {
                let pricing = candidates
                    .iter()
                    .find(|p| p.id == outcome.used_provider)
                    .map(ProviderConfig::pricing_or_fallback)
                    .unwrap_or(TokenPricing::FALLBACK);
                let record = AuditRecord::new(question, &outcome, pricing);
                append_quietly(sink.as_ref(), &record).await;
            }
        }

        logging::log_outcome(&outcome);
        outcome
    }

    /// 在读锁内完成路由并复制候选配置
    fn plan(&self, question: &Question) -> (RoutingDecision, Vec<ProviderConfig>) {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        let decision = self
            .routing
            .select(question.question_type, question.has_images(), &registry);
        let candidates = decision
            .candidates
            .iter()
            .filter_map(|id| registry.get(id).cloned())
            .collect();
        (decision, candidates)
    }
}
