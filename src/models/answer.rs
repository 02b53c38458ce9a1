use serde::{Deserialize, Serialize};

use crate::error::{FailureClassification, ResolveError};

/// Token 使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt.saturating_add(completion),
        }
    }

    /// 使用接口返回的总量，缺失时按两项之和计算
    pub fn with_total(prompt: u32, completion: u32, total: Option<u32>) -> Self {
        Self {
            total: total.unwrap_or_else(|| prompt.saturating_add(completion)),
            ..Self::new(prompt, completion)
        }
    }
}

/// 一次成功的模型调用
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub raw_text: String,
    pub reasoning_text: Option<String>,
    pub token_usage: TokenUsage,
    pub used_provider: String,
    /// 实际请求的模型名称
    pub model: String,
    /// 路由策略是否要求思考模式
    pub used_reasoning: bool,
    /// 是否实际使用了思考模式的输出预算
    pub reasoning_applied: bool,
    /// 在该候选上用掉的尝试次数
    pub attempts: u32,
    /// 最终成功请求中携带的图片数量
    pub images_sent: usize,
    /// 本来要发图片，最终以纯文本完成
    pub image_fallback: bool,
}

/// 失败说明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub classification: FailureClassification,
    pub message: String,
}

impl From<&ResolveError> for FailureReport {
    fn from(err: &ResolveError) -> Self {
        Self {
            classification: err.classification(),
            message: err.to_string(),
        }
    }
}

/// 返回给服务层的答题结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerOutcome {
    pub final_answer: String,
    pub raw_answer: String,
    pub reasoning_text: Option<String>,
    pub used_provider: String,
    pub model: String,
    pub used_reasoning: bool,
    pub token_usage: TokenUsage,
    /// 图片题被路由到了不支持图片的模型
    pub multimodal_fallback: bool,
    /// 图片未能随请求发送，按纯文本作答
    pub image_fallback: bool,
    pub ai_time_secs: f64,
    pub total_time_secs: f64,
    pub failure: Option<FailureReport>,
}

impl AnswerOutcome {
    pub fn failed(err: &ResolveError, used_reasoning: bool) -> Self {
        Self {
            used_reasoning,
            failure: Some(FailureReport::from(err)),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total_saturates() {
        assert_eq!(TokenUsage::new(10, 5).total, 15);
        assert_eq!(TokenUsage::new(u32::MAX, 1).total, u32::MAX);
    }

    #[test]
    fn test_token_usage_prefers_reported_total() {
        assert_eq!(TokenUsage::with_total(10, 5, Some(42)).total, 42);
        assert_eq!(TokenUsage::with_total(10, 5, None).total, 15);
    }
}
