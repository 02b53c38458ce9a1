use serde::{Deserialize, Serialize};

/// 模型价格（元 / 百万 tokens）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl TokenPricing {
    /// 未配置价格时按 DeepSeek（缓存未命中）计价
    pub const FALLBACK: TokenPricing = TokenPricing {
        input_per_million: 2.0,
        output_per_million: 3.0,
    };

    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// 一个模型后端的配置
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    /// 显示名称
    pub name: String,
    /// OpenAI 兼容接口的 base url
    pub endpoint: String,
    pub credential: String,
    /// 实际请求的模型名称
    pub model: String,
    /// 思考模式下改用的模型名称（如 deepseek-reasoner）
    #[serde(default)]
    pub reasoning_model: Option<String>,
    /// 思考模式下随请求发送的 reasoning_effort（如豆包）
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub supports_multimodal: bool,
    #[serde(default)]
    pub supports_reasoning: bool,
    pub max_output_tokens: u32,
    pub max_output_tokens_reasoning: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub enabled: bool,
    /// 系统模型由环境变量生成，不允许通过管理操作修改或删除
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub pricing: Option<TokenPricing>,
}

impl ProviderConfig {
    /// 使用默认参数创建模型配置
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        credential: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            endpoint: endpoint.into(),
            credential: credential.into(),
            model: model.into(),
            reasoning_model: None,
            reasoning_effort: None,
            supports_multimodal: false,
            supports_reasoning: false,
            max_output_tokens: 2000,
            max_output_tokens_reasoning: 4096,
            temperature: 0.1,
            top_p: 0.95,
            enabled: true,
            is_system: false,
            pricing: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn multimodal(mut self, supports: bool) -> Self {
        self.supports_multimodal = supports;
        self
    }

    pub fn reasoning(mut self, supports: bool) -> Self {
        self.supports_reasoning = supports;
        self
    }

    pub fn with_reasoning_model(mut self, model: impl Into<String>) -> Self {
        self.reasoning_model = Some(model.into());
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    pub fn with_output_tokens(mut self, normal: u32, reasoning: u32) -> Self {
        self.max_output_tokens = normal;
        self.max_output_tokens_reasoning = reasoning;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// 根据是否启用思考模式选择模型名称
    pub fn model_for(&self, reasoning: bool) -> &str {
        match (&self.reasoning_model, reasoning) {
            (Some(model), true) => model,
            _ => &self.model,
        }
    }

    /// 只有启用思考模式时才发送 reasoning_effort
    pub fn effort_for(&self, reasoning: bool) -> Option<&str> {
        self.reasoning_effort.as_deref().filter(|_| reasoning)
    }

    pub fn pricing_or_fallback(&self) -> TokenPricing {
        self.pricing.unwrap_or(TokenPricing::FALLBACK)
    }
}

// 不在日志中输出密钥
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("reasoning_model", &self.reasoning_model)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("supports_multimodal", &self.supports_multimodal)
            .field("supports_reasoning", &self.supports_reasoning)
            .field("enabled", &self.enabled)
            .field("is_system", &self.is_system)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_for_reasoning() {
        let provider = ProviderConfig::new("ds", "https://api.deepseek.com", "sk", "deepseek-chat")
            .with_reasoning_model("deepseek-reasoner");
        assert_eq!(provider.model_for(false), "deepseek-chat");
        assert_eq!(provider.model_for(true), "deepseek-reasoner");

        let plain = ProviderConfig::new("db", "https://ark", "sk", "doubao");
        assert_eq!(plain.model_for(true), "doubao");
    }

    #[test]
    fn test_effort_only_in_reasoning_mode() {
        let provider = ProviderConfig::new("db", "https://ark", "sk", "doubao").with_reasoning_effort("high");
        assert_eq!(provider.effort_for(true), Some("high"));
        assert_eq!(provider.effort_for(false), None);
        assert_eq!(ProviderConfig::new("ds", "https://api", "sk", "m").effort_for(true), None);
    }

    #[test]
    fn test_debug_hides_credential() {
        let provider = ProviderConfig::new("ds", "https://api.deepseek.com", "sk-secret", "deepseek-chat");
        assert!(!format!("{:?}", provider).contains("sk-secret"));
    }

    #[test]
    fn test_cost() {
        let pricing = TokenPricing {
            input_per_million: 0.8,
            output_per_million: 2.0,
        };
        let cost = pricing.cost(1_000_000, 500_000);
        assert!((cost - 1.8).abs() < 1e-9);
    }
}
