use std::time::Duration;

/// 输出 token 上限的取值范围（普通模式）
pub const MAX_TOKENS_LIMIT: u32 = 8192;
/// 输出 token 上限的取值范围（思考模式）
pub const REASONING_MAX_TOKENS_LIMIT: u32 = 65536;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 单次模型调用的超时时间（秒）
    pub request_timeout_secs: u64,
    /// 每个候选模型的最大尝试次数
    pub max_attempts: u32,
    /// 退避等待的上限（秒）
    pub max_backoff_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 生成参数 ---
    pub temperature: f32,
    pub top_p: f32,
    /// 普通模式请求的 max_tokens（会被模型上限截断）
    pub max_tokens: u32,
    /// 思考模式请求的 max_tokens（会被模型上限截断）
    pub reasoning_max_tokens: u32,
    // --- 思考模式策略 ---
    pub auto_reasoning_for_multiple: bool,
    pub auto_reasoning_for_images: bool,
    /// 思考强度（low / medium / high），发给支持 reasoning_effort 的模型
    pub reasoning_effort: String,
    /// 题型没有配置模型列表时使用的默认模型 ID
    pub default_provider: Option<String>,
    // --- 图片下载 ---
    pub image_fetch_timeout_secs: u64,
    pub image_referer: String,
    /// 答题记录文件（JSON Lines），为空则不记录
    pub audit_log_file: Option<String>,
    // --- 系统模型 ---
    pub deepseek_api_key: String,
    pub deepseek_base_url: String,
    pub doubao_api_key: String,
    pub doubao_base_url: String,
    pub doubao_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: 1200,
            max_attempts: 3,
            max_backoff_secs: 10,
            verbose_logging: false,
            temperature: 0.1,
            top_p: 0.95,
            max_tokens: 500,
            reasoning_max_tokens: 4096,
            auto_reasoning_for_multiple: true,
            auto_reasoning_for_images: true,
            reasoning_effort: "medium".to_string(),
            default_provider: None,
            image_fetch_timeout_secs: 10,
            image_referer: "https://mooc1.chaoxing.com/".to_string(),
            audit_log_file: Some("ocs_answers_log.jsonl".to_string()),
            deepseek_api_key: String::new(),
            deepseek_base_url: "https://api.deepseek.com".to_string(),
            doubao_api_key: String::new(),
            doubao_base_url: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
            doubao_model: "doubao-seed-1-6-251015".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            request_timeout_secs: env_parse("TIMEOUT").unwrap_or(default.request_timeout_secs),
            max_attempts: env_parse::<u32>("MAX_RETRIES").map(|v| v.max(1)).unwrap_or(default.max_attempts),
            max_backoff_secs: env_parse("MAX_BACKOFF").unwrap_or(default.max_backoff_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            temperature: env_parse("TEMPERATURE").unwrap_or(default.temperature),
            top_p: env_parse("TOP_P").unwrap_or(default.top_p),
            max_tokens: env_parse::<u32>("MAX_TOKENS").unwrap_or(default.max_tokens).clamp(1, MAX_TOKENS_LIMIT),
            reasoning_max_tokens: env_parse::<u32>("REASONING_MAX_TOKENS")
                .unwrap_or(default.reasoning_max_tokens)
                .clamp(1, REASONING_MAX_TOKENS_LIMIT),
            auto_reasoning_for_multiple: env_flag("AUTO_REASONING_FOR_MULTIPLE").unwrap_or(default.auto_reasoning_for_multiple),
            auto_reasoning_for_images: env_flag("AUTO_REASONING_FOR_IMAGES").unwrap_or(default.auto_reasoning_for_images),
            reasoning_effort: std::env::var("REASONING_EFFORT")
                .ok()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.reasoning_effort),
            default_provider: std::env::var("DEFAULT_PROVIDER").ok().filter(|v| !v.is_empty()).or(default.default_provider),
            image_fetch_timeout_secs: env_parse("IMAGE_FETCH_TIMEOUT").unwrap_or(default.image_fetch_timeout_secs),
            image_referer: std::env::var("IMAGE_REFERER").unwrap_or(default.image_referer),
            audit_log_file: match std::env::var("AUDIT_LOG_FILE") {
                Ok(v) if v.is_empty() => None,
                Ok(v) => Some(v),
                Err(_) => default.audit_log_file,
            },
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").unwrap_or(default.deepseek_api_key),
            deepseek_base_url: std::env::var("DEEPSEEK_BASE_URL").unwrap_or(default.deepseek_base_url),
            doubao_api_key: std::env::var("DOUBAO_API_KEY").unwrap_or(default.doubao_api_key),
            doubao_base_url: std::env::var("DOUBAO_BASE_URL").unwrap_or(default.doubao_base_url),
            doubao_model: std::env::var("DOUBAO_MODEL").unwrap_or(default.doubao_model),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn image_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.image_fetch_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// "true"/"false" 不区分大小写
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| v.trim().to_lowercase().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_backoff(), Duration::from_secs(10));
        assert!(config.auto_reasoning_for_multiple);
        assert!(config.auto_reasoning_for_images);
        assert!(config.max_tokens <= MAX_TOKENS_LIMIT);
        assert_eq!(config.reasoning_effort, "medium");
    }
}
