use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use ocs_answerer::services::ProviderRegistry;
use ocs_answerer::utils::logging;
use ocs_answerer::{AnswerRequest, AnswerResolver, Config, HttpImageFetcher, OpenAiTransport};

/// 从标准输入读取一个答题请求（JSON），输出答题结果（JSON）
#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    let registry = ProviderRegistry::with_system_providers(&config);
    logging::log_startup(&registry);

    let resolver = AnswerResolver::from_config(
        &config,
        registry.into_shared(),
        Arc::new(OpenAiTransport::new()),
        Arc::new(HttpImageFetcher::new(&config)?),
    );

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("读取标准输入失败")?;
    let request: AnswerRequest = serde_json::from_str(&input).context("请求格式错误，需要 JSON")?;

    let outcome = resolver.resolve_request(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
