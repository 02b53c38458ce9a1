/// 日志工具模块
///
/// 提供日志初始化和答题过程输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::models::{AnswerOutcome, Question};
use crate::services::ProviderRegistry;

/// 初始化日志输出
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info 级别。重复调用无副作用。
/// 日志写到 stderr，stdout 留给答题结果。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 记录启动信息和已加载的模型
pub fn log_startup(registry: &ProviderRegistry) {
    info!("{}", "=".repeat(60));
    info!("🚀 OCS 智能答题服务启动");
    info!(
        "启动时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if registry.providers().is_empty() {
        warn!("⚠️ 未配置任何模型，请设置 DEEPSEEK_API_KEY 或 DOUBAO_API_KEY");
    }
    for provider in registry.providers() {
        info!(
            "📋 模型: {} ({}) 多模态: {} 思考: {} 启用: {}",
            provider.id,
            provider.model,
            provider.supports_multimodal,
            provider.supports_reasoning,
            provider.enabled
        );
    }
    info!("{}", "=".repeat(60));
}

/// 记录收到的题目
pub fn log_question(question: &Question) {
    info!("\n{}", "─".repeat(60));
    info!(
        "📝 [{}] {}",
        question.question_type.display_name(),
        truncate_text(&question.text, 80)
    );
    if !question.options.is_empty() {
        info!("📋 选项: {}", truncate_text(&question.options.join(" | "), 120));
    }
    if question.has_images() {
        info!("🖼️ 包含 {} 张图片", question.image_urls.len());
    }
}

/// 记录答题结果
pub fn log_outcome(outcome: &AnswerOutcome) {
    match &outcome.failure {
        None => {
            info!("✅ 答案: {}", outcome.final_answer);
            info!(
                "🤖 模型: {} ({}) | 思考模式: {} | tokens: {} | AI耗时: {:.2}秒 | 总耗时: {:.2}秒",
                outcome.used_provider,
                outcome.model,
                outcome.used_reasoning,
                outcome.token_usage.total,
                outcome.ai_time_secs,
                outcome.total_time_secs
            );
        }
        Some(failure) => {
            warn!("❌ 答题失败 [{:?}]: {}", failure.classification, failure.message);
        }
    }
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("中国的首都是哪里", 4), "中国的首...");
        assert_eq!(truncate_text("短", 4), "短");
    }

    #[test]
    fn test_init_twice() {
        init(false);
        init(true);
    }
}
