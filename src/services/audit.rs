//! 答题记录写入 - 业务能力层
//!
//! 只负责"追加一条答题记录"，写入失败只记日志，不影响答题结果。

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::{AnswerOutcome, Question, TokenPricing};

/// 一条答题记录
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub question_type: String,
    pub question: String,
    /// 选项用 " | " 连接
    pub options: String,
    pub raw_answer: String,
    pub reasoning: Option<String>,
    pub final_answer: String,
    pub ai_time_secs: f64,
    pub total_time_secs: f64,
    pub provider: String,
    pub model: String,
    pub used_reasoning: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// 预估费用（元）
    pub cost: f64,
}

impl AuditRecord {
    pub fn new(question: &Question, outcome: &AnswerOutcome, pricing: TokenPricing) -> Self {
        let usage = outcome.token_usage;
        Self {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            question_type: question.question_type.display_name().to_string(),
            question: question.text.clone(),
            options: question.options.join(" | "),
            raw_answer: outcome.raw_answer.clone(),
            reasoning: outcome.reasoning_text.clone(),
            final_answer: outcome.final_answer.clone(),
            ai_time_secs: round3(outcome.ai_time_secs),
            total_time_secs: round3(outcome.total_time_secs),
            provider: outcome.used_provider.clone(),
            model: outcome.model.clone(),
            used_reasoning: outcome.used_reasoning,
            prompt_tokens: usage.prompt,
            completion_tokens: usage.completion,
            total_tokens: usage.total,
            cost: pricing.cost(usage.prompt, usage.completion),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// 答题记录的存储
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// 以 JSON Lines 格式追加写入文件
///
/// 写入由互斥锁串行化，多个答题任务的记录不会交错。
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("📝 已写入答题记录: {}", self.path.display());
        Ok(())
    }
}

/// 写入记录，失败只告警
pub async fn append_quietly(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(e) = sink.append(record).await {
        warn!("⚠️ 答题记录写入失败: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionType, TokenUsage};

    fn sample() -> (Question, AnswerOutcome) {
        let question = Question::new(
            "中国的首都是？",
            QuestionType::Single,
            vec!["北京".to_string(), "上海".to_string()],
            &[],
        );
        let outcome = AnswerOutcome {
            final_answer: "北京".to_string(),
            raw_answer: "A. 北京".to_string(),
            used_provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            token_usage: TokenUsage::new(1_000_000, 500_000),
            ai_time_secs: 1.23456,
            total_time_secs: 1.5,
            ..Default::default()
        };
        (question, outcome)
    }

    #[test]
    fn test_record_cost() {
        let (question, outcome) = sample();
        let record = AuditRecord::new(&question, &outcome, TokenPricing::FALLBACK);
        assert_eq!(record.options, "北京 | 上海");
        assert_eq!(record.total_tokens, 1_500_000);
        assert!((record.cost - 3.5).abs() < 1e-9);
        assert!((record.ai_time_secs - 1.235).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_jsonl_append() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("answers.jsonl"));
        let (question, outcome) = sample();
        let record = AuditRecord::new(&question, &outcome, TokenPricing::FALLBACK);

        sink.append(&record).await.unwrap();
        sink.append(&record).await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["final_answer"], "北京");
        assert_eq!(value["provider"], "deepseek");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("answers.jsonl"));
        let (question, outcome) = sample();
        let records: Vec<AuditRecord> = (0..50)
            .map(|i| {
                let outcome = AnswerOutcome {
                    final_answer: format!("答案{}", i),
                    raw_answer: "很长的原始回答".repeat(200),
                    ..outcome.clone()
                };
                AuditRecord::new(&question, &outcome, TokenPricing::FALLBACK)
            })
            .collect();

        let results = futures::future::join_all(records.iter().map(|record| sink.append(record))).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let mut answers: Vec<String> = content
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["final_answer"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(answers.len(), 50);
        answers.sort();
        answers.dedup();
        assert_eq!(answers.len(), 50);
    }

    #[tokio::test]
    async fn test_append_failure_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        // 目录不能作为文件打开
        let sink = JsonlAuditSink::new(dir.path());
        let (question, outcome) = sample();
        let record = AuditRecord::new(&question, &outcome, TokenPricing::FALLBACK);

        assert!(sink.append(&record).await.is_err());
        append_quietly(&sink, &record).await;
    }
}
