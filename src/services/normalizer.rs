//! 答案标准化
//!
//! 把模型返回的自由文本映射回调用方给出的选项原文。
//! 策略是保守清洗：优先用原始文本匹配，匹配不到再清洗后匹配，
//! 仍然匹配不到时返回清洗后的文本，而不是空字符串。

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::{QuestionType, DEFAULT_JUDGEMENT_OPTIONS};

/// 否定标记，长的在前，先于肯定标记检测并剔除
const NEGATIVE_MARKERS: [&str; 10] = [
    "不正确", "不成立", "不对", "不是", "错误", "错", "false", "×", "否", "no",
];

const POSITIVE_MARKERS: [&str; 7] = ["正确", "成立", "对", "true", "√", "是", "yes"];

/// 全角标点，和 ASCII 标点、空白一起在宽松比较时去掉
const CJK_PUNCTUATION: &str = "。，、；：！？（）《》“”‘’【】…—·";

/// 答案标准化器
pub struct AnswerNormalizer;

impl AnswerNormalizer {
    /// 按题型标准化答案，任何输入都返回字符串
    pub fn normalize(raw_text: &str, question_type: QuestionType, options: &[String]) -> String {
        let raw = raw_text.trim();
        if raw.is_empty() {
            return String::new();
        }

        let answer = match question_type {
            QuestionType::Single => Self::single(raw, options),
            QuestionType::Multiple => Self::multiple(raw, options),
            QuestionType::Judgement => Self::judgement(raw, options),
            QuestionType::Completion | QuestionType::Unknown => cleaned_or_raw(raw),
        };
        debug!("🧹 答案标准化: {:?} -> {:?}", raw, answer);
        answer
    }

    fn single(raw: &str, options: &[String]) -> String {
        if options.is_empty() {
            return cleaned_or_raw(raw);
        }
        let cleaned = light_clean(raw);
        if let Some(option) = best_option(raw, &cleaned, options) {
            return option;
        }
        if cleaned.is_empty() {
            raw.to_string()
        } else {
            cleaned
        }
    }

    fn multiple(raw: &str, options: &[String]) -> String {
        if options.is_empty() {
            return cleaned_or_raw(raw);
        }

        let fragments: Vec<&str> = separator_regex()
            .split(raw)
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .collect();

        let matched = collect_matches(&fragments, options);
        if matched.is_empty() {
            cleaned_or_raw(raw)
        } else {
            matched.join("#")
        }
    }

    /// 判断题只做等值比较，避免"不正确"按包含关系命中"正确"
    fn judgement(raw: &str, options: &[String]) -> String {
        let defaults: Vec<String>;
        let options = if options.is_empty() {
            defaults = DEFAULT_JUDGEMENT_OPTIONS.iter().map(|s| s.to_string()).collect();
            defaults.as_slice()
        } else {
            options
        };

        if let Some(option) = find_option(raw, options, options_equal) {
            return option;
        }
        let cleaned = light_clean(raw);
        if cleaned != raw {
            if let Some(option) = find_option(&cleaned, options, options_equal) {
                return option;
            }
        }

        // 按肯定/否定倾向匹配
        let fallback = if cleaned.is_empty() { raw.to_string() } else { cleaned };
        match polarity(&fallback) {
            Polarity::Positive => options
                .iter()
                .find(|opt| polarity(opt) == Polarity::Positive)
                .or_else(|| options.first())
                .filter(|opt| !opt.trim().is_empty())
                .cloned()
                .unwrap_or(fallback),
            Polarity::Negative => options
                .iter()
                .find(|opt| polarity(opt) == Polarity::Negative)
                .or_else(|| options.get(1))
                .filter(|opt| !opt.trim().is_empty())
                .cloned()
                .unwrap_or(fallback),
            Polarity::Mixed | Polarity::Neutral => fallback,
        }
    }
}

/// 轻度清洗：去掉行首的答案标签、选项字母和 markdown 强调符号，不改动答案内容
pub fn light_clean(text: &str) -> String {
    let text: String = text.trim().chars().filter(|c| *c != '*' && *c != '`').collect();
    let text = chinese_label_regex().replace(text.trim(), "");
    let text = english_label_regex().replace(text.trim(), "");
    let text = strip_wrapping_underscores(text.trim());
    let text = letter_prefix_regex().replace(text, "");
    text.trim().to_string()
}

/// 宽松匹配：忽略大小写的相等、任一方向的包含、去掉标点和空白后相等
pub fn options_match(answer: &str, option: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    let option = option.trim().to_lowercase();
    if answer.is_empty() || option.is_empty() {
        return false;
    }
    if answer == option || answer.contains(&option) || option.contains(&answer) {
        return true;
    }
    stripped_equal(&answer, &option)
}

fn options_equal(answer: &str, option: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    let option = option.trim().to_lowercase();
    if answer.is_empty() || option.is_empty() {
        return false;
    }
    answer == option || stripped_equal(&answer, &option)
}

fn stripped_equal(a: &str, b: &str) -> bool {
    let a = strip_punctuation(a);
    let b = strip_punctuation(b);
    !a.is_empty() && a == b
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation() && !CJK_PUNCTUATION.contains(*c))
        .collect()
}

fn find_option(answer: &str, options: &[String], matcher: fn(&str, &str) -> bool) -> Option<String> {
    options.iter().find(|opt| matcher(answer, opt)).cloned()
}

/// 所有选项先做等值比较，都不相等时才退到包含匹配
fn best_option(raw: &str, cleaned: &str, options: &[String]) -> Option<String> {
    find_option(raw, options, options_equal)
        .or_else(|| find_option(cleaned, options, options_equal))
        .or_else(|| find_option(raw, options, options_match))
        .or_else(|| find_option(cleaned, options, options_match))
}

/// 每个片段取最佳匹配的选项，按匹配顺序去重
fn collect_matches(fragments: &[&str], options: &[String]) -> Vec<String> {
    let mut matched: Vec<String> = Vec::new();
    for fragment in fragments {
        let cleaned = light_clean(fragment);
        if let Some(option) = best_option(fragment, &cleaned, options) {
            if !matched.contains(&option) {
                matched.push(option);
            }
        }
    }
    matched
}

fn cleaned_or_raw(raw: &str) -> String {
    let cleaned = light_clean(raw);
    if cleaned.is_empty() {
        raw.to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
    Mixed,
    Neutral,
}

/// 先检测并剔除否定标记，再在剩余文本中找肯定标记
fn polarity(text: &str) -> Polarity {
    let mut lower = text.to_lowercase();
    let negative = NEGATIVE_MARKERS.iter().any(|marker| lower.contains(marker));
    for marker in NEGATIVE_MARKERS {
        lower = lower.replace(marker, " ");
    }
    let positive = POSITIVE_MARKERS.iter().any(|marker| lower.contains(marker));

    match (positive, negative) {
        (true, false) => Polarity::Positive,
        (false, true) => Polarity::Negative,
        (true, true) => Polarity::Mixed,
        (false, false) => Polarity::Neutral,
    }
}

fn strip_wrapping_underscores(text: &str) -> &str {
    if text.len() > 1 && text.starts_with('_') && text.ends_with('_') {
        text.trim_matches('_')
    } else {
        text
    }
}

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[#;；、\n]").expect("separator pattern is valid"))
}

fn chinese_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:正确答案[是为：:]*|答案[是为：:]*|选择[：:]+)").expect("label pattern is valid")
    })
}

fn english_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:the\s+)?(?:correct\s+)?answer(?:\s*[:：]|\s+is\b\s*[:：]?)\s*")
            .expect("english label pattern is valid")
    })
}

fn letter_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][.、)）．:：]\s*").expect("letter prefix pattern is valid"))
}
