use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// 判断题未提供选项时使用的默认选项
pub const DEFAULT_JUDGEMENT_OPTIONS: [&str; 2] = ["正确", "错误"];

/// 图标类图片的 URL 特征，这类图片不是题目内容
const ICON_KEYWORDS: [&str; 8] = [
    "/icon/",
    "/icons/",
    "/icon.",
    "icon/",
    "video.png",
    "audio.png",
    "play.png",
    "pause.png",
];

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multiple,
    Judgement,
    Completion,
    /// 无法识别的题型，按填空题方式处理答案
    Unknown,
}

impl QuestionType {
    /// 从 OCS 题型编号转换
    ///
    /// 0=单选, 1=多选, 3=填空, 4=判断
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => QuestionType::Single,
            1 => QuestionType::Multiple,
            3 => QuestionType::Completion,
            4 => QuestionType::Judgement,
            _ => QuestionType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multiple => "multiple",
            QuestionType::Judgement => "judgement",
            QuestionType::Completion => "completion",
            QuestionType::Unknown => "unknown",
        }
    }

    /// 中文名称（仅用于日志显示）
    pub fn display_name(self) -> &'static str {
        match self {
            QuestionType::Single => "单选题",
            QuestionType::Multiple => "多选题",
            QuestionType::Judgement => "判断题",
            QuestionType::Completion => "填空题",
            QuestionType::Unknown => "未知题型",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一道待回答的题目
///
/// 每次请求构造一次，处理完即丢弃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    /// 调用方传入的图片和从题干、选项中提取的图片（已去重、已过滤图标）
    pub image_urls: Vec<String>,
}

impl Question {
    /// 创建题目，并从题干和选项中提取图片 URL
    ///
    /// `images` 是调用方显式传入的图片，排在提取结果之前。
    pub fn new(
        text: impl Into<String>,
        question_type: QuestionType,
        options: Vec<String>,
        images: &[String],
    ) -> Self {
        let text = text.into();

        let mut urls: Vec<String> = images
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(clean_image_url)
            .collect();
        urls.extend(extract_image_urls(&text));
        urls.extend(extract_image_urls(&options.join(" ")));

        let mut image_urls: Vec<String> = Vec::with_capacity(urls.len());
        for url in urls {
            if is_icon_url(&url) {
                tracing::debug!("跳过图标URL: {}", url);
                continue;
            }
            if !image_urls.contains(&url) {
                image_urls.push(url);
            }
        }

        Self {
            text,
            question_type,
            options,
            image_urls,
        }
    }

    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }
}

fn image_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)https?://[a-zA-Z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+?\.(?:jpg|jpeg|png|gif|bmp|webp)",
        )
        .expect("image url pattern is valid")
    })
}

fn image_extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\.(?:jpg|jpeg|png|gif|bmp|webp)").expect("image extension pattern is valid")
    })
}

/// 从文本中提取图片 URL
pub fn extract_image_urls(text: &str) -> Vec<String> {
    image_url_regex()
        .find_iter(text)
        .map(|m| clean_image_url(m.as_str()))
        .collect()
}

/// 截掉图片扩展名之后附加的字符
pub fn clean_image_url(url: &str) -> String {
    let url = url.trim();
    match image_extension_regex().find(url) {
        Some(m) => url[..m.end()].to_string(),
        None => url.to_string(),
    }
}

fn is_icon_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    ICON_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}
