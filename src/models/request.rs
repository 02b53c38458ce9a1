//! 入站请求适配
//!
//! 把服务层传来的请求（选项可能是列表，也可能是换行分隔的字符串）
//! 转换成核心流程使用的 `Question`。

use serde::Deserialize;

use super::question::{Question, QuestionType};

/// 选项的两种入站格式
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionsInput {
    List(Vec<serde_json::Value>),
    Text(String),
}

impl Default for OptionsInput {
    fn default() -> Self {
        OptionsInput::List(Vec::new())
    }
}

impl OptionsInput {
    /// 转换为去除空白后的选项列表，空项丢弃
    pub fn into_options(self) -> Vec<String> {
        match self {
            OptionsInput::Text(text) => text
                .split('\n')
                .map(str::trim)
                .filter(|opt| !opt.is_empty())
                .map(str::to_string)
                .collect(),
            OptionsInput::List(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                })
                .map(|opt| opt.trim().to_string())
                .filter(|opt| !opt.is_empty())
                .collect(),
        }
    }
}

/// 答题请求（OCS 脚本格式）
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: OptionsInput,
    /// 0=单选, 1=多选, 3=填空, 4=判断
    #[serde(default, rename = "type")]
    pub type_code: i64,
    #[serde(default)]
    pub images: Vec<String>,
}

impl AnswerRequest {
    /// 题干为空时返回 `None`
    pub fn into_question(self) -> Option<Question> {
        let text = self.question.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let question_type = QuestionType::from_code(self.type_code);
        let options = self.options.into_options();
        Some(Question::new(text, question_type, options, &self.images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_as_list() {
        let request: AnswerRequest = serde_json::from_str(
            r#"{"question": " 中国的首都是？ ", "options": ["北京", " 上海 ", "", null], "type": 0}"#,
        )
        .unwrap();
        let question = request.into_question().unwrap();
        assert_eq!(question.text, "中国的首都是？");
        assert_eq!(question.options, vec!["北京", "上海"]);
        assert_eq!(question.question_type, QuestionType::Single);
    }

    #[test]
    fn test_options_as_newline_string() {
        let request: AnswerRequest = serde_json::from_str(
            r#"{"question": "哪些是直辖市", "options": "北京\n上海\n\n 广州 ", "type": 1}"#,
        )
        .unwrap();
        let question = request.into_question().unwrap();
        assert_eq!(question.options, vec!["北京", "上海", "广州"]);
        assert_eq!(question.question_type, QuestionType::Multiple);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let request: AnswerRequest = serde_json::from_str(r#"{"question": "填空：1+1=__"}"#).unwrap();
        let question = request.into_question().unwrap();
        assert_eq!(question.question_type, QuestionType::Single);
        assert!(question.options.is_empty());
    }

    #[test]
    fn test_empty_question_rejected() {
        let request: AnswerRequest = serde_json::from_str(r#"{"question": "   ", "type": 3}"#).unwrap();
        assert!(request.into_question().is_none());
    }

    #[test]
    fn test_images_passed_through() {
        let request: AnswerRequest = serde_json::from_str(
            r#"{"question": "看图", "type": 0, "images": ["https://a.com/1.png"]}"#,
        )
        .unwrap();
        let question = request.into_question().unwrap();
        assert_eq!(question.image_urls, vec!["https://a.com/1.png"]);
    }
}
