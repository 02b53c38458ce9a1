//! 提示词构建
//!
//! 按题型生成带输出格式约束的提示词。纯函数，不依赖任何外部状态。

use crate::models::{QuestionType, DEFAULT_JUDGEMENT_OPTIONS};

const ROLE_FRAMING: &str = "你是一个专业的在线考试答题助手，请严格按照要求回答。";

const SYSTEM_MESSAGE: &str =
    "你是一个专业的答题助手。请严格按照要求的格式回答，只输出答案内容，不要有任何解释或额外文字。";

const SYSTEM_MESSAGE_WITH_IMAGES: &str = "你是一个专业的答题助手，能够理解题目中的图片内容。\
请结合图片仔细分析题目，严格按照要求的格式回答，只输出答案内容，不要有任何解释或额外文字。";

/// 提示词构建器
pub struct PromptComposer;

impl PromptComposer {
    /// 系统消息，带图片时提示模型结合图片作答
    pub fn system_message(with_images: bool) -> &'static str {
        if with_images {
            SYSTEM_MESSAGE_WITH_IMAGES
        } else {
            SYSTEM_MESSAGE
        }
    }

    /// 根据题型构建提示词
    pub fn build(text: &str, options: &[String], question_type: QuestionType) -> String {
        match question_type {
            QuestionType::Single => Self::single(text, options),
            QuestionType::Multiple => Self::multiple(text, options),
            QuestionType::Judgement => Self::judgement(text, options),
            QuestionType::Completion => Self::completion(text),
            QuestionType::Unknown => Self::generic(text, options),
        }
    }

    fn single(text: &str, options: &[String]) -> String {
        format!(
            "{ROLE_FRAMING}\n\n\
             【题目类型】单选题（只能选择一个正确答案）\n\n\
             【题目】\n{text}\n\n\
             【选项】\n{options}\n\n\
             【回答要求】\n\
             1. 仔细分析题目和所有选项\n\
             2. 只选择一个最正确的答案\n\
             3. 必须从给定的选项中选择，不能自己编造\n\
             4. 回答格式：直接输出选项内容，不要包含A、B、C等标识符\n\
             5. 只输出答案内容，不要有任何解释、分析或额外文字\n\n\
             【示例】\n如果正确答案是选项\"北京\"，则只输出：北京\n\n\
             现在请回答上述题目：",
            options = lettered(options),
        )
    }

    fn multiple(text: &str, options: &[String]) -> String {
        format!(
            "{ROLE_FRAMING}\n\n\
             【题目类型】多选题（可能有多个正确答案）\n\n\
             【题目】\n{text}\n\n\
             【选项】\n{options}\n\n\
             【回答要求】\n\
             1. 仔细分析题目，找出所有正确的选项\n\
             2. 多选题通常有2个或以上的正确答案\n\
             3. 必须从给定的选项中选择，不能自己编造\n\
             4. 多个答案之间用井号#分隔，按选项原有顺序排列\n\
             5. 回答格式：选项1#选项2#选项3（不要包含A、B、C等标识符）\n\
             6. 只输出答案内容，不要有任何解释、分析或额外文字\n\n\
             【示例】\n如果正确答案是\"北京\"和\"上海\"两个选项，则输出：北京#上海\n\n\
             现在请回答上述题目：",
            options = lettered(options),
        )
    }

    fn judgement(text: &str, options: &[String]) -> String {
        let choices = if options.is_empty() {
            DEFAULT_JUDGEMENT_OPTIONS.join(" / ")
        } else {
            options.join("\n")
        };
        format!(
            "{ROLE_FRAMING}\n\n\
             【题目类型】判断题（判断对错/是否）\n\n\
             【题目】\n{text}\n\n\
             【可选答案】\n{choices}\n\n\
             【回答要求】\n\
             1. 仔细分析题目陈述是否正确\n\
             2. 必须从给定的可选答案中选择（如：正确/错误、对/错、是/否、√/×等）\n\
             3. 只输出一个判断结果\n\
             4. 不要有任何解释、分析或额外文字\n\n\
             【示例】\n如果题目陈述正确，且可选答案中有\"正确\"，则输出：正确\n\n\
             现在请判断上述题目："
        )
    }

    fn completion(text: &str) -> String {
        format!(
            "{ROLE_FRAMING}\n\n\
             【题目类型】填空题\n\n\
             【题目】\n{text}\n\n\
             【回答要求】\n\
             1. 仔细理解题目要求\n\
             2. 给出准确、简洁的答案\n\
             3. 如果有多个空，答案之间用井号#分隔\n\
             4. 答案要具体、准确，避免模糊表述\n\
             5. 只输出答案内容，不要有序号、解释或额外文字\n\n\
             【示例】\n\
             - 单空题：如果答案是\"北京\"，则输出：北京\n\
             - 多空题：如果答案是\"氢\"和\"氧\"，则输出：氢#氧\n\n\
             现在请回答上述填空题："
        )
    }

    fn generic(text: &str, options: &[String]) -> String {
        let options = if options.is_empty() {
            "无固定选项".to_string()
        } else {
            options
                .iter()
                .map(|opt| format!("- {}", opt))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "请回答以下问题：\n\n\
             【题目】\n{text}\n\n\
             【选项】\n{options}\n\n\
             【要求】\n\
             1. 给出准确的答案\n\
             2. 如果有多个答案，用#分隔\n\
             3. 只输出答案，不要解释\n\n\
             请回答："
        )
    }
}

/// 选项编号 A. B. C. ...，超过 26 个时用 A27 形式
fn lettered(options: &[String]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, opt)| format!("{}. {}", option_label(i), opt))
        .collect::<Vec<_>>()
        .join("\n")
}

fn option_label(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => format!("A{}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_lettered_options() {
        let prompt = PromptComposer::build("中国的首都是？", &opts(&["北京", "上海"]), QuestionType::Single);
        assert!(prompt.contains("【题目类型】单选题"));
        assert!(prompt.contains("中国的首都是？"));
        assert!(prompt.contains("A. 北京\nB. 上海"));
        assert!(prompt.contains("不要包含A、B、C等标识符"));
    }

    #[test]
    fn test_multiple_hash_contract() {
        let prompt = PromptComposer::build("直辖市有", &opts(&["北京", "上海", "广州"]), QuestionType::Multiple);
        assert!(prompt.contains("C. 广州"));
        assert!(prompt.contains("井号#分隔"));
    }

    #[test]
    fn test_judgement_default_set() {
        let prompt = PromptComposer::build("地球是圆的", &[], QuestionType::Judgement);
        assert!(prompt.contains("正确 / 错误"));

        let prompt = PromptComposer::build("地球是圆的", &opts(&["对", "错"]), QuestionType::Judgement);
        assert!(prompt.contains("【可选答案】\n对\n错"));
    }

    #[test]
    fn test_completion_has_no_options() {
        let prompt = PromptComposer::build("1+1=__", &opts(&["忽略"]), QuestionType::Completion);
        assert!(prompt.contains("【题目类型】填空题"));
        assert!(!prompt.contains("忽略"));
    }

    #[test]
    fn test_generic_prompt() {
        let prompt = PromptComposer::build("随便问问", &[], QuestionType::Unknown);
        assert!(prompt.contains("无固定选项"));
        assert!(prompt.contains("用#分隔"));
    }

    #[test]
    fn test_deterministic() {
        let options = opts(&["甲", "乙"]);
        assert_eq!(
            PromptComposer::build("题", &options, QuestionType::Single),
            PromptComposer::build("题", &options, QuestionType::Single)
        );
    }

    #[test]
    fn test_option_label_overflow() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "A27");
    }

    #[test]
    fn test_system_message_variants() {
        assert_ne!(PromptComposer::system_message(true), PromptComposer::system_message(false));
        assert!(PromptComposer::system_message(true).contains("图片"));
    }
}
