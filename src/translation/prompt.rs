/// 翻译 Prompt 构造
use serde_json::{json, Value};

use super::language::prompt_language_name;

/// 构造系统提示词：只输出译文，不附带任何解释
pub fn build_system_prompt(source_lang: &str, target_lang: &str) -> String {
    let target = prompt_language_name(target_lang);
    let source_clause = if source_lang == "auto" {
        String::new()
    } else {
        format!(" The source text is written in {}.", prompt_language_name(source_lang))
    };

    format!(
        "You are a professional translator. Translate the text provided by the user into {target}.{source_clause}\n\
         \n\
         - Preserve the meaning, tone and style of the original.\n\
         - The translation must read naturally in {target}; translate terminology precisely.\n\
         - Output ONLY the translated text. Do not add explanations, notes, quotes or formatting.\n\
         - If the text is already written in {target}, translate it into English instead.\n\
         \n\
         Example:\n\
         Input: 今天天气真好。\n\
         Output: The weather is so nice today."
    )
}

/// 构造 chat/completions 消息列表
pub fn build_messages(text: &str, source_lang: &str, target_lang: &str) -> Vec<Value> {
    vec![
        json!({
            "role": "system",
            "content": build_system_prompt(source_lang, target_lang)
        }),
        json!({
            "role": "user",
            "content": text
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_substitutes_language_names() {
        let prompt = build_system_prompt("auto", "en");
        assert!(prompt.contains("into English."));
        assert!(prompt.contains("Output ONLY the translated text"));
        assert!(!prompt.contains("source text is written"));

        let prompt = build_system_prompt("ja", "zh-TW");
        assert!(prompt.contains("Traditional Chinese"));
        assert!(prompt.contains("written in Japanese"));
    }

    #[test]
    fn test_unknown_code_passes_through() {
        let prompt = build_system_prompt("auto", "x-klingon");
        assert!(prompt.contains("into x-klingon."));
    }

    #[test]
    fn test_messages_shape() {
        let messages = build_messages("今天天气真好。", "auto", "en");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "今天天气真好。");
    }
}
