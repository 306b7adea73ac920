//! 语言代码、名称表与简单的语言检测

/// 支持的语言（代码，本地名称）
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("auto", "自动检测"),
    ("zh-CN", "中文(简体)"),
    ("zh-TW", "中文(繁体)"),
    ("en", "English"),
    ("ja", "日本語"),
    ("ko", "한국어"),
    ("fr", "Français"),
    ("de", "Deutsch"),
    ("es", "Español"),
    ("ru", "Русский"),
    ("ar", "العربية"),
    ("pt", "Português"),
    ("it", "Italiano"),
    ("th", "ไทย"),
    ("vi", "Tiếng Việt"),
];

/// 提示词里使用的语言名称；未知代码原样返回
pub fn prompt_language_name(code: &str) -> &str {
    match code {
        "auto" => "the detected source language",
        "zh-CN" => "Simplified Chinese",
        "zh-TW" => "Traditional Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "ar" => "Arabic",
        "pt" => "Portuguese",
        "it" => "Italian",
        "th" => "Thai",
        "vi" => "Vietnamese",
        other => other,
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

fn is_kana(c: char) -> bool {
    ('\u{3040}'..='\u{30ff}').contains(&c)
}

fn is_hangul(c: char) -> bool {
    ('\u{ac00}'..='\u{d7a3}').contains(&c)
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

pub fn contains_chinese(text: &str) -> bool {
    text.chars().any(is_cjk_ideograph)
}

/// 是否至少包含一个拉丁字母或汉字
pub fn has_letter(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_ascii_alphabetic() || is_cjk_ideograph(c))
}

/// 粗略的语言检测，按脚本判断
pub fn detect_language(text: &str) -> &'static str {
    if contains_chinese(text) {
        "zh-CN"
    } else if text.chars().any(is_cyrillic) {
        "ru"
    } else if text.chars().any(is_kana) {
        "ja"
    } else if text.chars().any(is_hangul) {
        "ko"
    } else {
        "en"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("今天天气真好。"), "zh-CN");
        assert_eq!(detect_language("Привет"), "ru");
        assert_eq!(detect_language("ひらがな"), "ja");
        assert_eq!(detect_language("안녕하세요"), "ko");
        assert_eq!(detect_language("hello"), "en");
        assert_eq!(detect_language("12345"), "en");
    }

    #[test]
    fn test_prompt_language_names() {
        let known = SUPPORTED_LANGUAGES
            .iter()
            .filter(|(code, _)| prompt_language_name(code) != *code)
            .count();
        assert_eq!(known, SUPPORTED_LANGUAGES.len());
        assert_eq!(prompt_language_name("sw"), "sw");
    }

    #[test]
    fn test_has_letter() {
        assert!(has_letter("abc"));
        assert!(has_letter("中文"));
        assert!(!has_letter("123 !?"));
    }
}
