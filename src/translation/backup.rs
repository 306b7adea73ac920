//! 本地备用翻译：不联网，只做最简单的占位处理

use async_trait::async_trait;

use super::error::TranslationError;
use super::language::contains_chinese;
use super::types::{TranslationRequest, TranslationResult};
use super::Translator;

pub const BACKUP_PREFIX: &str = "[备用翻译] ";

#[derive(Debug, Default, Clone, Copy)]
pub struct BackupTranslator;

#[async_trait]
impl Translator for BackupTranslator {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResult, TranslationError> {
        let text = request.text();
        let target = request.target_language();
        let is_chinese = contains_chinese(text);

        let (translated, source) = if is_chinese && target == "en" {
            (format!("{}{}", BACKUP_PREFIX, text), "zh-CN".to_string())
        } else if !is_chinese && target == "zh-CN" {
            (format!("{}{}", BACKUP_PREFIX, text), "en".to_string())
        } else {
            (text.to_string(), request.source_language().to_string())
        };

        Ok(TranslationResult {
            original_text: text.to_string(),
            translated_text: translated,
            source_language: Some(source),
            target_language: Some(target.to_string()),
            pronunciation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::types::Provider;

    async fn run(text: &str, target: &str) -> TranslationResult {
        let req = TranslationRequest::new(text, "auto", target, Provider::Backup).unwrap();
        BackupTranslator.translate(&req).await.unwrap()
    }

    #[tokio::test]
    async fn test_placeholder_pairs() {
        let r = run("今天天气真好。", "en").await;
        assert_eq!(r.translated_text, "[备用翻译] 今天天气真好。");
        assert_eq!(r.source_language.as_deref(), Some("zh-CN"));

        let r = run("good morning", "zh-CN").await;
        assert_eq!(r.translated_text, "[备用翻译] good morning");
        assert_eq!(r.source_language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_other_pairs_echo() {
        let r = run("good morning", "ja").await;
        assert_eq!(r.translated_text, "good morning");
        assert_eq!(r.source_language.as_deref(), Some("auto"));
    }
}
