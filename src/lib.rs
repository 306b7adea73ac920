// Word Translator library entry
// 划词翻译：流式翻译管线、跨上下文中继与打字机浮窗。
// 浏览器的后台/标签页上下文以 tokio 任务表示，彼此只通过消息通道通信。

pub mod logging;
pub mod panel;
pub mod providers;
pub mod relay;
pub mod runtime;
pub mod settings;
pub mod translation;
pub mod utils;

pub use settings::ExtensionSettings;
pub use translation::{TranslationError, TranslationResult, TranslationService};
