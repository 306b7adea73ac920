use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use word_translator::logging::init_logging;
use word_translator::panel::{Point, SelectionOutcome, TerminalPresenter};
use word_translator::relay::ExtensionMessage;
use word_translator::runtime::ExtensionRuntime;
use word_translator::settings::ExtensionSettings;

const DEMO_TAB: u32 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config_path = std::env::var("WORD_TRANSLATOR_CONFIG")
        .ok()
        .map(PathBuf::from);
    let settings = ExtensionSettings::load(config_path.as_deref())?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let validate_only = args.first().map(String::as_str) == Some("--validate-key");
    if validate_only {
        args.remove(0);
    }

    let mut runtime = ExtensionRuntime::start(settings.clone());

    if validate_only {
        let api_key = args.first().cloned().unwrap_or_else(|| settings.glm_api_key.clone());
        let response = runtime
            .popup_client()
            .send_message(&ExtensionMessage::ValidateGlmApiKey { api_key })
            .await?;
        println!(
            "{}",
            if response.valid == Some(true) { "API密钥有效" } else { "API密钥无效" }
        );
        runtime.shutdown();
        return Ok(());
    }

    let text = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("读取标准输入失败")?;
        buf
    } else {
        args.join(" ")
    };

    let (presenter, mut done) = TerminalPresenter::new();
    let tab = runtime.open_tab(DEMO_TAB, Box::new(presenter));

    match tab.translate_selection(&text, Point::default()).await {
        SelectionOutcome::Disabled => anyhow::bail!("扩展已禁用"),
        SelectionOutcome::InvalidSelection => {
            anyhow::bail!("无效的选中文本（需要 1-{} 个字符，且最多 3 行）", settings.max_selection_length)
        }
        _ => {}
    }

    // 等待打字机把队列播放完
    let wait_limit = Duration::from_secs(settings.request_timeout_secs.max(1) * 2);
    tokio::time::timeout(wait_limit, done.wait_for(|finished| *finished))
        .await
        .context("等待翻译结果超时")?
        .context("浮窗已关闭")?;

    runtime.shutdown();
    Ok(())
}
