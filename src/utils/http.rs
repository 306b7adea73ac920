use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, ClientBuilder};
use tracing::{info, warn};

/// 创建翻译请求使用的 HTTP 客户端
///
/// 依次尝试：完整配置（rustls）→ 简化 TLS 配置 → 默认客户端，保证总能拿到一个可用实例。
/// 客户端只限制建立连接的时间；整体超时由各请求自行设置，流式响应改用读取空闲超时。
pub fn create_http_client_with_fallback(connect_timeout: Duration) -> Client {
    // 显式禁用压缩，流式响应需要原样逐块到达
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    match ClientBuilder::new()
        .connect_timeout(connect_timeout)
        .use_rustls_tls()
        .default_headers(headers.clone())
        .build()
    {
        Ok(client) => {
            info!(
                "[Http] 客户端创建成功: 完整配置（连接超时{}s，rustls TLS）",
                connect_timeout.as_secs()
            );
            return client;
        }
        Err(e) => warn!("[Http] 完整配置客户端创建失败: {}", e),
    }

    match ClientBuilder::new()
        .connect_timeout(connect_timeout)
        .default_headers(headers)
        .build()
    {
        Ok(client) => {
            info!("[Http] 客户端创建成功: 简化TLS配置");
            client
        }
        Err(e) => {
            warn!("[Http] 简化配置客户端创建失败，使用默认客户端: {}", e);
            Client::new()
        }
    }
}
