use anyhow::{anyhow, Result};
use async_trait::async_trait;
use concat_string::concat_string;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::{self, SETTINGS},
    logging,
    util::{http, map::Keyable},
};

/// 台灣證券交易所
pub mod twse;
/// 雅虎財經
pub mod yahoo;

/// 單一股票的即時報價
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StockQuote {
    pub code: String,
    pub name: String,
    /// 最後成交價
    pub price: Decimal,
    /// 最後成交時間 (Unix 秒)
    pub timestamp: Option<i64>,
}

impl Keyable for StockQuote {
    fn key(&self) -> String {
        self.code.clone()
    }

    fn key_with_prefix(&self) -> String {
        price_key(&self.code)
    }
}

/// 股價在本地快取中的鍵名
pub fn price_key(code: &str) -> String {
    format!("StockPrice:{}", code)
}

/// 股價與配息資料的來源
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_price(&self, code: &str) -> Result<StockQuote>;
    async fn fetch_dividends(&self) -> Result<Vec<twse::dividend::ExRightDividend>>;
}

/// 連到 Yahoo 與證交所的正式來源
#[derive(Debug, Clone)]
pub struct RemoteSource {
    quote: config::Quote,
    dividend: config::Dividend,
}

impl RemoteSource {
    pub fn new(quote: config::Quote, dividend: config::Dividend) -> Self {
        RemoteSource { quote, dividend }
    }

    pub fn from_settings() -> Self {
        Self::new(SETTINGS.quote.clone(), SETTINGS.dividend.clone())
    }

    fn proxies(&self) -> &[String] {
        if self.quote.use_proxy {
            &self.quote.proxies
        } else {
            &[]
        }
    }
}

#[async_trait]
impl QuoteSource for RemoteSource {
    async fn fetch_price(&self, code: &str) -> Result<StockQuote> {
        yahoo::price::visit(&self.quote, code, self.proxies()).await
    }

    async fn fetch_dividends(&self) -> Result<Vec<twse::dividend::ExRightDividend>> {
        twse::dividend::visit(&self.dividend.url, self.proxies()).await
    }
}

/// 代理網址：前綴後接 url encode 過的目標網址
pub fn proxied_url(proxy: &str, target: &str) -> String {
    concat_string!(proxy, urlencoding::encode(target))
}

/// 先直連，失敗時依序透過代理取得 JSON，第一個成功的結果即回傳
pub async fn fetch_json_via_proxies<RES: DeserializeOwned>(
    url: &str,
    proxies: &[String],
) -> Result<RES> {
    let targets = std::iter::once(url.to_string())
        .chain(proxies.iter().map(|proxy| proxied_url(proxy, url)));
    let mut attempts = 0;
    let mut last_error = None;

    for target in targets {
        attempts += 1;
        match http::get_json::<RES>(&target).await {
            Ok(res) => return Ok(res),
            Err(why) => {
                logging::warn_file_async(format!("Failed to fetch {} because {:?}", target, why));
                last_error = Some(why);
            }
        }
    }

    Err(anyhow!(
        "Failed to fetch {} after {} attempts; last error: {:?}",
        url,
        attempts,
        last_error
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    #[test]
    fn test_proxied_url() {
        assert_eq!(
            proxied_url(
                "https://api.allorigins.win/raw?url=",
                "https://query1.finance.yahoo.com/v8/finance/chart/2881.TW"
            ),
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fquery1.finance.yahoo.com%2Fv8%2Ffinance%2Fchart%2F2881.TW"
        );
    }

    #[test]
    fn test_price_key() {
        let quote = StockQuote {
            code: "2884".to_string(),
            name: "2884".to_string(),
            price: Decimal::from(30),
            timestamp: None,
        };
        assert_eq!(quote.key_with_prefix(), "StockPrice:2884");
    }

    #[test]
    fn test_remote_source_without_proxy() {
        let quote = config::Quote {
            use_proxy: false,
            ..Default::default()
        };
        let source = RemoteSource::new(quote, Default::default());
        assert!(source.proxies().is_empty());
    }

    /// 本機假代理：每個連線只回應一次 JSON，並記錄收到的請求路徑
    async fn serve_json(body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&buf).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or_default().to_string();
                log.lock().unwrap().push(path);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn test_first_working_proxy_wins() {
        let (base, seen) = serve_json(r#"{"price":88.5}"#).await;
        let proxies = vec![
            format!("{}/first?url=", base),
            format!("{}/second?url=", base),
        ];

        let value = fetch_json_via_proxies::<serde_json::Value>("http://127.0.0.1:1/chart", &proxies)
            .await
            .unwrap();
        assert_eq!(value["price"], serde_json::json!(88.5));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["/first?url=http%3A%2F%2F127.0.0.1%3A1%2Fchart".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_json_via_proxies_counts_attempts() {
        let proxies = vec!["http://127.0.0.1:1/?u=".to_string()];
        let err = fetch_json_via_proxies::<serde_json::Value>("http://127.0.0.1:1/chart", &proxies)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"), "{}", err);
    }
}
