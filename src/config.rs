use std::{env, path::PathBuf, str::FromStr};

use anyhow::Result;
use config::{Config as config_config, File as config_file};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::logging;

const CONFIG_PATH: &str = "app.json";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub quote: Quote,
    #[serde(default)]
    pub dividend: Dividend,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub rank: Rank,
}

const QUOTE_HOST: &str = "QUOTE_HOST";
const QUOTE_SYMBOL_SUFFIX: &str = "QUOTE_SYMBOL_SUFFIX";
const QUOTE_PROXIES: &str = "QUOTE_PROXIES";
const QUOTE_USE_PROXY: &str = "QUOTE_USE_PROXY";

/// 報價來源 (Yahoo Finance chart API)
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Quote {
    pub host: String,
    /// 台股上市代碼後綴
    pub symbol_suffix: String,
    /// 代理網址前綴，依序嘗試，目標網址會 url encode 後接在後面
    pub proxies: Vec<String>,
    pub use_proxy: bool,
}

impl Default for Quote {
    fn default() -> Self {
        Quote {
            host: "query1.finance.yahoo.com".to_string(),
            symbol_suffix: ".TW".to_string(),
            proxies: vec![
                "https://api.allorigins.win/raw?url=".to_string(),
                "https://corsproxy.io/?".to_string(),
                "https://api.codetabs.com/v1/proxy?quest=".to_string(),
            ],
            use_proxy: true,
        }
    }
}

const DIVIDEND_URL: &str = "DIVIDEND_URL";

/// 除權除息預告表來源
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Dividend {
    pub url: String,
}

impl Default for Dividend {
    fn default() -> Self {
        Dividend {
            url: "https://openapi.twse.com.tw/v1/exchangeReport/TWT48U_ALL".to_string(),
        }
    }
}

const CACHE_PATH: &str = "CACHE_PATH";
const CACHE_PRICE_FRESH_SECS: &str = "CACHE_PRICE_FRESH_SECS";
const CACHE_DIVIDEND_FRESH_SECS: &str = "CACHE_DIVIDEND_FRESH_SECS";
const CACHE_STALE_SECS: &str = "CACHE_STALE_SECS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Cache {
    pub path: PathBuf,
    /// 股價在這段時間內直接使用快取
    pub price_fresh_secs: u64,
    /// 配息資料在這段時間內直接使用快取
    pub dividend_fresh_secs: u64,
    /// 網路失敗時可接受的最舊快取
    pub stale_secs: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Cache {
            path: PathBuf::from("cache/local_storage.json"),
            price_fresh_secs: 10 * 60,
            dividend_fresh_secs: 24 * 60 * 60,
            stale_secs: 7 * 24 * 60 * 60,
        }
    }
}

const RANK_MAX_RETRIES: &str = "RANK_MAX_RETRIES";
const RANK_FETCH_DELAY_MS: &str = "RANK_FETCH_DELAY_MS";
const RANK_RETRY_DELAY_MS: &str = "RANK_RETRY_DELAY_MS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Rank {
    pub max_retries: u32,
    /// 每檔之間暫停，避免 API 限流
    pub fetch_delay_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for Rank {
    fn default() -> Self {
        Rank {
            max_retries: 3,
            fetch_delay_ms: 300,
            retry_delay_ms: 500,
        }
    }
}

pub static SETTINGS: Lazy<App> = Lazy::new(|| match App::get() {
    Ok(app) => app,
    Err(why) => {
        logging::error_file_async(format!(
            "I can't read the config context because {:?}",
            why
        ));
        App::default().override_with_env()
    }
});

impl App {
    fn get() -> Result<Self> {
        let config_path = config_path();
        if config_path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize()?;
            return Ok(config.override_with_env());
        }

        Ok(App::default().override_with_env())
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(self) -> Self {
        self.override_with(|key| env::var(key).ok())
    }

    fn override_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(QUOTE_HOST) {
            self.quote.host = host;
        }

        if let Some(suffix) = lookup(QUOTE_SYMBOL_SUFFIX) {
            self.quote.symbol_suffix = suffix;
        }

        if let Some(proxies) = lookup(QUOTE_PROXIES) {
            self.quote.proxies = split_list(&proxies);
        }

        override_parsed(&lookup, QUOTE_USE_PROXY, &mut self.quote.use_proxy);

        if let Some(url) = lookup(DIVIDEND_URL) {
            self.dividend.url = url;
        }

        if let Some(path) = lookup(CACHE_PATH) {
            self.cache.path = PathBuf::from(path);
        }

        override_parsed(&lookup, CACHE_PRICE_FRESH_SECS, &mut self.cache.price_fresh_secs);
        override_parsed(&lookup, CACHE_DIVIDEND_FRESH_SECS, &mut self.cache.dividend_fresh_secs);
        override_parsed(&lookup, CACHE_STALE_SECS, &mut self.cache.stale_secs);
        override_parsed(&lookup, RANK_MAX_RETRIES, &mut self.rank.max_retries);
        override_parsed(&lookup, RANK_FETCH_DELAY_MS, &mut self.rank.fetch_delay_ms);
        override_parsed(&lookup, RANK_RETRY_DELAY_MS, &mut self.rank.retry_delay_ms);

        self
    }
}

/// 解析失敗時保留原本的值
fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match T::from_str(raw.trim()) {
            Ok(value) => *target = value,
            Err(_) => {
                logging::warn_file_async(format!("Ignore {}={} because it can't be parsed", key, raw));
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}
