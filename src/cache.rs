//! 本地快取模組。
//!
//! [`LocalStorage`] 是以 JSON 檔案保存的鍵值儲存，每筆資料都帶有寫入時間。
//! 讀取時依資料年齡分為兩層：
//! 1. 新鮮 (`fresh_ttl` 內)：可直接使用，不必連網。
//! 2. 過期但仍可用 (`stale_ttl` 內)：只在網路取得失敗時當作退路。
//!
//! 超過 `stale_ttl` 或內容無法反序列化的資料視同不存在。

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::logging;

/// 一筆快取資料
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// 寫入時間 (Unix 毫秒)
    pub saved_at: i64,
    pub value: serde_json::Value,
}

/// 依資料年齡分類的查詢結果
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Fresh { value: T, saved_at: i64 },
    Stale { value: T, saved_at: i64 },
    Miss,
}

impl<T> CacheLookup<T> {
    /// 不論新舊，只要有資料就取出
    pub fn into_any(self) -> Option<(T, i64)> {
        match self {
            CacheLookup::Fresh { value, saved_at } | CacheLookup::Stale { value, saved_at } => {
                Some((value, saved_at))
            }
            CacheLookup::Miss => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheLookup::Fresh { .. })
    }
}

/// 以 JSON 檔保存的鍵值快取
pub struct LocalStorage {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl LocalStorage {
    /// 開啟快取檔，檔案不存在或內容損毀時從空白開始
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::read_file(&path) {
            Ok(entries) => entries,
            Err(why) => {
                logging::warn_file_async(format!(
                    "Start with an empty cache because {:?}",
                    why
                ));
                HashMap::new()
            }
        };

        LocalStorage {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn read_file(path: &Path) -> Result<HashMap<String, CacheEntry>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse cache file {}", path.display()))
    }

    /// 以暫存檔加 rename 的方式寫回磁碟
    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string(entries)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        match self.entries.read() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => None,
        }
    }

    pub fn lookup<T: DeserializeOwned>(
        &self,
        key: &str,
        fresh_ttl: Duration,
        stale_ttl: Duration,
    ) -> CacheLookup<T> {
        self.lookup_at(key, fresh_ttl, stale_ttl, Local::now())
    }

    pub fn lookup_at<T: DeserializeOwned>(
        &self,
        key: &str,
        fresh_ttl: Duration,
        stale_ttl: Duration,
        now: DateTime<Local>,
    ) -> CacheLookup<T> {
        let entry = match self.get_entry(key) {
            Some(entry) => entry,
            None => return CacheLookup::Miss,
        };

        let age_ms = now.timestamp_millis().saturating_sub(entry.saved_at).max(0) as u128;
        if age_ms > stale_ttl.as_millis() {
            return CacheLookup::Miss;
        }

        let value = match serde_json::from_value::<T>(entry.value) {
            Ok(value) => value,
            Err(why) => {
                logging::warn_file_async(format!(
                    "Ignore cache entry {} because {:?}",
                    key, why
                ));
                return CacheLookup::Miss;
            }
        };

        if age_ms <= fresh_ttl.as_millis() {
            CacheLookup::Fresh {
                value,
                saved_at: entry.saved_at,
            }
        } else {
            CacheLookup::Stale {
                value,
                saved_at: entry.saved_at,
            }
        }
    }

    /// 寫入並回傳寫入時間
    pub fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<i64> {
        self.store_at(key, value, Local::now())
    }

    pub fn store_at<T: Serialize>(&self, key: &str, value: &T, now: DateTime<Local>) -> Result<i64> {
        let entry = CacheEntry {
            saved_at: now.timestamp_millis(),
            value: serde_json::to_value(value)?,
        };
        let saved_at = entry.saved_at;

        self.update(|entries| {
            entries.insert(key.to_string(), entry);
        })?;

        Ok(saved_at)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        if self.get_entry(key).is_none() {
            return Ok(false);
        }

        self.update(|entries| entries.remove(key).is_some())
    }

    pub fn clear(&self) -> Result<usize> {
        self.update(|entries| {
            let count = entries.len();
            entries.clear();
            count
        })
    }

    /// 在副本上修改並寫檔，寫檔成功才換入記憶體
    fn update<R>(&self, f: impl FnOnce(&mut HashMap<String, CacheEntry>) -> R) -> Result<R> {
        let mut entries = self
            .entries
            .write()
            .map_err(|why| anyhow!("Failed to entries.write because {:?}", why))?;

        let mut next = entries.clone();
        let result = f(&mut next);
        self.persist(&next)?;
        *entries = next;

        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
