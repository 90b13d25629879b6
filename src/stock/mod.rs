//! 股價、配息與殖利率的取得流程。
//!
//! 每個查詢都採用相同的兩層快取策略：
//! 1. 非強制更新時，新鮮的快取直接回傳。
//! 2. 否則連網取得，成功就寫回快取。
//! 3. 連網失敗時退回仍在保留期限內的舊快取。
//! 4. 都沒有時回報失敗。

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use hashbrown::HashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{CacheLookup, LocalStorage},
    calculation::dividend_yield::Yields,
    config::{self, SETTINGS},
    crawler::{self, twse::dividend::ExRightDividend, QuoteSource, RemoteSource, StockQuote},
    declare::{CacheState, DividendStatus},
    logging,
    util::map::{self, Keyable},
};

/// 除權除息預告表在本地快取中的鍵名
pub const DIVIDEND_LIST_KEY: &str = "DividendList";

const PRICE_FAILED_MESSAGE: &str = "無法獲取股票資料，請確認股票代碼是否正確";

/// 股價查詢結果
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriceResult {
    pub success: bool,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    /// 最後成交時間 (Unix 秒)
    pub timestamp: Option<i64>,
    pub state: CacheState,
    /// 資料寫入快取的時間 (Unix 毫秒)
    pub saved_at: Option<i64>,
    pub message: Option<String>,
}

impl PriceResult {
    fn from_quote(quote: StockQuote, state: CacheState, saved_at: Option<i64>) -> Self {
        PriceResult {
            success: true,
            code: quote.code,
            name: quote.name,
            price: quote.price,
            timestamp: quote.timestamp,
            state,
            saved_at,
            message: None,
        }
    }

    fn failed(code: &str, message: &str) -> Self {
        PriceResult {
            success: false,
            code: code.to_string(),
            name: code.to_string(),
            price: Decimal::ZERO,
            timestamp: None,
            state: CacheState::Live,
            saved_at: None,
            message: Some(message.to_string()),
        }
    }
}

/// 單一股票的配息配股資訊
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DividendInfo {
    pub code: String,
    /// 現金股利 (元)
    pub cash: Decimal,
    /// 股票股利 (每股配股數)
    pub stock: Decimal,
    /// 除權除息日
    pub date: Option<NaiveDate>,
    pub status: DividendStatus,
}

impl DividendInfo {
    pub fn unknown(code: &str) -> Self {
        DividendInfo {
            code: code.to_string(),
            cash: Decimal::ZERO,
            stock: Decimal::ZERO,
            date: None,
            status: DividendStatus::Unknown,
        }
    }

    /// 從預告表中找出指定股票的配息資料
    ///
    /// 有現金股利金額的列優先；只有「息」類別沒有金額時，僅回傳除息日。
    pub fn from_rows(code: &str, rows: &[ExRightDividend]) -> Self {
        let mut same_code = rows.iter().filter(|row| row.code.trim() == code);

        if let Some(row) = same_code.clone().find(|row| row.has_cash_dividend()) {
            return DividendInfo {
                code: code.to_string(),
                cash: row.cash(),
                stock: row.stock(),
                date: row.ex_date(),
                status: DividendStatus::Confirmed,
            };
        }

        if let Some(row) = same_code.find(|row| row.is_ex_dividend()) {
            return DividendInfo {
                code: code.to_string(),
                cash: Decimal::ZERO,
                stock: Decimal::ZERO,
                date: row.ex_date(),
                status: DividendStatus::Announced,
            };
        }

        Self::unknown(code)
    }
}

/// 股價合併配息與殖利率的完整資訊
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StockFullInfo {
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub price_timestamp: Option<i64>,
    pub price_state: CacheState,
    pub cash_dividend: Decimal,
    pub stock_dividend: Decimal,
    pub cash_yield: Decimal,
    pub stock_yield: Decimal,
    pub total_yield: Decimal,
    pub dividend_date: Option<NaiveDate>,
    pub dividend_status: DividendStatus,
}

impl StockFullInfo {
    pub fn merge(price: &PriceResult, dividend: &DividendInfo) -> Self {
        let yields = Yields::new(price.price, dividend.cash, dividend.stock);

        StockFullInfo {
            code: price.code.clone(),
            name: price.name.clone(),
            price: price.price,
            price_timestamp: price.timestamp,
            price_state: price.state,
            cash_dividend: dividend.cash,
            stock_dividend: dividend.stock,
            cash_yield: yields.cash,
            stock_yield: yields.stock,
            total_yield: yields.total,
            dividend_date: dividend.date,
            dividend_status: dividend.status,
        }
    }

    pub fn yields(&self) -> Yields {
        Yields {
            cash: self.cash_yield,
            stock: self.stock_yield,
            total: self.total_yield,
        }
    }

    pub fn is_cache(&self) -> bool {
        self.price_state.is_cache()
    }
}

/// 依股票代碼索引的預告表
type DividendIndex = HashMap<String, Vec<ExRightDividend>>;

/// 取一次預告表後可重複查詢多檔股票
#[derive(Debug, Clone, Default)]
pub struct DividendBook {
    index: Option<Arc<DividendIndex>>,
}

impl DividendBook {
    pub fn lookup(&self, code: &str) -> DividendInfo {
        match &self.index {
            Some(index) => match index.get(code) {
                Some(rows) => DividendInfo::from_rows(code, rows),
                None => DividendInfo::unknown(code),
            },
            None => DividendInfo::unknown(code),
        }
    }
}

/// 股票資料查詢服務
pub struct StockService<S: QuoteSource> {
    source: S,
    storage: Arc<LocalStorage>,
    settings: config::Cache,
    /// 解析後的預告表，以快取寫入時間為鍵，避免每檔股票都重新反序列化整張表
    dividend_index: moka::sync::Cache<i64, Arc<DividendIndex>>,
}

impl StockService<RemoteSource> {
    /// 依設定檔建立連到正式來源的服務
    pub fn remote() -> Self {
        let storage = Arc::new(LocalStorage::open(&SETTINGS.cache.path));
        StockService::new(RemoteSource::from_settings(), storage, SETTINGS.cache.clone())
    }
}

impl<S: QuoteSource> StockService<S> {
    pub fn new(source: S, storage: Arc<LocalStorage>, settings: config::Cache) -> Self {
        StockService {
            source,
            storage,
            dividend_index: moka::sync::Cache::builder()
                .max_capacity(4)
                .time_to_live(Duration::from_secs(settings.dividend_fresh_secs.max(1)))
                .build(),
            settings,
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    fn price_fresh(&self) -> Duration {
        Duration::from_secs(self.settings.price_fresh_secs)
    }

    fn dividend_fresh(&self) -> Duration {
        Duration::from_secs(self.settings.dividend_fresh_secs)
    }

    fn stale(&self) -> Duration {
        Duration::from_secs(self.settings.stale_secs)
    }

    /// 取得股價
    pub async fn fetch_stock_price(&self, code: &str, force_refresh: bool) -> PriceResult {
        let key = crawler::price_key(code);
        let cached: CacheLookup<StockQuote> =
            self.storage.lookup(&key, self.price_fresh(), self.stale());

        if !force_refresh {
            if let CacheLookup::Fresh { value, saved_at } = cached {
                return PriceResult::from_quote(value, CacheState::Fresh, Some(saved_at));
            }
        }

        match self.source.fetch_price(code).await {
            Ok(quote) => {
                let saved_at = match self.storage.store(&quote.key_with_prefix(), &quote) {
                    Ok(saved_at) => Some(saved_at),
                    Err(why) => {
                        logging::error_file_async(format!(
                            "Failed to store {} because {:?}",
                            key, why
                        ));
                        None
                    }
                };

                PriceResult::from_quote(quote, CacheState::Live, saved_at)
            }
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to fetch_price({}) because {:?}",
                    code, why
                ));

                match cached {
                    CacheLookup::Fresh { value, saved_at } => {
                        PriceResult::from_quote(value, CacheState::Fresh, Some(saved_at))
                    }
                    CacheLookup::Stale { value, saved_at } => {
                        logging::warn_file_async(format!("{} 使用舊快取股價", code));
                        PriceResult::from_quote(value, CacheState::Stale, Some(saved_at))
                    }
                    CacheLookup::Miss => PriceResult::failed(code, PRICE_FAILED_MESSAGE),
                }
            }
        }
    }

    /// 取得整張除權除息預告表，回傳表格與其快取時間
    async fn dividend_rows(&self, force_refresh: bool) -> Option<(Vec<ExRightDividend>, i64)> {
        let cached: CacheLookup<Vec<ExRightDividend>> =
            self.storage
                .lookup(DIVIDEND_LIST_KEY, self.dividend_fresh(), self.stale());

        if !force_refresh && cached.is_fresh() {
            return cached.into_any();
        }

        match self.source.fetch_dividends().await {
            Ok(rows) => match self.storage.store(DIVIDEND_LIST_KEY, &rows) {
                Ok(saved_at) => Some((rows, saved_at)),
                Err(why) => {
                    logging::error_file_async(format!(
                        "Failed to store {} because {:?}",
                        DIVIDEND_LIST_KEY, why
                    ));
                    Some((rows, 0))
                }
            },
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to fetch_dividends because {:?}",
                    why
                ));
                cached.into_any()
            }
        }
    }

    async fn dividend_index(&self, force_refresh: bool) -> Option<Arc<DividendIndex>> {
        if !force_refresh {
            if let Some(entry) = self.storage.get_entry(DIVIDEND_LIST_KEY) {
                if let Some(index) = self.dividend_index.get(&entry.saved_at) {
                    let age = chrono::Local::now().timestamp_millis() - entry.saved_at;
                    if age >= 0 && (age as u128) <= self.dividend_fresh().as_millis() {
                        return Some(index);
                    }
                }
            }
        }

        let (rows, saved_at) = self.dividend_rows(force_refresh).await?;
        // 寫入失敗時 saved_at 為 0，不留在記憶體中
        if saved_at == 0 {
            return Some(Arc::new(map::group_by_key(rows)));
        }

        let index = self
            .dividend_index
            .get_with(saved_at, || Arc::new(map::group_by_key(rows)));

        Some(index)
    }

    /// 取得預告表；網路與快取都沒有時回傳空的 [`DividendBook`]
    pub async fn dividend_book(&self, force_refresh: bool) -> DividendBook {
        let index = self.dividend_index(force_refresh).await;
        if index.is_none() {
            logging::warn_file_async("沒有可用的除權除息預告表");
        }

        DividendBook { index }
    }

    /// 取得配息配股資訊；預告表無法取得時視為無資料
    pub async fn fetch_stock_dividend(&self, code: &str, force_refresh: bool) -> DividendInfo {
        self.dividend_book(force_refresh).await.lookup(code)
    }

    /// 取得股價並合併配息與殖利率
    pub async fn fetch_stock_full_info(
        &self,
        code: &str,
        force_refresh: bool,
    ) -> Result<StockFullInfo> {
        let price = self.fetch_price_or_err(code, force_refresh).await?;
        let dividend = self.fetch_stock_dividend(code, force_refresh).await;

        Ok(StockFullInfo::merge(&price, &dividend))
    }

    /// 以已取得的預告表合併，`force_refresh` 只作用在股價
    pub async fn fetch_stock_full_info_with(
        &self,
        code: &str,
        force_refresh: bool,
        book: &DividendBook,
    ) -> Result<StockFullInfo> {
        let price = self.fetch_price_or_err(code, force_refresh).await?;

        Ok(StockFullInfo::merge(&price, &book.lookup(code)))
    }

    async fn fetch_price_or_err(&self, code: &str, force_refresh: bool) -> Result<PriceResult> {
        let price = self.fetch_stock_price(code, force_refresh).await;
        if !price.success {
            return Err(anyhow!(
                "{}: {}",
                code,
                price.message.unwrap_or_else(|| PRICE_FAILED_MESSAGE.to_string())
            ));
        }

        Ok(price)
    }
}
