use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{
    crawler, logging,
    util::{datetime, map::Keyable, text},
};

/// 證交所開放資料「除權除息預告表」的一筆資料
///
/// 欄位皆為字串，金額未公告時為空字串。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ExRightDividend {
    /// 除權除息日期，民國年 `YYYMMDD`
    #[serde(rename = "Date", default)]
    pub date: String,
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    /// 除權息類別：息、權、權息
    #[serde(rename = "Exdividend", default)]
    pub ex_dividend: String,
    /// 無償配股率
    #[serde(rename = "StockDividendRatio", default)]
    pub stock_dividend_ratio: String,
    /// 現金股利
    #[serde(rename = "CashDividend", default)]
    pub cash_dividend: String,
}

impl ExRightDividend {
    pub fn ex_date(&self) -> Option<NaiveDate> {
        datetime::parse_roc_compact_date(&self.date)
    }

    /// 已公告現金股利金額
    pub fn has_cash_dividend(&self) -> bool {
        !self.cash_dividend.trim().is_empty()
    }

    pub fn is_ex_dividend(&self) -> bool {
        self.ex_dividend.trim() == "息"
    }

    pub fn cash(&self) -> Decimal {
        text::parse_decimal_or_zero(&self.cash_dividend)
    }

    pub fn stock(&self) -> Decimal {
        text::parse_decimal_or_zero(&self.stock_dividend_ratio)
    }
}

impl Keyable for ExRightDividend {
    fn key(&self) -> String {
        self.code.trim().to_string()
    }

    fn key_with_prefix(&self) -> String {
        format!("ExRightDividend:{}", self.key())
    }
}

/// 抓取證交所除權除息預告表
pub async fn visit(url: &str, proxies: &[String]) -> Result<Vec<ExRightDividend>> {
    let strategy = ExponentialBackoff::from_millis(200)
        .map(jitter) // add jitter to delays
        .take(2); // limit to 2 retries
    let rows = Retry::spawn(strategy, || {
        crawler::fetch_json_via_proxies::<Vec<ExRightDividend>>(url, proxies)
    })
    .await?;

    logging::info_file_async(format!("除權除息預告表共 {} 筆", rows.len()));

    Ok(rows)
}
