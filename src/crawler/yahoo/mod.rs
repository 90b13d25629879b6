//! # Yahoo 財經
//!
//! 透過 Yahoo Finance chart API (`/v8/finance/chart/{symbol}`) 取得台股即時報價。
//! 台股上市代碼需加上 `.TW` 後綴，後綴可由設定檔調整。

/// 即時報價
pub mod price;
