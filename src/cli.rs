use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::{
    declare::SortOrder,
    stock::{DividendInfo, PriceResult, StockFullInfo},
    util::{datetime, text},
};

pub const INVALID_CODE_MESSAGE: &str = "請輸入有效的股票代碼";

#[derive(Parser, Debug)]
#[command(name = "finance_rank", version, about = "台股股價查詢與金融股殖利率排行", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 查詢目前股價
    Quote {
        code: String,
        /// 略過新鮮快取直接連網
        #[arg(long)]
        force: bool,
    },
    /// 查詢配息配股
    Dividend {
        code: String,
        #[arg(long)]
        force: bool,
    },
    /// 股價、配息與殖利率
    Info {
        code: String,
        #[arg(long)]
        force: bool,
    },
    /// 金融股殖利率排行
    Rank {
        /// code、cash 或 total
        #[arg(long, default_value = "code", value_parser = parse_sort_order)]
        sort: SortOrder,
        #[arg(long)]
        force: bool,
    },
    /// 本地快取管理
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// 清除所有快取
    Clear,
    /// 移除單一股票的股價快取
    Remove { code: String },
}

fn parse_sort_order(s: &str) -> Result<SortOrder, String> {
    SortOrder::from_str(s.trim()).map_err(|_| format!("unknown sort order: {}", s))
}

/// 整理使用者輸入的代碼，無效時回傳 `None`
pub fn normalize_code(input: &str) -> Option<String> {
    let code = text::format_stock_code(input);
    if text::is_valid_stock_code(&code) {
        Some(code)
    } else {
        None
    }
}

fn time_suffix(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(datetime::format_unix_time)
        .map(|t| format!(" ({})", t))
        .unwrap_or_default()
}

pub fn format_quote(result: &PriceResult) -> String {
    if !result.success {
        return result
            .message
            .clone()
            .unwrap_or_else(|| INVALID_CODE_MESSAGE.to_string());
    }

    let mut line = format!(
        "{} - 目前股價：{} 元{}",
        result.code,
        result.price,
        time_suffix(result.timestamp)
    );
    if result.state.is_cache() {
        line.push_str(&format!(" [{}]", result.state));
    }

    line
}

pub fn format_dividend(info: &DividendInfo) -> String {
    format!(
        "{} - 現金股利：{:.2} 元，股票股利：{:.2} 股，除權息日：{} ({})",
        info.code,
        info.cash,
        info.stock,
        datetime::format_date(info.date),
        info.status
    )
}

pub fn format_full_info(info: &StockFullInfo) -> String {
    let yields = info.yields();
    let mut lines = vec![
        format!(
            "{} {} - 目前股價：{} 元{}",
            info.code,
            info.name,
            info.price,
            time_suffix(info.price_timestamp)
        ),
        format!(
            "現金股利：{:.2} 元，股票股利：{:.2} 股 ({})",
            info.cash_dividend, info.stock_dividend, info.dividend_status
        ),
        format!(
            "現金殖利率：{:.2}%，股票殖利率：{:.2}%，總殖利率：{:.2}% ({})",
            yields.cash,
            yields.stock,
            yields.total,
            yields.level()
        ),
        format!("除權息日：{}", datetime::format_date(info.dividend_date)),
    ];
    if info.is_cache() {
        lines.push(format!("資料來源：{}", info.price_state));
    }

    lines.join("\n")
}
