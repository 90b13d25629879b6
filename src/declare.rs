use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// 排行榜追蹤的金融股
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FinanceStock {
    pub code: String,
    pub name: String,
}

impl FinanceStock {
    pub fn new(code: &str, name: &str) -> Self {
        FinanceStock {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// 主要金融股列表 (股票代碼, 名稱)
pub const FINANCE_STOCKS: [(&str, &str); 16] = [
    ("2881", "富邦金"),
    ("2882", "國泰金"),
    ("2883", "開發金"),
    ("2884", "玉山金"),
    ("2885", "元大金"),
    ("2886", "兆豐金"),
    ("2887", "台新金"),
    ("2888", "新光金"),
    ("2889", "國票金"),
    ("2890", "永豐金"),
    ("2891", "中信金"),
    ("2892", "第一金"),
    ("2897", "王道銀"),
    ("5820", "日盛金"),
    ("5876", "上海商銀"),
    ("5880", "合庫金"),
];

pub fn finance_stocks() -> Vec<FinanceStock> {
    FINANCE_STOCKS
        .iter()
        .map(|(code, name)| FinanceStock::new(code, name))
        .collect()
}

pub fn finance_stock_name(code: &str) -> Option<&'static str> {
    FINANCE_STOCKS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// 排行榜排序方式
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    /// 依股票代碼遞增
    #[default]
    Code,
    /// 依現金殖利率遞減
    Cash,
    /// 依總殖利率遞減
    Total,
}

/// 殖利率高低分級
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, AsRefStr)]
pub enum YieldLevel {
    #[strum(serialize = "高")]
    High,
    #[strum(serialize = "中")]
    Medium,
    #[strum(serialize = "低")]
    Low,
}

impl YieldLevel {
    pub fn from_yield(value: Decimal) -> Self {
        if value >= dec!(5) {
            YieldLevel::High
        } else if value >= dec!(3) {
            YieldLevel::Medium
        } else {
            YieldLevel::Low
        }
    }
}

/// 資料來源狀態
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Display, AsRefStr)]
pub enum CacheState {
    /// 剛從網路取得
    #[strum(serialize = "即時")]
    Live,
    /// 未過期的快取
    #[strum(serialize = "快取")]
    Fresh,
    /// 網路失敗時退回的舊快取
    #[strum(serialize = "舊快取")]
    Stale,
}

impl CacheState {
    pub fn is_cache(&self) -> bool {
        !matches!(self, CacheState::Live)
    }
}

/// 配息資料的確認程度
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum DividendStatus {
    /// 已公告配息金額
    #[strum(serialize = "已公告")]
    Confirmed,
    /// 已有除息日但金額未定
    #[strum(serialize = "金額未定")]
    Announced,
    /// 無資料
    #[strum(serialize = "無資料")]
    Unknown,
}
