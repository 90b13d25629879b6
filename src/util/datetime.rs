use chrono::{DateTime, Local, NaiveDate, TimeZone};

/// 民國年轉西元年
pub fn to_gregorian_year(year: i32) -> i32 {
    year + 1911
}

/// 解析 `YYYMMDD` 格式的民國日期，例︰"1140423" => 2025-04-23
pub fn parse_roc_compact_date(date_str: &str) -> Option<NaiveDate> {
    let s = date_str.trim();
    if s.len() != 7 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let year = to_gregorian_year(s[0..3].parse::<i32>().ok()?);
    let month = s[3..5].parse::<u32>().ok()?;
    let day = s[5..7].parse::<u32>().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// 日期顯示為 `YYYY/MM/DD`，沒有日期時顯示「暫無資料」
pub fn format_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.format("%Y/%m/%d").to_string(),
        None => "暫無資料".to_string(),
    }
}

/// Unix 秒數轉本地時間
pub fn from_unix_seconds(timestamp: i64) -> Option<DateTime<Local>> {
    Local.timestamp_opt(timestamp, 0).single()
}

/// Unix 秒數顯示為 `YYYY/MM/DD HH:MM`
pub fn format_unix_time(timestamp: i64) -> Option<String> {
    from_unix_seconds(timestamp).map(|dt| dt.format("%Y/%m/%d %H:%M").to_string())
}
