use std::str::FromStr;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

const NUMBER_ESCAPE_CHAR: &[char] = &['元', '%', ',', ' ', '"', '\n'];

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").expect("valid regex"));

/// 股票代碼至少 4 碼
const MIN_STOCK_CODE_LEN: usize = 4;

/// 移除空白與所有非數字字元，例︰" 28a81 " => "2881"
pub fn format_stock_code(code: &str) -> String {
    NON_DIGIT.replace_all(code.trim(), "").into_owned()
}

pub fn is_valid_stock_code(code: &str) -> bool {
    code.len() >= MIN_STOCK_CODE_LEN && code.chars().all(|c| c.is_ascii_digit())
}

/// Parses a decimal value from a given string.
///
/// Thousands separators and the characters in `NUMBER_ESCAPE_CHAR` are removed
/// before parsing, as well as any extra `escape_chars`.
///
/// # Example
///
/// ```ignore
/// let d = parse_decimal("1,234.56", None)?;
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    Decimal::from_str(&cleaned)
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// 空字串或無法解析時回傳 0
pub fn parse_decimal_or_zero(s: &str) -> Decimal {
    parse_decimal(s, None).unwrap_or(Decimal::ZERO)
}

fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut escape = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(extra) = escape_chars {
        escape.extend(extra);
    }

    s.trim().replace(escape.as_slice(), "")
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_format_stock_code() {
        assert_eq!(format_stock_code("  2881 "), "2881");
        assert_eq!(format_stock_code("2881.TW"), "2881");
        assert_eq!(format_stock_code("富邦金2881"), "2881");
        assert_eq!(format_stock_code("abc"), "");
    }

    #[test]
    fn test_format_stock_code_drops_fullwidth_digits() {
        let code = format_stock_code("2881５");
        assert_eq!(code, "2881");
        assert!(is_valid_stock_code(&code));
        assert_eq!(format_stock_code("２８８１"), "");
    }

    #[test]
    fn test_is_valid_stock_code() {
        assert!(is_valid_stock_code("2881"));
        assert!(is_valid_stock_code("00878"));
        assert!(!is_valid_stock_code("288"));
        assert!(!is_valid_stock_code(""));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1,234.56", None).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal("3.0000000", None).unwrap(), dec!(3));
        assert_eq!(parse_decimal("(1.5)", Some(vec!['(', ')'])).unwrap(), dec!(1.5));
        assert!(parse_decimal("", None).is_err());
        assert_eq!(parse_decimal_or_zero(""), Decimal::ZERO);
        assert_eq!(parse_decimal_or_zero("0.5"), dec!(0.5));
    }
}
