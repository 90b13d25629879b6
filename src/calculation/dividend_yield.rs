use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::declare::YieldLevel;

/// 股票股利以每股配發股數表示，換算成每股面額 10 元的價值
const PAR_VALUE: Decimal = dec!(10);

/// 依股價計算出的各項殖利率 (百分比)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Yields {
    pub cash: Decimal,
    pub stock: Decimal,
    pub total: Decimal,
}

impl Yields {
    pub fn new(price: Decimal, cash_dividend: Decimal, stock_dividend: Decimal) -> Self {
        let cash = cash_yield(price, cash_dividend);
        let stock = stock_yield(price, stock_dividend);

        Yields {
            cash,
            stock,
            total: cash + stock,
        }
    }

    pub fn level(&self) -> YieldLevel {
        YieldLevel::from_yield(self.total)
    }
}

/// 現金殖利率 = 現金股利 / 股價 * 100
pub fn cash_yield(price: Decimal, cash_dividend: Decimal) -> Decimal {
    if price <= Decimal::ZERO || cash_dividend.is_zero() {
        return Decimal::ZERO;
    }

    cash_dividend / price * dec!(100)
}

/// 股票殖利率 = 股票股利 * 10 / 股價 * 100
pub fn stock_yield(price: Decimal, stock_dividend: Decimal) -> Decimal {
    if price <= Decimal::ZERO || stock_dividend.is_zero() {
        return Decimal::ZERO;
    }

    stock_dividend * PAR_VALUE / price * dec!(100)
}
