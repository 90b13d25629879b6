/// 計算現金、股票與總殖利率
pub mod dividend_yield;
