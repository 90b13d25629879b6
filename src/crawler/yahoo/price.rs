use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    config,
    crawler::{self, StockQuote},
};

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    #[serde(default)]
    regular_market_price: Option<Decimal>,
    #[serde(default)]
    regular_market_time: Option<i64>,
}

pub fn chart_url(host: &str, code: &str, suffix: &str) -> String {
    format!(
        "https://{host}/v8/finance/chart/{code}{suffix}",
        host = host,
        code = code,
        suffix = suffix
    )
}

/// 取得股票目前的最後成交價
pub async fn visit(quote: &config::Quote, code: &str, proxies: &[String]) -> Result<StockQuote> {
    let url = chart_url(&quote.host, code, &quote.symbol_suffix);
    let res = crawler::fetch_json_via_proxies::<ChartResponse>(&url, proxies).await?;

    to_stock_quote(code, &quote.symbol_suffix, res)
}

fn to_stock_quote(code: &str, suffix: &str, res: ChartResponse) -> Result<StockQuote> {
    if let Some(error) = res.chart.error {
        return Err(anyhow!(
            "Yahoo chart error for {}: {} {}",
            code,
            error.code.unwrap_or_default(),
            error.description.unwrap_or_default()
        ));
    }

    let meta = res
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(|r| r.meta)
        .ok_or_else(|| anyhow!("Yahoo chart has no result for {}", code))?;

    let price = meta
        .regular_market_price
        .ok_or_else(|| anyhow!("Yahoo chart has no regularMarketPrice for {}", code))?;

    Ok(StockQuote {
        code: code.to_string(),
        name: meta.symbol.replace(suffix, ""),
        price: price.normalize(),
        timestamp: meta.regular_market_time,
    })
}
