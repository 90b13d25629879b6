//! 金融股殖利率排行榜。
//!
//! 依序抓取追蹤清單中每一檔股票的股價與配息，計算殖利率後排序輸出。
//! 抓取失敗的股票會在整輪結束後統一重試一次。

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use scopeguard::defer;
use tokio::{sync::Mutex, time::sleep};

use crate::{
    calculation::dividend_yield::Yields,
    config::{self, SETTINGS},
    crawler::QuoteSource,
    declare::{self, FinanceStock, SortOrder},
    logging,
    stock::{DividendBook, StockFullInfo, StockService},
    util::datetime,
};

const EMPTY_MESSAGE: &str = "尚未獲取到股票資料，請重新整理所有資料。";
const FAILED_MESSAGE: &str = "無法獲取資料";

/// 抓取進度
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 從 1 開始
    pub index: usize,
    pub total: usize,
    pub code: String,
    pub name: String,
    pub retry: bool,
}

type ProgressFn = Box<dyn Fn(&Progress) + Send + Sync>;

/// 一輪抓取的結果統計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub retried: bool,
}

#[derive(Debug, Default)]
struct RankState {
    stocks: Vec<StockFullInfo>,
    failed: Vec<FinanceStock>,
    retries: u32,
}

pub struct RankBoard<S: QuoteSource> {
    service: Arc<StockService<S>>,
    settings: config::Rank,
    watchlist: Vec<FinanceStock>,
    state: Mutex<RankState>,
    processing: AtomicBool,
    on_progress: Option<ProgressFn>,
}

impl<S: QuoteSource> RankBoard<S> {
    pub fn new(service: Arc<StockService<S>>) -> Self {
        Self::with_settings(service, SETTINGS.rank.clone())
    }

    pub fn with_settings(service: Arc<StockService<S>>, settings: config::Rank) -> Self {
        RankBoard {
            service,
            settings,
            watchlist: declare::finance_stocks(),
            state: Mutex::new(RankState::default()),
            processing: AtomicBool::new(false),
            on_progress: None,
        }
    }

    pub fn with_watchlist(mut self, watchlist: Vec<FinanceStock>) -> Self {
        self.watchlist = watchlist;
        self
    }

    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    #[cfg(test)]
    fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<()> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(anyhow!("排行榜正在更新中，請稍後再試"));
        }

        Ok(())
    }

    fn report(&self, progress: Progress) {
        logging::info_file_async(format!(
            "{}{} {} ({}/{})",
            if progress.retry { "重試 " } else { "" },
            progress.code,
            progress.name,
            progress.index,
            progress.total
        ));

        if let Some(f) = &self.on_progress {
            f(&progress);
        }
    }

    /// 抓取單一檔，名稱一律採用追蹤清單上的名稱
    async fn fetch_one(
        &self,
        stock: &FinanceStock,
        force_refresh: bool,
        book: &DividendBook,
    ) -> Option<StockFullInfo> {
        match self
            .service
            .fetch_stock_full_info_with(&stock.code, force_refresh, book)
            .await
        {
            Ok(mut info) => {
                info.name = stock.name.clone();
                Some(info)
            }
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to fetch_stock_full_info({}) because {:?}",
                    stock.code, why
                ));
                None
            }
        }
    }

    /// 依序抓取整份追蹤清單
    pub async fn fetch_all(&self, force_refresh: bool) -> Result<RankSummary> {
        self.begin()?;
        defer! {
            self.processing.store(false, Ordering::SeqCst);
        }

        logging::info_file_async("更新金融股排行榜開始");
        defer! {
            logging::info_file_async("更新金融股排行榜結束");
        }

        // 預告表整輪只取一次
        let book = self.service.dividend_book(force_refresh).await;

        let total = self.watchlist.len();
        let mut stocks = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for (i, stock) in self.watchlist.iter().enumerate() {
            self.report(Progress {
                index: i + 1,
                total,
                code: stock.code.clone(),
                name: stock.name.clone(),
                retry: false,
            });

            match self.fetch_one(stock, force_refresh, &book).await {
                Some(info) => stocks.push(info),
                None => failed.push(stock.clone()),
            }

            sleep(Duration::from_millis(self.settings.fetch_delay_ms)).await;
        }

        let mut retries = 0;
        let mut retried = false;
        if !failed.is_empty() && retries < self.settings.max_retries {
            retries += 1;
            retried = true;
            logging::warn_file_async(format!(
                "部分股票資料獲取失敗，正在重試 ({}/{})",
                retries, self.settings.max_retries
            ));

            let to_retry = std::mem::take(&mut failed);
            let retry_total = to_retry.len();
            for (i, stock) in to_retry.into_iter().enumerate() {
                self.report(Progress {
                    index: i + 1,
                    total: retry_total,
                    code: stock.code.clone(),
                    name: stock.name.clone(),
                    retry: true,
                });

                match self.fetch_one(&stock, force_refresh, &book).await {
                    Some(info) => stocks.push(info),
                    None => failed.push(stock),
                }

                sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
            }
        }

        let summary = RankSummary {
            succeeded: stocks.len(),
            failed: failed.len(),
            retried,
        };

        logging::info_file_async(format!(
            "資料獲取完成，顯示 {} 支股票資料，失敗 {} 支",
            summary.succeeded, summary.failed
        ));

        let mut state = self.state.lock().await;
        *state = RankState {
            stocks,
            failed,
            retries,
        };

        Ok(summary)
    }

    /// 強制更新單一檔，回傳是否成功
    pub async fn refresh_single(&self, code: &str) -> Result<bool> {
        self.begin()?;
        defer! {
            self.processing.store(false, Ordering::SeqCst);
        }

        let name = {
            let mut state = self.state.lock().await;
            let from_stocks = state
                .stocks
                .iter()
                .position(|s| s.code == code)
                .map(|pos| state.stocks.remove(pos).name);
            let from_failed = state
                .failed
                .iter()
                .position(|s| s.code == code)
                .map(|pos| state.failed.remove(pos).name);

            from_stocks
                .or(from_failed)
                .or_else(|| declare::finance_stock_name(code).map(str::to_string))
                .unwrap_or_else(|| code.to_string())
        };

        let stock = FinanceStock {
            code: code.to_string(),
            name,
        };
        // 只強制更新股價，預告表沿用快取
        let book = self.service.dividend_book(false).await;
        let info = self.fetch_one(&stock, true, &book).await;

        let mut state = self.state.lock().await;
        match info {
            Some(info) => {
                state.stocks.push(info);
                Ok(true)
            }
            None => {
                state.failed.push(stock);
                Ok(false)
            }
        }
    }

    /// 依排序方式複製一份排行
    pub async fn sorted(&self, order: SortOrder) -> Vec<StockFullInfo> {
        let mut stocks = self.state.lock().await.stocks.clone();
        sort_stocks(&mut stocks, order);
        stocks
    }

    pub async fn failed(&self) -> Vec<FinanceStock> {
        self.state.lock().await.failed.clone()
    }

    #[cfg(test)]
    async fn retries(&self) -> u32 {
        self.state.lock().await.retries
    }

    /// 輸出純文字排行表
    pub async fn render(&self, order: SortOrder) -> String {
        let stocks = self.sorted(order).await;
        let failed = self.failed().await;

        render_table(&stocks, &failed)
    }
}

pub fn sort_stocks(stocks: &mut [StockFullInfo], order: SortOrder) {
    match order {
        SortOrder::Cash => stocks.sort_by(|a, b| b.cash_yield.cmp(&a.cash_yield)),
        SortOrder::Total => stocks.sort_by(|a, b| b.total_yield.cmp(&a.total_yield)),
        SortOrder::Code => stocks.sort_by(|a, b| a.code.cmp(&b.code)),
    }
}

fn amount_or_dash(amount: Decimal) -> String {
    if amount > Decimal::ZERO {
        format!("{:.2}", amount)
    } else {
        "-".to_string()
    }
}

/// 沒有任何成功的資料時只輸出提示，失敗列不單獨顯示
fn render_table(stocks: &[StockFullInfo], failed: &[FinanceStock]) -> String {
    if stocks.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }

    let mut lines = Vec::with_capacity(stocks.len() + failed.len() + 1);
    lines.push(format!(
        "{:<6} {:<8} {:>8} {:>8} {:>8} {:>9} {:>9} {:>9} {:<4} {:<10} {}",
        "代碼", "名稱", "股價", "現金股利", "股票股利", "現金殖利率", "股票殖利率", "總殖利率", "等級", "除權息日", "來源"
    ));

    for stock in stocks {
        let yields: Yields = stock.yields();
        lines.push(format!(
            "{:<6} {:<8} {:>8.2} {:>8} {:>8} {:>8.2}% {:>8.2}% {:>8.2}% {:<4} {:<10} {}",
            stock.code,
            stock.name,
            stock.price,
            amount_or_dash(stock.cash_dividend),
            amount_or_dash(stock.stock_dividend),
            yields.cash,
            yields.stock,
            yields.total,
            yields.level(),
            datetime::format_date(stock.dividend_date),
            stock.price_state
        ));
    }

    for stock in failed {
        lines.push(format!("{:<6} {:<8} {}", stock.code, stock.name, FAILED_MESSAGE));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::stock::tests::{row, service, FakeSource};

    fn quick() -> config::Rank {
        config::Rank {
            max_retries: 3,
            fetch_delay_ms: 0,
            retry_delay_ms: 0,
        }
    }

    fn watchlist() -> Vec<FinanceStock> {
        vec![
            FinanceStock::new("2881", "富邦金"),
            FinanceStock::new("2886", "兆豐金"),
            FinanceStock::new("2891", "中信金"),
        ]
    }

    fn source() -> FakeSource {
        let source = FakeSource::with_prices(&[
            ("2881", dec!(80)),
            ("2886", dec!(40)),
            ("2891", dec!(40)),
        ]);
        *source.dividends.lock().unwrap() = vec![
            row("2881", "息", "", "2.0"),
            row("2886", "息", "", "1.8"),
            row("2891", "權息", "0.2", "1.0"),
        ];
        source
    }

    fn board(source: FakeSource, settings: config::Rank) -> (tempfile::TempDir, RankBoard<FakeSource>) {
        let (dir, service) = service(source);
        let board = RankBoard::with_settings(Arc::new(service), settings).with_watchlist(watchlist());
        (dir, board)
    }

    fn codes(stocks: &[StockFullInfo]) -> Vec<&str> {
        stocks.iter().map(|s| s.code.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fetch_all_and_sort() {
        let (_dir, board) = board(source(), quick());

        let summary = board.fetch_all(false).await.unwrap();
        assert_eq!(
            summary,
            RankSummary {
                succeeded: 3,
                failed: 0,
                retried: false
            }
        );

        // 2881: 2.5%，2886: 4.5%，2891: 2.5% + 5% = 7.5%
        assert_eq!(codes(&board.sorted(SortOrder::Code).await), vec!["2881", "2886", "2891"]);
        assert_eq!(codes(&board.sorted(SortOrder::Cash).await), vec!["2886", "2881", "2891"]);
        assert_eq!(codes(&board.sorted(SortOrder::Total).await), vec!["2891", "2886", "2881"]);

        let stocks = board.sorted(SortOrder::Code).await;
        assert_eq!(stocks[0].name, "富邦金");
        assert!(!board.is_processing());
    }

    #[tokio::test]
    async fn test_failed_stock_retried_once() {
        let source = source();
        source.flaky.lock().unwrap().push("2886".to_string());
        source.broken.lock().unwrap().push("2891".to_string());
        let (_dir, board) = board(source, quick());

        let summary = board.fetch_all(false).await.unwrap();
        assert!(summary.retried);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(board.retries().await, 1);
        assert_eq!(board.failed().await, vec![FinanceStock::new("2891", "中信金")]);

        // 兩檔股價加上預告表
        assert_eq!(board.service.storage().len(), 3);
    }

    #[tokio::test]
    async fn test_no_retry_when_disabled() {
        let source = source();
        source.flaky.lock().unwrap().push("2886".to_string());
        let settings = config::Rank {
            max_retries: 0,
            ..quick()
        };
        let (_dir, board) = board(source, settings);

        let summary = board.fetch_all(false).await.unwrap();
        assert!(!summary.retried);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_reject_while_processing() {
        let settings = config::Rank {
            fetch_delay_ms: 50,
            ..quick()
        };
        let (_dir, board) = board(source(), settings);

        let (all, single) = tokio::join!(board.fetch_all(false), board.refresh_single("2881"));
        assert!(all.is_ok());
        assert!(single.is_err());

        assert!(board.refresh_single("2881").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_single_moves_between_lists() {
        let source = source();
        source.broken.lock().unwrap().push("2886".to_string());
        let (_dir, board) = board(source, quick());
        board.fetch_all(false).await.unwrap();
        assert_eq!(board.failed().await.len(), 1);

        board.service_source().broken.lock().unwrap().clear();
        assert!(board.refresh_single("2886").await.unwrap());
        assert!(board.failed().await.is_empty());

        let stocks = board.sorted(SortOrder::Code).await;
        assert_eq!(codes(&stocks), vec!["2881", "2886", "2891"]);
        assert_eq!(stocks[1].name, "兆豐金");

        // 不在清單中的代碼以自身為名稱
        board.service_source().set_offline(true);
        assert!(!board.refresh_single("9999").await.unwrap());
        assert_eq!(board.failed().await, vec![FinanceStock::new("9999", "9999")]);
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let (_dir, board) = board(source(), quick());
        let board = board.with_progress(move |p| {
            assert!(p.index <= p.total);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        board.fetch_all(false).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_forced_rank_downloads_dividend_list_once() {
        let source = source();
        source.flaky.lock().unwrap().push("2886".to_string());
        let (_dir, board) = board(source, quick());

        let summary = board.fetch_all(true).await.unwrap();
        assert_eq!(summary.succeeded, 3);
        assert!(summary.retried);

        let fake = board.service_source();
        assert_eq!(fake.dividend_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.price_calls.load(Ordering::SeqCst), 4);

        // 單檔更新沿用剛取得的預告表
        assert!(board.refresh_single("2881").await.unwrap());
        assert_eq!(board.service_source().dividend_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_without_successful_rows_shows_empty_message() {
        let source = source();
        source.set_offline(true);
        let (_dir, board) = board(source, quick());

        let summary = board.fetch_all(false).await.unwrap();
        assert_eq!(summary.failed, 3);
        assert_eq!(board.render(SortOrder::Code).await, EMPTY_MESSAGE);
    }

    #[tokio::test]
    async fn test_render() {
        let source = source();
        source.broken.lock().unwrap().push("2891".to_string());
        let (_dir, board) = board(source, quick());

        assert_eq!(board.render(SortOrder::Code).await, EMPTY_MESSAGE);

        board.fetch_all(false).await.unwrap();
        let text = board.render(SortOrder::Total).await;
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("2886"));
        assert!(lines[1].contains("4.50%"));
        assert!(lines[1].contains("1.80"));
        assert!(lines[2].starts_with("2881"));
        assert!(lines[3].contains(FAILED_MESSAGE));
    }

    impl RankBoard<FakeSource> {
        fn service_source(&self) -> &FakeSource {
            self.service.source()
        }
    }
}
