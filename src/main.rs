pub mod cache;
pub mod calculation;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod logging;
pub mod rank;
pub mod stock;
pub mod util;

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use scopeguard::defer;

use crate::{
    cli::{CacheAction, Cli, Commands},
    crawler::RemoteSource,
    rank::RankBoard,
    stock::StockService,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    util::ensure_rustls_crypto_provider();

    let cli = Cli::parse();
    logging::info_file_async(format!("finance_rank 開始 {:?}", cli.command));
    defer! {
        logging::info_file_async("finance_rank 結束");
        logging::flush();
    }

    match run(cli.command).await {
        Ok(code) => code,
        Err(why) => {
            logging::error_file_async(format!("Failed to run because {:?}", why));
            logging::error_console(format!("{:#}", why));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    let service = Arc::new(StockService::remote());

    match command {
        Commands::Quote { code, force } => {
            let code = match cli::normalize_code(&code) {
                Some(code) => code,
                None => return invalid_code(),
            };

            let result = service.fetch_stock_price(&code, force).await;
            println!("{}", cli::format_quote(&result));

            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Dividend { code, force } => {
            let code = match cli::normalize_code(&code) {
                Some(code) => code,
                None => return invalid_code(),
            };

            let info = service.fetch_stock_dividend(&code, force).await;
            println!("{}", cli::format_dividend(&info));

            Ok(ExitCode::SUCCESS)
        }
        Commands::Info { code, force } => {
            let code = match cli::normalize_code(&code) {
                Some(code) => code,
                None => return invalid_code(),
            };

            let info = service.fetch_stock_full_info(&code, force).await?;
            println!("{}", cli::format_full_info(&info));

            Ok(ExitCode::SUCCESS)
        }
        Commands::Rank { sort, force } => {
            let board = RankBoard::<RemoteSource>::new(service).with_progress(|p| {
                logging::info_console(format!(
                    "{}正在獲取 {} {} 的資料... ({}/{})",
                    if p.retry { "[重試] " } else { "" },
                    p.code,
                    p.name,
                    p.index,
                    p.total
                ));
            });

            let summary = board.fetch_all(force).await?;
            println!("{}", board.render(sort).await.trim_end());
            logging::info_console(format!(
                "資料獲取完成，顯示 {} 支股票資料，失敗 {} 支",
                summary.succeeded, summary.failed
            ));

            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            let removed = service.storage().clear()?;
            println!(
                "已清除 {} 筆快取 ({})",
                removed,
                service.storage().path().display()
            );

            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache {
            action: CacheAction::Remove { code },
        } => {
            let code = match cli::normalize_code(&code) {
                Some(code) => code,
                None => return invalid_code(),
            };

            let key = crawler::price_key(&code);
            if service.storage().remove(&key)? {
                println!("已移除 {} 的快取", code);
            } else {
                println!("{} 沒有快取資料", code);
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}

fn invalid_code() -> Result<ExitCode> {
    logging::error_console(cli::INVALID_CODE_MESSAGE);
    Ok(ExitCode::FAILURE)
}
