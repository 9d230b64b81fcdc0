use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use depth_replica::config::Settings;
use depth_replica::market_data::adapters::binance::BinanceFutures;
use depth_replica::market_data::book_view::BookView;
use depth_replica::market_data::router::DepthSync;
use depth_replica::telemetry;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "depth-replica", about = "Keep a local replica of a futures order book in sync")]
struct Args {
    /// TOML settings file (defaults to ./depth-replica.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trading symbol, overrides the settings file
    #[arg(long)]
    symbol: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,

    /// Port for the Prometheus exporter (metrics-exporter feature)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
}

// Print top of book at most once per display interval, and only after a change
fn spawn_display(view: BookView, settings: &Settings) -> tokio::task::JoinHandle<()> {
    let dirty = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&dirty);
    view.on_book_change(move || flag.store(true, Ordering::Relaxed));
    view.on_status(|status| info!(?status, "Connection status"));

    let depth = settings.display_depth;
    let mut interval = tokio::time::interval(settings.display_interval());
    tokio::spawn(async move {
        loop {
            interval.tick().await;
            if !dirty.swap(false, Ordering::Relaxed) {
                continue;
            }
            let Some(book) = view.valid_depth(depth) else {
                println!("BOOK: syncing...");
                continue;
            };
            let spread = view.spread().map(|s| s.to_string()).unwrap_or_else(|| "N/A".into());
            match (book.bids.first(), book.asks.first()) {
                (Some(bid), Some(ask)) => println!(
                    "[{}] BID {} @ {} | ASK {} @ {} | Spread: {} | levels {}x{}",
                    view.last_update_id(),
                    bid.quantity,
                    bid.price,
                    ask.quantity,
                    ask.price,
                    spread,
                    book.bids.len(),
                    book.asks.len()
                ),
                _ => println!("[{}] BOOK: one side empty", view.last_update_id()),
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let args = Args::parse();
    telemetry::init_tracing(&args.log);

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(symbol) = args.symbol {
        settings.symbol = symbol.to_ascii_uppercase();
        settings.validate()?;
    }
    telemetry::init_metrics(args.metrics_port)?;
    info!(symbol = %settings.symbol, speed = %settings.update_speed, "Starting depth replica");

    let adapter = || {
        BinanceFutures::new(&settings.symbol, &settings.rest_base, &settings.ws_base, &settings.update_speed)
    };
    let sync = DepthSync::new(adapter()?, adapter()?, &settings);
    let display = spawn_display(sync.view(), &settings);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = stop_tx.send(true);
        }
    });

    let result = sync.run(stop_rx).await;
    display.abort();
    match result {
        Ok(stats) => {
            info!(?stats, "Goodbye!");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Book sync failed");
            Err(e.into())
        }
    }
}
