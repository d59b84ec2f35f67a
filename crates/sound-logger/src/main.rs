mod bootstrap;
mod driver;

use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use sound_core::settings::{AnalyzeArgs, CollectArgs, Command, Settings};
use sound_core::time_utils::parse_date_input;
use sound_runtime::collector::{Collector, CollectorConfig};
use sound_runtime::listener::spawn_stop_listener;
use sound_runtime::source::{open_with_retry, RetryPolicy, SerialLineSource};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used()?;

    bootstrap::setup_logging(&settings.log_level)?;
    let data_dir = settings.data_dir();
    bootstrap::ensure_directories(&data_dir)?;

    tracing::info!("Sound Logger v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(reason) = &settings.persist_error {
        tracing::warn!("Could not save last-used parameters to {}", reason);
    }
    tracing::info!("Data directory: {}", data_dir.display());

    match settings.command {
        Command::Collect(args) => collect(args, data_dir).await,
        Command::Analyze(args) => analyze(args, data_dir),
    }
}

async fn collect(args: CollectArgs, data_dir: PathBuf) -> Result<()> {
    let port = args.port().to_string();
    let baud = args.baud();
    tracing::info!("Opening {} at {} baud", port, baud);

    let source = tokio::task::spawn_blocking(move || {
        open_with_retry(&port, RetryPolicy::default(), || SerialLineSource::open(&port, baud))
    })
    .await??;

    // The board resets when the port opens.
    tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;

    let token = CancellationToken::new();
    spawn_stop_listener(BufReader::new(std::io::stdin()), token.clone());

    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received; ending collection");
            ctrl_c_token.cancel();
        }
    });

    println!("Collecting data...");
    println!("Type 'stop' to end collection:");

    let mut config = CollectorConfig::new(data_dir);
    if let Some(ms) = args.interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    config.render_plot = !args.no_plot;
    let collector = Collector::new(config);
    let summary = tokio::task::spawn_blocking(move || collector.run(source, &token)).await??;

    println!("Collection ended, data saved.");
    println!("{} reading(s) written to {}", summary.readings, summary.csv_path.display());
    match (&summary.plot_path, &summary.plot_error) {
        (Some(plot), _) => println!("Plot saved to {}", plot.display()),
        (None, Some(reason)) => println!("Plot not saved: {reason}"),
        (None, None) => {}
    }

    Ok(())
}

fn analyze(args: AnalyzeArgs, data_dir: PathBuf) -> Result<()> {
    let mut stdout = std::io::stdout();

    let date = match args.date {
        Some(raw) => parse_date_input(&raw)?,
        None => match driver::prompt_for_date(&mut std::io::stdin().lock(), &mut stdout)? {
            Some(date) => date,
            None => return Ok(()),
        },
    };

    let opts = driver::AnalyzeOptions {
        data_dir,
        contamination: args.contamination,
        seed: args.seed,
    };
    driver::run_analysis(&mut stdout, &opts, date)?;
    Ok(())
}
