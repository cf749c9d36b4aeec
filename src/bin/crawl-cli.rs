//! Benchmark and diagnostics CLI for the crawler client.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::time::Instant;

use smart_crawler::config::{load_config, validate_config};
use smart_crawler::observability::{logging, metrics};
use smart_crawler::{Crawler, CrawlerConfig};

#[derive(Parser)]
#[command(name = "crawl-cli")]
#[command(about = "Drive the resilient crawler client against a target", long_about = None)]
struct Cli {
    /// Target base URL.
    url: String,

    /// Path fetched on every request.
    #[arg(short, long, default_value = "/")]
    path: String,

    /// Number of sequential fetches.
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: u32,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable the connection pool.
    #[arg(long)]
    no_pool: bool,

    /// Disable backend node probing.
    #[arg(long)]
    no_probe: bool,

    /// Disable smart retry.
    #[arg(long)]
    no_retry: bool,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CrawlerConfig::default(),
    };
    if cli.no_pool {
        config.enable_connection_pool = false;
    }
    if cli.no_probe {
        config.enable_health_probe = false;
    }
    if cli.no_retry {
        config.enable_smart_retry = false;
    }
    if let Err(errors) = validate_config(&config) {
        for err in &errors {
            eprintln!("config error: {err}");
        }
        return Err("invalid configuration".into());
    }

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    let crawler = Crawler::new(&cli.url, config)?;
    crawler.initialize().await?;

    let mut succeeded = 0u32;
    let run_started = Instant::now();
    for i in 1..=cli.requests {
        let started = Instant::now();
        match crawler.fetch(&cli.path).await {
            Ok(body) => {
                succeeded += 1;
                println!(
                    "request {i}/{}: ok, {} bytes in {:.2}s",
                    cli.requests,
                    body.len(),
                    started.elapsed().as_secs_f64()
                );
            }
            Err(err) => {
                println!(
                    "request {i}/{}: failed in {:.2}s: {err}",
                    cli.requests,
                    started.elapsed().as_secs_f64()
                );
            }
        }
    }
    let elapsed = run_started.elapsed().as_secs_f64();

    println!();
    println!(
        "{succeeded}/{} succeeded ({:.1}%), {:.2}s total",
        cli.requests,
        f64::from(succeeded) / f64::from(cli.requests.max(1)) * 100.0,
        elapsed
    );
    println!("{}", serde_json::to_string_pretty(&crawler.stats())?);

    crawler.close().await;
    Ok(())
}
