//! Ockean CLI - cluster tickers by return co-movement.
//!
//! Every command prints a JSON `ApiResponse` envelope on stdout; logs go to
//! stderr and are filtered with `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ockean_core::{
    cluster_sizes, cluster_with, compute_features, compute_returns, correlation_matrix,
    report::{
        cluster_sizes_from_rows, read_assignment_csv, write_assignment_csv,
        write_correlation_csv, write_scan_csv, write_sizes_csv,
    },
    scan_with,
    store::{ingest_many, read_tickers_file},
    ApiResponse, DateWindow, JsonPriceStore, Settings,
};

#[derive(Parser)]
#[command(name = "ockean")]
#[command(about = "Ockean - cluster tickers by how their daily returns move together")]
#[command(version)]
struct Cli {
    /// Price store file (default: $OCKEAN_STORE_FILE or ~/.ockean/prices.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file (default: $OCKEAN_CONFIG or <config dir>/ockean/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster tickers into k groups and write ticker,cluster rows
    Cluster {
        /// Window start (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: String,
        /// Window end (YYYY-MM-DD, exclusive)
        #[arg(long)]
        end: String,
        /// Number of clusters
        #[arg(long)]
        k: usize,
        /// Output CSV path
        #[arg(long)]
        out: PathBuf,
        /// Restrict to these tickers (default: every stored ticker)
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,
        /// Independent k-means restarts
        #[arg(long)]
        restarts: Option<usize>,
        /// Base random seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score every k in a range by mean silhouette and write k,silhouette rows
    Silhouette {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Smallest k to try (floored to 2)
        #[arg(long)]
        kmin: Option<usize>,
        /// Largest k to try (capped to the ticker count minus one)
        #[arg(long)]
        kmax: Option<usize>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,
        #[arg(long)]
        restarts: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write the return correlation matrix and cluster sizes
    Report {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Assignment CSV written by `ockean cluster`
        #[arg(long)]
        clusters_csv: PathBuf,
        /// Artifact directory (default: output_dir from config)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,
    },
    /// Load per-ticker OHLCV CSV files into the price store
    Ingest {
        /// One symbol per line; blank lines and # comments are skipped
        #[arg(long)]
        tickers_file: PathBuf,
        /// Directory holding <SYMBOL>.csv files
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        start: String,
        /// Window end, exclusive (default: tomorrow)
        #[arg(long)]
        end: Option<String>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(data) => {
            print_response(&ApiResponse::ok(data));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            print_response(&ApiResponse::<()>::err(format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_response<T: serde::Serialize>(response: &ApiResponse<T>) {
    match serde_json::to_string_pretty(response) {
        Ok(body) => println!("{}", body),
        Err(e) => eprintln!("failed to encode response: {}", e),
    }
}

fn run(cli: Cli) -> Result<Value> {
    let settings = Settings::load(cli.config.as_deref()).context("loading config")?;
    let store_path = cli
        .store
        .or_else(|| settings.store_path.clone())
        .unwrap_or_else(JsonPriceStore::default_path);

    match cli.command {
        Commands::Cluster {
            start,
            end,
            k,
            out,
            tickers,
            restarts,
            seed,
        } => {
            let store = open_store(&store_path)?;
            let window = DateWindow::parse(&start, &end)?;
            let returns = compute_returns(&store, &window, ticker_filter(&tickers))?;
            let features = compute_features(&returns)?;
            let params = settings.cluster_params(restarts, seed);
            let assignment = cluster_with(&features, k, &params)?;
            write_assignment_csv(&out, &assignment)
                .with_context(|| format!("writing {}", out.display()))?;

            Ok(json!({
                "out": out,
                "k": assignment.k(),
                "tickers": assignment.tickers().len(),
                "inertia": assignment.inertia(),
                "trial": assignment.trial(),
                "iterations": assignment.iterations(),
                "sizes": cluster_sizes(&assignment),
            }))
        }
        Commands::Silhouette {
            start,
            end,
            kmin,
            kmax,
            out,
            tickers,
            restarts,
            seed,
        } => {
            let store = open_store(&store_path)?;
            let window = DateWindow::parse(&start, &end)?;
            let returns = compute_returns(&store, &window, ticker_filter(&tickers))?;
            let features = compute_features(&returns)?;
            let params = settings.cluster_params(restarts, seed);
            let scan = scan_with(
                &features,
                kmin.unwrap_or(settings.scan.k_min),
                kmax.unwrap_or(settings.scan.k_max),
                &params,
            )?;
            write_scan_csv(&out, scan.rows())
                .with_context(|| format!("writing {}", out.display()))?;

            Ok(json!({
                "out": out,
                "k_min": scan.range().k_min,
                "k_max": scan.range().k_max,
                "best_k": scan.best().map(|row| row.k),
                "rows": scan.rows(),
            }))
        }
        Commands::Report {
            start,
            end,
            clusters_csv,
            out_dir,
            tickers,
        } => {
            let out_dir = out_dir.unwrap_or_else(|| settings.output_dir.clone());
            let store = open_store(&store_path)?;
            let window = DateWindow::parse(&start, &end)?;
            let returns = compute_returns(&store, &window, ticker_filter(&tickers))?;

            let corr_path = out_dir.join("correlations.csv");
            write_correlation_csv(&corr_path, &correlation_matrix(&returns))
                .with_context(|| format!("writing {}", corr_path.display()))?;

            let rows = read_assignment_csv(&clusters_csv)
                .with_context(|| format!("reading {}", clusters_csv.display()))?;
            let sizes = cluster_sizes_from_rows(&rows);
            let sizes_path = out_dir.join("cluster_sizes.csv");
            write_sizes_csv(&sizes_path, &sizes)
                .with_context(|| format!("writing {}", sizes_path.display()))?;

            Ok(json!({
                "correlations": corr_path,
                "cluster_sizes": sizes_path,
                "sizes": sizes,
            }))
        }
        Commands::Ingest {
            tickers_file,
            data_dir,
            start,
            end,
        } => {
            let start = parse_date(&start)?;
            let end = match end {
                Some(end) => parse_date(&end)?,
                None => tomorrow()?,
            };
            let window = DateWindow::new(start, end)?;
            let symbols = read_tickers_file(&tickers_file)
                .with_context(|| format!("reading {}", tickers_file.display()))?;

            let mut store = open_store(&store_path)?;
            let summary = ingest_many(&mut store, &symbols, &data_dir, &window)?;
            store
                .save()
                .with_context(|| format!("saving {}", store_path.display()))?;

            Ok(json!({
                "store": store_path,
                "start": window.start,
                "end": window.end,
                "summary": summary,
            }))
        }
    }
}

fn open_store(path: &Path) -> Result<JsonPriceStore> {
    JsonPriceStore::open(path).with_context(|| format!("opening price store {}", path.display()))
}

fn ticker_filter(tickers: &[String]) -> Option<&[String]> {
    (!tickers.is_empty()).then_some(tickers)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", value))
}

fn tomorrow() -> Result<NaiveDate> {
    Local::now()
        .date_naive()
        .checked_add_days(Days::new(1))
        .context("date overflow computing tomorrow")
}
