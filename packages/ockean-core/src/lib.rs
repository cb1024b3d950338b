//! Ockean Core - Return-based clustering of tickers.
//!
//! This crate turns a store of daily closing prices into groups of tickers that
//! move alike, and into a silhouette profile of how many groups the data supports:
//!
//! - **Price store**: Keyed `(ticker, date)` records with idempotent upsert
//! - **Panel building**: Date-aligned close prices, one column per ticker
//! - **Returns and features**: Log returns, row-wise z-score standardization
//! - **Clustering**: Seeded k-means (Lloyd's algorithm) with parallel restarts
//! - **Silhouette scans**: Mean silhouette coefficient per candidate k
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use ockean_core::{cluster, compute_features, compute_returns, DateWindow, JsonPriceStore};
//!
//! let store = JsonPriceStore::open(JsonPriceStore::default_path()).unwrap();
//! let window = DateWindow::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
//! )
//! .unwrap();
//!
//! let returns = compute_returns(&store, &window, None).unwrap();
//! let features = compute_features(&returns).unwrap();
//! let assignment = cluster(&features, 3, 25, 42).unwrap();
//!
//! for row in assignment.rows() {
//!     println!("{} -> {}", row.ticker, row.cluster);
//! }
//! ```

pub mod clustering;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use types::{ApiResponse, DateWindow, PriceRecord};

// Re-export main functionality
pub use clustering::{
    cluster, cluster_with, scan, scan_with, ClusterAssignment, ClusterParams, ClusterRow, KRange,
    SilhouetteRow, SilhouetteScan,
};
pub use config::{ScanSettings, Settings};
pub use data::{
    build_panel, log_returns, standardize_rows, FeatureMatrix, PricePanel, ReturnMatrix,
    STD_EPSILON,
};
pub use pipeline::{compute_features, compute_returns};
pub use report::{cluster_sizes, correlation_matrix, ClusterSize, CorrelationMatrix};
pub use store::{ingest_many, IngestSummary, JsonPriceStore, MemoryPriceStore, PriceStore};

/// Error types for ockean-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Date error: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("Empty price panel: {0}")]
    EmptyPanel(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid {name}: requested {value}, valid range is [{min}, {max}]")]
    InvalidParameter {
        name: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("k range invalid after capping: {k_min} to {k_max} with n = {n}")]
    InvalidRange { k_min: usize, k_max: usize, n: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for ockean-core operations.
pub type Result<T> = std::result::Result<T, Error>;
