use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::types::{TimeWindow, TokenPair, Venue};

pub const GRAPH_GATEWAY_URL: &str = "https://gateway.thegraph.com/api";

/// Subgraph deployment ids on The Graph decentralized network.
pub mod subgraph_ids {
    pub const UNISWAP_V2: &str = "EYCKATKGBKLWvSfwvBjzfCBmGwYNdVkduYXVivCsLRFu";
    pub const UNISWAP_V3: &str = "HUZDsRpEVP2AvzDCyzDHtdc64dyDxx8FQjzsmqSg4H3B";
    pub const COWSWAP: &str = "H2gFH3qBTB1GPzy1xTbf85P9JMhq6sHGMmu1JKUmA6bg";
}

/// Per-request HTTP timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_START_DATE: &str = "2024-01-01";
pub const DEFAULT_END_DATE: &str = "2024-01-02";
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 200;
pub const DEFAULT_N_BUCKETS: usize = 10;
pub const DEFAULT_RESAMPLE_INTERVAL_SECS: i64 = 60;
pub const DEFAULT_REFERENCE_PATH: &str = "data/cex_trades_binance_ETH_USDT-2024-01.csv";

#[derive(Debug, Clone)]
pub struct Config {
    /// First UTC day of the window, inclusive (START_DATE).
    pub start_date: NaiveDate,
    /// UTC day the window ends on, exclusive (END_DATE).
    pub end_date: NaiveDate,
    /// Rows requested per GraphQL page (PAGE_SIZE).
    pub page_size: usize,
    /// Sleep between pages to stay under gateway rate limits (PAGE_DELAY_MS).
    pub page_delay: Duration,
    /// Number of trade-size quantile buckets (N_BUCKETS).
    pub n_buckets: usize,
    /// Mid-price bucket width in seconds (RESAMPLE_INTERVAL_SECS).
    pub resample_interval_secs: i64,
    pub pair: TokenPair,
    /// Directory holding raw and aggregated CSVs (DATA_DIR).
    pub data_dir: PathBuf,
    /// Reference-exchange tick file (REFERENCE_PATH).
    pub reference_path: PathBuf,
    pub graph_api_key: Option<String>,
    pub uniswap_v2_url: Option<String>,
    pub uniswap_v3_url: Option<String>,
    pub cowswap_url: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let opt = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let start_date = parse_date("START_DATE", &var("START_DATE", DEFAULT_START_DATE))?;
        let end_date = parse_date("END_DATE", &var("END_DATE", DEFAULT_END_DATE))?;
        if end_date <= start_date {
            return Err(AppError::Config(format!(
                "END_DATE ({end_date}) must be after START_DATE ({start_date})"
            )));
        }

        let page_size = var("PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| AppError::Config("PAGE_SIZE must be a positive integer".to_string()))?;

        let page_delay_ms = var("PAGE_DELAY_MS", &DEFAULT_PAGE_DELAY_MS.to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Config("PAGE_DELAY_MS must be a whole number of milliseconds".to_string()))?;

        let n_buckets = var("N_BUCKETS", &DEFAULT_N_BUCKETS.to_string())
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| AppError::Config("N_BUCKETS must be a positive integer".to_string()))?;

        let resample_interval_secs = var(
            "RESAMPLE_INTERVAL_SECS",
            &DEFAULT_RESAMPLE_INTERVAL_SECS.to_string(),
        )
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| AppError::Config("RESAMPLE_INTERVAL_SECS must be a positive integer".to_string()))?;

        let pair = TokenPair::new(var("BASE_TOKEN", "WETH"), var("QUOTE_TOKEN", "USDT"));
        if pair.base == pair.quote {
            return Err(AppError::Config(format!(
                "BASE_TOKEN and QUOTE_TOKEN must differ (both are {})",
                pair.base
            )));
        }

        Ok(Self {
            start_date,
            end_date,
            page_size,
            page_delay: Duration::from_millis(page_delay_ms),
            n_buckets,
            resample_interval_secs,
            pair,
            data_dir: PathBuf::from(var("DATA_DIR", "data")),
            reference_path: PathBuf::from(var("REFERENCE_PATH", DEFAULT_REFERENCE_PATH)),
            graph_api_key: opt("GRAPH_API_KEY"),
            uniswap_v2_url: opt("UNISWAP_V2_SUBGRAPH_URL"),
            uniswap_v3_url: opt("UNISWAP_V3_SUBGRAPH_URL"),
            cowswap_url: opt("COWSWAP_SUBGRAPH_URL"),
            log_level: var("LOG_LEVEL", "info"),
        })
    }

    /// The configured dates as a `[start, end)` window of Unix seconds (UTC midnight).
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: midnight_secs(self.start_date),
            end: midnight_secs(self.end_date),
        }
    }

    /// Endpoint for a venue: explicit URL override first, then the gateway URL
    /// built from GRAPH_API_KEY.
    pub fn subgraph_url(&self, venue: Venue) -> Result<String> {
        let (explicit, id, env_name) = match venue {
            Venue::UniswapV2 => (&self.uniswap_v2_url, subgraph_ids::UNISWAP_V2, "UNISWAP_V2_SUBGRAPH_URL"),
            Venue::UniswapV3 => (&self.uniswap_v3_url, subgraph_ids::UNISWAP_V3, "UNISWAP_V3_SUBGRAPH_URL"),
            Venue::Cowswap => (&self.cowswap_url, subgraph_ids::COWSWAP, "COWSWAP_SUBGRAPH_URL"),
        };
        if let Some(url) = explicit {
            return Ok(url.clone());
        }
        match &self.graph_api_key {
            Some(key) => Ok(format!("{GRAPH_GATEWAY_URL}/{key}/subgraphs/id/{id}")),
            None => Err(AppError::Config(format!(
                "set GRAPH_API_KEY or {env_name} to fetch {venue} trades"
            ))),
        }
    }

    pub fn raw_trades_path(&self, venue: Venue) -> PathBuf {
        self.data_dir.join(format!("{}_trades.csv", venue.slug()))
    }

    pub fn aggregated_path(&self, venue: Venue) -> PathBuf {
        self.data_dir.join(format!("{}_aggregated.csv", venue.slug()))
    }
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Config(format!("{name} must be a YYYY-MM-DD date, got {value:?}")))
}

fn midnight_secs(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
