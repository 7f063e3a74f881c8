pub mod bucket;
pub mod join;
pub mod resample;

pub use bucket::{bucketize, quantile_edges};
pub use join::{join_nearest, JoinedTrade};
pub use resample::{resample_mid_prices, PriceTick};

use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::cowswap::CowOrderRow;
use crate::fetcher::uniswap_v2::UniswapV2Row;
use crate::fetcher::uniswap_v3::UniswapV3Row;
use crate::pricing::{normalize, Normalized, VenueTrade};
use crate::table::{self, TableRow};
use crate::types::{AggregatedBucket, MidPricePoint, TokenPair, Venue};

/// Cost comparison for one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueReport {
    pub venue: Venue,
    /// Trades that entered the join.
    pub trades: usize,
    pub skipped_degenerate: usize,
    /// Trades whose nearest reference bucket had no value.
    pub unmatched: usize,
    pub buckets: Vec<AggregatedBucket>,
}

/// Join normalized trades to the mid-price series and bucket them by size.
pub fn analyze_venue(
    venue: Venue,
    normalized: Normalized,
    mids: &[MidPricePoint],
    n_buckets: usize,
) -> VenueReport {
    let trades = normalized.trades.len();
    let joined = join_nearest(normalized.trades, mids);
    let unmatched = joined.iter().filter(|j| j.price_diff.is_none()).count();
    VenueReport {
        venue,
        trades,
        skipped_degenerate: normalized.skipped_degenerate,
        unmatched,
        buckets: bucketize(&joined, n_buckets),
    }
}

/// Compare every venue with a raw dump in `cfg.data_dir` against the
/// reference series and write one aggregated table per venue. Venues without
/// a dump are skipped. Returns the number of venues aggregated.
pub fn run(cfg: &Config) -> Result<usize> {
    // --- Reference mid-prices ---
    let ticks = table::read_reference_ticks(&cfg.reference_path)?;
    let mids = resample_mid_prices(&ticks, cfg.resample_interval_secs);
    info!(
        ticks = ticks.len(),
        buckets = mids.len(),
        interval_secs = cfg.resample_interval_secs,
        "Loaded reference ticks from {}",
        cfg.reference_path.display()
    );
    if mids.is_empty() {
        warn!("Reference series is empty; every trade will be unmatched");
    }

    // --- Per-venue cost comparison ---
    let mut analyzed = 0usize;
    for venue in Venue::ALL {
        let raw_path = cfg.raw_trades_path(venue);
        if !raw_path.exists() {
            warn!(venue = %venue, "No raw trades at {}, skipping", raw_path.display());
            continue;
        }

        let normalized = load_normalized(venue, &raw_path, &cfg.pair)?;
        let report = analyze_venue(venue, normalized, &mids, cfg.n_buckets);
        log_report(&report);

        let out_path = cfg.aggregated_path(venue);
        table::write_aggregated(&out_path, &report.buckets)?;
        info!(venue = %venue, "Saved {} buckets to {}", report.buckets.len(), out_path.display());
        analyzed += 1;
    }

    info!("Analysis done: {analyzed} venue(s) aggregated in {}", cfg.data_dir.display());
    Ok(analyzed)
}

fn load_normalized(venue: Venue, path: &Path, pair: &TokenPair) -> Result<Normalized> {
    match venue {
        Venue::UniswapV2 => load_rows::<UniswapV2Row>(path, pair),
        Venue::UniswapV3 => load_rows::<UniswapV3Row>(path, pair),
        Venue::Cowswap => load_rows::<CowOrderRow>(path, pair),
    }
}

fn load_rows<T: TableRow + VenueTrade>(path: &Path, pair: &TokenPair) -> Result<Normalized> {
    let rows = table::read_rows::<T>(path)?;
    normalize(&rows, pair)
}

fn log_report(r: &VenueReport) {
    if r.skipped_degenerate > 0 {
        warn!(
            venue = %r.venue,
            skipped = r.skipped_degenerate,
            "Skipped trades with a zero leg or non-finite price"
        );
    }
    if r.unmatched > 0 {
        warn!(
            venue = %r.venue,
            unmatched = r.unmatched,
            "Trades without a reference mid-price are excluded from bucket means"
        );
    }
    info!(
        venue = %r.venue,
        trades = r.trades,
        buckets = r.buckets.len(),
        "{} | trades: {} | buckets: {}",
        r.venue, r.trades, r.buckets.len(),
    );
    for b in &r.buckets {
        let avg = b
            .avg_cost_diff
            .map(|d| format!("{d:+.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        info!(
            venue = %r.venue,
            "  {:<28} | trades: {:>6} | avg cost diff: {}",
            b.label(), b.trade_count, avg,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::AggregatedRow;
    use crate::types::NormalizedTrade;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::fs;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn identical_trades_against_one_mid_give_one_bucket() {
        let trades = (0..3)
            .map(|i| NormalizedTrade {
                timestamp_dt: at(0, 0, 10 + i),
                realized_price: 105.0,
                trade_size_usd: 100.0,
            })
            .collect();
        let mids = vec![MidPricePoint { datetime: at(0, 0, 0), mid_price: Some(100.0) }];

        let report = analyze_venue(
            Venue::UniswapV2,
            Normalized { trades, skipped_degenerate: 0 },
            &mids,
            10,
        );

        assert_eq!(report.trades, 3);
        assert_eq!(report.unmatched, 0);
        assert_eq!(report.buckets.len(), 1);
        assert_eq!(report.buckets[0].avg_cost_diff, Some(5.0));
        assert_eq!(report.buckets[0].trade_count, 3);
    }

    #[test]
    fn zero_trades_produce_empty_report() {
        let mids = resample_mid_prices(
            &[PriceTick { datetime: at(0, 0, 0), mid_price: Some(1.0) }],
            60,
        );
        let report = analyze_venue(Venue::Cowswap, Normalized::default(), &mids, 10);
        assert_eq!(report.trades, 0);
        assert!(report.buckets.is_empty());
    }

    #[test]
    fn resampled_series_feeds_the_join() {
        let ticks = vec![
            PriceTick { datetime: at(0, 0, 5), mid_price: Some(100.0) },
            PriceTick { datetime: at(0, 2, 5), mid_price: Some(104.0) },
        ];
        let mids = resample_mid_prices(&ticks, 60);
        // 00:01:10 is nearest the 00:01:00 bucket, which carries 100 forward
        let trades = vec![NormalizedTrade {
            timestamp_dt: at(0, 1, 10),
            realized_price: 101.0,
            trade_size_usd: 50.0,
        }];
        let report = analyze_venue(
            Venue::UniswapV3,
            Normalized { trades, skipped_degenerate: 2 },
            &mids,
            10,
        );
        assert_eq!(report.skipped_degenerate, 2);
        assert_eq!(report.buckets[0].avg_cost_diff, Some(1.0));
    }

    fn config_in(dir: &Path) -> Config {
        let data_dir = dir.display().to_string();
        let reference = dir.join("reference.csv").display().to_string();
        Config::from_lookup(|key| match key {
            "DATA_DIR" => Some(data_dir.clone()),
            "REFERENCE_PATH" => Some(reference.clone()),
            "N_BUCKETS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn run_aggregates_raw_dump_against_reference_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        fs::write(
            &cfg.reference_path,
            "datetime,mid_price\n2024-01-01 00:00:00,2000\n2024-01-01 00:01:00,2000\n",
        )
        .unwrap();
        let rows = vec![
            // trader bought 1 WETH for 2010 USDT at 00:00:10
            UniswapV3Row {
                id: "0x1".to_string(),
                timestamp: 1_704_067_210,
                token0: "WETH".to_string(),
                token1: "USDT".to_string(),
                amount0: "-1".to_string(),
                amount1: "2010".to_string(),
            },
            // trader sold 1 WETH for 1995 USDT at 00:01:05
            UniswapV3Row {
                id: "0x2".to_string(),
                timestamp: 1_704_067_265,
                token0: "WETH".to_string(),
                token1: "USDT".to_string(),
                amount0: "1".to_string(),
                amount1: "-1995".to_string(),
            },
        ];
        table::write_rows(&cfg.raw_trades_path(Venue::UniswapV3), &rows).unwrap();

        assert_eq!(run(&cfg).unwrap(), 1);

        let out = table::read_rows::<AggregatedRow>(&cfg.aggregated_path(Venue::UniswapV3)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trade_count, 2);
        assert_eq!(out[0].avg_cost_diff, Some(2.5));
        assert_eq!(out[0].bucket, "[1995, 2010]");
    }

    #[test]
    fn run_skips_venues_without_raw_dump() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        fs::write(&cfg.reference_path, "timestamp,mid_price\n1704067200000,2000\n").unwrap();

        assert_eq!(run(&cfg).unwrap(), 0);
        for venue in Venue::ALL {
            assert!(!cfg.aggregated_path(venue).exists(), "{venue} should be skipped");
        }
    }

    #[test]
    fn run_fails_on_missing_reference_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        assert!(run(&cfg).is_err());
    }
}
