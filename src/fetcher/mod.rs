pub mod cowswap;
pub mod uniswap_v2;
pub mod uniswap_v3;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::table::{self, TableRow};
use crate::types::{TimeWindow, TokenPair, Venue};

/// A record type served by one of the subgraphs.
pub trait SubgraphEntity: DeserializeOwned {
    /// Flat row written to the raw dump.
    type Row: TableRow;

    const VENUE: Venue;
    /// Top-level field under `data` holding the page, e.g. `swaps`.
    const COLLECTION: &'static str;
    /// GraphQL document taking `$startTime`, `$endTime`, `$lastID` and `$first`.
    const QUERY: &'static str;

    /// Keyset pagination cursor.
    fn id(&self) -> &str;
    fn matches_pair(&self, pair: &TokenPair) -> bool;
    fn into_row(self) -> Self::Row;
}

/// `{ symbol }` selection shared by the pool-based subgraphs.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSymbol {
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolTokens {
    pub token0: TokenSymbol,
    pub token1: TokenSymbol,
}

impl PoolTokens {
    /// Both tokens must belong to the pair.
    pub fn within(&self, pair: &TokenPair) -> bool {
        pair.contains(&self.token0.symbol) && pair.contains(&self.token1.symbol)
    }
}

/// How a pagination run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// Stopped on an empty page.
    Complete(Vec<T>),
    /// Stopped early after accumulating some rows.
    Partial(Vec<T>, String),
    /// Stopped early with nothing accumulated.
    Failed(String),
}

impl<T> FetchOutcome<T> {
    pub fn rows(&self) -> &[T] {
        match self {
            FetchOutcome::Complete(rows) | FetchOutcome::Partial(rows, _) => rows,
            FetchOutcome::Failed(_) => &[],
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, FetchOutcome::Complete(_))
    }

    /// Apply `f` to the accumulated rows, keeping the outcome kind.
    pub fn map_rows<U, F>(self, f: F) -> FetchOutcome<U>
    where
        F: FnOnce(Vec<T>) -> Vec<U>,
    {
        match self {
            FetchOutcome::Complete(rows) => FetchOutcome::Complete(f(rows)),
            FetchOutcome::Partial(rows, reason) => FetchOutcome::Partial(f(rows), reason),
            FetchOutcome::Failed(reason) => FetchOutcome::Failed(reason),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: usize,
    pub fetched: usize,
    pub rejected_pair: usize,
    pub kept: usize,
}

#[derive(Debug, Clone)]
pub struct FetchParams {
    pub url: String,
    pub window: TimeWindow,
    pub page_size: usize,
    pub page_delay: Duration,
}

impl FetchParams {
    pub fn from_config(cfg: &Config, url: String) -> Self {
        Self {
            url,
            window: cfg.window(),
            page_size: cfg.page_size,
            page_delay: cfg.page_delay,
        }
    }
}

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// Page through `T::COLLECTION` in `[window.start, window.end)` ordered by id,
/// one request at a time, until an empty page comes back.
///
/// Transport failures and malformed responses are logged and end the run
/// early; they show up as `Partial` or `Failed` rather than as an error.
pub async fn fetch_paginated<T: SubgraphEntity>(
    client: &reqwest::Client,
    params: &FetchParams,
) -> (FetchOutcome<T>, FetchStats) {
    let mut rows: Vec<T> = Vec::new();
    let mut stats = FetchStats::default();
    let mut last_id = String::new();

    let stop_reason = loop {
        debug!(venue = %T::VENUE, last_id = %last_id, "Fetching page");
        let page = match fetch_page::<T>(client, params, &last_id).await {
            Ok(page) => page,
            Err(reason) => break Some(reason),
        };

        if page.is_empty() {
            break None;
        }
        if let Err(reason) = check_keyset(&page, &last_id) {
            warn!(venue = %T::VENUE, "{reason}");
            break Some(reason);
        }

        stats.pages += 1;
        stats.fetched += page.len();
        if let Some(last) = page.last() {
            last_id = last.id().to_string();
        }
        rows.extend(page);
        debug!(
            venue = %T::VENUE,
            pages = stats.pages,
            total = rows.len(),
            "Page received"
        );

        if !params.page_delay.is_zero() {
            tokio::time::sleep(params.page_delay).await;
        }
    };

    let outcome = match stop_reason {
        None => FetchOutcome::Complete(rows),
        Some(reason) if rows.is_empty() => FetchOutcome::Failed(reason),
        Some(reason) => FetchOutcome::Partial(rows, reason),
    };
    (outcome, stats)
}

async fn fetch_page<T: SubgraphEntity>(
    client: &reqwest::Client,
    params: &FetchParams,
    last_id: &str,
) -> std::result::Result<Vec<T>, String> {
    let body = json!({
        "query": T::QUERY,
        "variables": {
            "startTime": params.window.start,
            "endTime": params.window.end,
            "lastID": last_id,
            "first": params.page_size,
        },
    });

    let resp = match client.post(&params.url).json(&body).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(venue = %T::VENUE, "Request failed: {e}");
            return Err(format!("request failed: {e}"));
        }
    };
    let text = match resp.text().await {
        Ok(t) => t,
        Err(e) => {
            warn!(venue = %T::VENUE, "Failed to read response body: {e}");
            return Err(format!("failed to read response body: {e}"));
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            warn!(venue = %T::VENUE, "Error in response (not JSON): {text}");
            return Err(format!("response is not JSON: {e}"));
        }
    };

    let items = match value.get("data").and_then(|d| d.get(T::COLLECTION)) {
        Some(items) if items.is_array() => items.clone(),
        _ => {
            warn!(venue = %T::VENUE, "Error in response: {value}");
            return Err(format!("response has no data.{} array", T::COLLECTION));
        }
    };

    serde_json::from_value::<Vec<T>>(items).map_err(|e| {
        warn!(venue = %T::VENUE, "Unexpected {} shape: {e}", T::COLLECTION);
        format!("malformed {} rows: {e}", T::COLLECTION)
    })
}

/// Ids in a page must strictly increase, starting past the previous cursor.
fn check_keyset<T: SubgraphEntity>(page: &[T], last_id: &str) -> std::result::Result<(), String> {
    let mut prev = last_id;
    for row in page {
        if row.id() <= prev {
            return Err(format!(
                "cursor did not advance: id {:?} follows {:?}",
                row.id(),
                prev
            ));
        }
        prev = row.id();
    }
    Ok(())
}

/// Drop rows outside the configured pair.
pub fn retain_pair<T: SubgraphEntity>(
    outcome: FetchOutcome<T>,
    pair: &TokenPair,
    stats: &mut FetchStats,
) -> FetchOutcome<T> {
    let outcome = outcome.map_rows(|rows| {
        let before = rows.len();
        let kept: Vec<T> = rows.into_iter().filter(|r| r.matches_pair(pair)).collect();
        stats.rejected_pair += before - kept.len();
        kept
    });
    stats.kept = outcome.rows().len();
    outcome
}

/// Fetch one venue for the configured window and write its raw dump.
/// A `Partial` run still writes what was fetched; a `Failed` run is an error.
pub async fn run<T: SubgraphEntity>(cfg: &Config) -> Result<()> {
    let url = cfg.subgraph_url(T::VENUE)?;
    let client = http_client()?;
    let params = FetchParams::from_config(cfg, url);

    info!(
        venue = %T::VENUE,
        pair = %cfg.pair,
        start = %cfg.start_date,
        end = %cfg.end_date,
        page_size = params.page_size,
        "Fetching {} trades",
        T::VENUE
    );

    let (outcome, mut stats) = fetch_paginated::<T>(&client, &params).await;
    let outcome = retain_pair(outcome, &cfg.pair, &mut stats);

    let rows = match outcome {
        FetchOutcome::Complete(rows) => rows,
        FetchOutcome::Partial(rows, reason) => {
            warn!(
                venue = %T::VENUE,
                kept = rows.len(),
                "Pagination stopped early, keeping partial result: {reason}"
            );
            rows
        }
        FetchOutcome::Failed(reason) => {
            return Err(AppError::Upstream(format!("{}: {reason}", T::VENUE)));
        }
    };

    let path = cfg.raw_trades_path(T::VENUE);
    let rows: Vec<T::Row> = rows.into_iter().map(SubgraphEntity::into_row).collect();
    table::write_rows(&path, &rows)?;

    info!(
        venue = %T::VENUE,
        pages = stats.pages,
        fetched = stats.fetched,
        rejected_pair = stats.rejected_pair,
        kept = stats.kept,
        "Fetched {} {} rows for {}, saved to {}",
        stats.kept,
        T::VENUE,
        cfg.pair,
        path.display()
    );
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::params;
    use super::uniswap_v3::UniswapV3Swap;
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn swap(id: &str, t0: &str, t1: &str) -> Value {
        json!({
            "id": id,
            "timestamp": "1704067300",
            "amount0": "-1.0",
            "amount1": "2280.0",
            "pool": { "token0": { "symbol": t0 }, "token1": { "symbol": t1 } },
        })
    }

    fn page(rows: Vec<Value>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "data": { "swaps": rows } }))
    }

    async fn mount_page(server: &MockServer, last_id: &str, rows: Vec<Value>) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "lastID": last_id } })))
            .respond_with(page(rows))
            .expect(1)
            .mount(server)
            .await;
    }

    fn ids<T: SubgraphEntity>(rows: &[T]) -> Vec<String> {
        rows.iter().map(|r| r.id().to_string()).collect()
    }

    #[tokio::test]
    async fn pages_by_last_id_until_empty_page() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![swap("0xa-1", "WETH", "USDT"), swap("0xa-2", "WETH", "USDT")]).await;
        mount_page(&server, "0xa-2", vec![swap("0xb-1", "WETH", "USDT")]).await;
        mount_page(&server, "0xb-1", vec![]).await;

        let client = http_client().unwrap();
        let (outcome, stats) =
            fetch_paginated::<UniswapV3Swap>(&client, &params(server.uri(), 2)).await;

        assert!(outcome.is_complete());
        assert_eq!(ids(outcome.rows()), vec!["0xa-1", "0xa-2", "0xb-1"]);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.fetched, 3);
    }

    #[tokio::test]
    async fn request_carries_window_and_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "variables": { "startTime": 1_704_067_200, "endTime": 1_704_153_600, "first": 500 }
            })))
            .respond_with(page(vec![]))
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let (outcome, _) =
            fetch_paginated::<UniswapV3Swap>(&client, &params(server.uri(), 500)).await;
        assert!(outcome.is_complete());
        assert!(outcome.rows().is_empty());
    }

    #[tokio::test]
    async fn error_shape_after_first_page_is_partial() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![swap("0x1", "WETH", "USDT")]).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "lastID": "0x1" } })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "errors": [{ "message": "indexer unavailable" }] })),
            )
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let (outcome, _) =
            fetch_paginated::<UniswapV3Swap>(&client, &params(server.uri(), 1)).await;

        match outcome {
            FetchOutcome::Partial(rows, reason) => {
                assert_eq!(ids(&rows), vec!["0x1"]);
                assert!(reason.contains("data.swaps"), "reason: {reason}");
            }
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_shape_on_first_page_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let (outcome, stats) =
            fetch_paginated::<UniswapV3Swap>(&client, &params(server.uri(), 1)).await;

        assert!(matches!(outcome, FetchOutcome::Failed(_)));
        assert!(outcome.rows().is_empty());
        assert_eq!(stats.pages, 0);
    }

    #[tokio::test]
    async fn non_advancing_cursor_stops_pagination() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![swap("0x2", "WETH", "USDT")]).await;
        mount_page(&server, "0x2", vec![swap("0x1", "WETH", "USDT")]).await;

        let client = http_client().unwrap();
        let (outcome, _) =
            fetch_paginated::<UniswapV3Swap>(&client, &params(server.uri(), 1)).await;

        match outcome {
            FetchOutcome::Partial(rows, reason) => {
                assert_eq!(ids(&rows), vec!["0x2"]);
                assert!(reason.contains("cursor did not advance"));
            }
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pair_filter_applies_to_partial_rows() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![swap("0x1", "WETH", "USDT"), swap("0x2", "WETH", "USDC")]).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "lastID": "0x2" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let (outcome, mut stats) =
            fetch_paginated::<UniswapV3Swap>(&client, &params(server.uri(), 2)).await;
        let outcome = retain_pair(outcome, &TokenPair::new("WETH", "USDT"), &mut stats);

        assert!(matches!(outcome, FetchOutcome::Partial(_, _)));
        assert_eq!(ids(outcome.rows()), vec!["0x1"]);
        assert_eq!(stats.rejected_pair, 1);
        assert_eq!(stats.kept, 1);
    }

    fn config_for(server: &MockServer, data_dir: &std::path::Path) -> Config {
        let uri = server.uri();
        let dir = data_dir.display().to_string();
        Config::from_lookup(|key| match key {
            "UNISWAP_V3_SUBGRAPH_URL" => Some(uri.clone()),
            "DATA_DIR" => Some(dir.clone()),
            "PAGE_DELAY_MS" => Some("0".to_string()),
            "PAGE_SIZE" => Some("2".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn raw_ids(path: &std::path::Path) -> Vec<String> {
        table::read_rows::<uniswap_v3::UniswapV3Row>(path)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    #[tokio::test]
    async fn run_writes_pair_filtered_rows_to_raw_dump() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![swap("0x1", "USDT", "WETH"), swap("0x2", "WBTC", "USDT")]).await;
        mount_page(&server, "0x2", vec![swap("0x3", "WETH", "USDT")]).await;
        mount_page(&server, "0x3", vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_for(&server, dir.path());

        run::<UniswapV3Swap>(&cfg).await.unwrap();

        let path = dir.path().join("uniswap_v3_trades.csv");
        assert_eq!(raw_ids(&path), vec!["0x1", "0x3"]);
    }

    #[tokio::test]
    async fn run_keeps_partial_result_on_disk() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![swap("0x1", "WETH", "USDT"), swap("0x2", "WETH", "USDT")]).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "lastID": "0x2" } })))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_for(&server, dir.path());

        run::<UniswapV3Swap>(&cfg).await.unwrap();

        assert_eq!(raw_ids(&cfg.raw_trades_path(Venue::UniswapV3)), vec!["0x1", "0x2"]);
    }

    #[tokio::test]
    async fn run_fails_without_writing_when_nothing_was_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": [{ "message": "bad key" }] })))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_for(&server, dir.path());

        let err = run::<UniswapV3Swap>(&cfg).await.unwrap_err();

        assert!(matches!(err, AppError::Upstream(_)), "got {err:?}");
        assert!(!cfg.raw_trades_path(Venue::UniswapV3).exists());
    }

    #[tokio::test]
    async fn run_with_no_trades_writes_header_only_table() {
        let server = MockServer::start().await;
        mount_page(&server, "", vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_for(&server, dir.path());

        run::<UniswapV3Swap>(&cfg).await.unwrap();

        let path = cfg.raw_trades_path(Venue::UniswapV3);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "id,timestamp,token0,token1,amount0,amount1");
        assert!(raw_ids(&path).is_empty());
    }

    #[test]
    fn failed_outcome_has_no_rows_after_mapping() {
        let outcome: FetchOutcome<u32> = FetchOutcome::Failed("boom".to_string());
        let mapped = outcome.map_rows(|rows| rows.into_iter().map(|r| r * 2).collect::<Vec<_>>());
        assert_eq!(mapped, FetchOutcome::Failed("boom".to_string()));
    }
}
