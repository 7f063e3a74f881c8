use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Venue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    UniswapV2,
    UniswapV3,
    Cowswap,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::UniswapV2, Venue::UniswapV3, Venue::Cowswap];

    /// File-name prefix for this venue's tables.
    pub fn slug(&self) -> &'static str {
        match self {
            Venue::UniswapV2 => "uniswap_v2",
            Venue::UniswapV3 => "uniswap_v3",
            Venue::Cowswap => "cowswap",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Venue::UniswapV2 => "Uniswap v2",
            Venue::UniswapV3 => "Uniswap v3",
            Venue::Cowswap => "CoW Swap",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Pair and window
// ---------------------------------------------------------------------------

/// The traded pair. Prices are always quoted as `quote` per unit of `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub base: String,
    pub quote: String,
}

impl TokenPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        symbol == self.base || symbol == self.quote
    }

    /// True when `{a, b}` is exactly `{base, quote}`, in either order.
    pub fn is_exactly(&self, a: &str, b: &str) -> bool {
        (a == self.base && b == self.quote) || (a == self.quote && b == self.base)
    }
}

impl std::fmt::Display for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Half-open `[start, end)` window in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

// ---------------------------------------------------------------------------
// Normalized and aggregated rows
// ---------------------------------------------------------------------------

/// A DEX trade reduced to what the cost comparison needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTrade {
    pub timestamp_dt: NaiveDateTime,
    /// Quote per base, always positive.
    pub realized_price: f64,
    /// Quote-currency magnitude of the trade.
    pub trade_size_usd: f64,
}

/// One fixed-width reference bucket. `mid_price` is `None` only for leading
/// buckets that precede the first tick with a value.
#[derive(Debug, Clone, PartialEq)]
pub struct MidPricePoint {
    pub datetime: NaiveDateTime,
    pub mid_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedBucket {
    pub lower: f64,
    pub upper: f64,
    /// Whether `lower` itself belongs to the interval (first bucket only).
    pub closed_left: bool,
    pub trade_count: usize,
    /// Mean of `realized_price - mid_price`; `None` when no trade in the
    /// bucket matched a reference value.
    pub avg_cost_diff: Option<f64>,
}

impl AggregatedBucket {
    pub fn label(&self) -> String {
        let open = if self.closed_left { '[' } else { '(' };
        format!("{open}{}, {}]", self.lower, self.upper)
    }
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// Unix seconds to a timezone-naive UTC datetime.
pub fn naive_from_secs(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

/// Unix milliseconds to a timezone-naive UTC datetime.
pub fn naive_from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Subgraphs encode BigInt as a JSON string; some gateways send plain numbers.
pub fn de_i64_lenient<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Num(i64),
        Str(String),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Optional variant of [`de_i64_lenient`]; pair with `#[serde(default)]`.
pub fn de_opt_i64_lenient<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Num(i64),
        Str(String),
    }

    match Option::<StrOrNum>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StrOrNum::Num(n)) => Ok(Some(n)),
        Some(StrOrNum::Str(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Decimal amounts are kept as text so the raw dump preserves full precision.
pub fn de_decimal_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a decimal string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "de_i64_lenient")]
        ts: i64,
        #[serde(deserialize_with = "de_decimal_text")]
        amount: String,
    }

    #[test]
    fn lenient_numbers_accept_strings_and_numbers() {
        let a: Probe = serde_json::from_str(r#"{"ts":"1704067200","amount":"1.50"}"#).unwrap();
        assert_eq!(a.ts, 1_704_067_200);
        assert_eq!(a.amount, "1.50");

        let b: Probe = serde_json::from_str(r#"{"ts":1704067200,"amount":2}"#).unwrap();
        assert_eq!(b.ts, 1_704_067_200);
        assert_eq!(b.amount, "2");
    }

    #[test]
    fn pair_membership_and_exact_match() {
        let pair = TokenPair::new("WETH", "USDT");
        assert!(pair.contains("WETH"));
        assert!(!pair.contains("USDC"));
        assert!(pair.is_exactly("USDT", "WETH"));
        assert!(!pair.is_exactly("WETH", "WETH"));
    }

    #[test]
    fn bucket_labels_mark_closed_first_interval() {
        let mut b = AggregatedBucket {
            lower: 1.0,
            upper: 2.5,
            closed_left: true,
            trade_count: 3,
            avg_cost_diff: Some(0.1),
        };
        assert_eq!(b.label(), "[1, 2.5]");
        b.closed_left = false;
        assert_eq!(b.label(), "(1, 2.5]");
    }
}
