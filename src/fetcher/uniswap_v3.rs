use serde::{Deserialize, Serialize};

use crate::fetcher::{PoolTokens, SubgraphEntity};
use crate::table::TableRow;
use crate::types::{de_decimal_text, de_i64_lenient, TokenPair, Venue};

const SWAPS_QUERY: &str = r#"
query($startTime: Int!, $endTime: Int!, $lastID: String!, $first: Int!) {
  swaps(
    where: { timestamp_gte: $startTime, timestamp_lt: $endTime, id_gt: $lastID }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    timestamp
    amount0
    amount1
    pool {
      token0 { symbol }
      token1 { symbol }
    }
  }
}
"#;

/// A Uniswap v3 `Swap` entity. Amounts are signed deltas of the pool's
/// balances: positive entered the pool, negative left it.
#[derive(Debug, Clone, Deserialize)]
pub struct UniswapV3Swap {
    pub id: String,
    #[serde(deserialize_with = "de_i64_lenient")]
    pub timestamp: i64,
    #[serde(deserialize_with = "de_decimal_text")]
    pub amount0: String,
    #[serde(deserialize_with = "de_decimal_text")]
    pub amount1: String,
    pub pool: PoolTokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniswapV3Row {
    pub id: String,
    pub timestamp: i64,
    pub token0: String,
    pub token1: String,
    pub amount0: String,
    pub amount1: String,
}

impl TableRow for UniswapV3Row {
    const HEADER: &'static [&'static str] =
        &["id", "timestamp", "token0", "token1", "amount0", "amount1"];
}

impl SubgraphEntity for UniswapV3Swap {
    type Row = UniswapV3Row;

    const VENUE: Venue = Venue::UniswapV3;
    const COLLECTION: &'static str = "swaps";
    const QUERY: &'static str = SWAPS_QUERY;

    fn id(&self) -> &str {
        &self.id
    }

    fn matches_pair(&self, pair: &TokenPair) -> bool {
        self.pool.within(pair)
    }

    fn into_row(self) -> UniswapV3Row {
        UniswapV3Row {
            id: self.id,
            timestamp: self.timestamp,
            token0: self.pool.token0.symbol,
            token1: self.pool.token1.symbol,
            amount0: self.amount0,
            amount1: self.amount1,
        }
    }
}
