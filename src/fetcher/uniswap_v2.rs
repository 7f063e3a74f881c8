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
    amount0In
    amount0Out
    amount1In
    amount1Out
    pair {
      token0 { symbol }
      token1 { symbol }
    }
  }
}
"#;

/// A Uniswap v2 `Swap` entity. In/out amounts are unsigned and seen from the
/// pair contract: `amountXIn` entered the pair, `amountXOut` left it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniswapV2Swap {
    pub id: String,
    #[serde(deserialize_with = "de_i64_lenient")]
    pub timestamp: i64,
    #[serde(deserialize_with = "de_decimal_text")]
    pub amount0_in: String,
    #[serde(deserialize_with = "de_decimal_text")]
    pub amount0_out: String,
    #[serde(deserialize_with = "de_decimal_text")]
    pub amount1_in: String,
    #[serde(deserialize_with = "de_decimal_text")]
    pub amount1_out: String,
    pub pair: PoolTokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniswapV2Row {
    pub id: String,
    pub timestamp: i64,
    pub token0: String,
    pub token1: String,
    pub amount0_in: String,
    pub amount0_out: String,
    pub amount1_in: String,
    pub amount1_out: String,
}

impl TableRow for UniswapV2Row {
    const HEADER: &'static [&'static str] = &[
        "id",
        "timestamp",
        "token0",
        "token1",
        "amount0In",
        "amount0Out",
        "amount1In",
        "amount1Out",
    ];
}

impl SubgraphEntity for UniswapV2Swap {
    type Row = UniswapV2Row;

    const VENUE: Venue = Venue::UniswapV2;
    const COLLECTION: &'static str = "swaps";
    const QUERY: &'static str = SWAPS_QUERY;

    fn id(&self) -> &str {
        &self.id
    }

    fn matches_pair(&self, pair: &TokenPair) -> bool {
        self.pair.within(pair)
    }

    fn into_row(self) -> UniswapV2Row {
        UniswapV2Row {
            id: self.id,
            timestamp: self.timestamp,
            token0: self.pair.token0.symbol,
            token1: self.pair.token1.symbol,
            amount0_in: self.amount0_in,
            amount0_out: self.amount0_out,
            amount1_in: self.amount1_in,
            amount1_out: self.amount1_out,
        }
    }
}
