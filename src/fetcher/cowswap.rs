use serde::{Deserialize, Serialize};

use crate::fetcher::SubgraphEntity;
use crate::table::TableRow;
use crate::types::{de_decimal_text, de_i64_lenient, de_opt_i64_lenient, TokenPair, Venue};

const ORDERS_QUERY: &str = r#"
query($startTime: Int!, $endTime: Int!, $lastID: String!, $first: Int!) {
  orders(
    where: { creationTimestamp_gte: $startTime, creationTimestamp_lt: $endTime, id_gt: $lastID }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    creationTimestamp
    sellToken { symbol decimals }
    buyToken { symbol decimals }
    sellAmount
    buyAmount
  }
}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderToken {
    pub symbol: String,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub decimals: Option<i64>,
}

/// A CoW Protocol order. Amounts are raw token units; `decimals` scales them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CowOrder {
    pub id: String,
    #[serde(deserialize_with = "de_i64_lenient")]
    pub creation_timestamp: i64,
    pub sell_token: OrderToken,
    pub buy_token: OrderToken,
    #[serde(deserialize_with = "de_decimal_text")]
    pub sell_amount: String,
    #[serde(deserialize_with = "de_decimal_text")]
    pub buy_amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CowOrderRow {
    pub id: String,
    pub creation_timestamp: i64,
    pub sell_token: String,
    pub buy_token: String,
    pub sell_decimals: Option<i64>,
    pub buy_decimals: Option<i64>,
    pub sell_amount: String,
    pub buy_amount: String,
}

impl TableRow for CowOrderRow {
    const HEADER: &'static [&'static str] = &[
        "id",
        "creationTimestamp",
        "sellToken",
        "buyToken",
        "sellDecimals",
        "buyDecimals",
        "sellAmount",
        "buyAmount",
    ];
}

impl SubgraphEntity for CowOrder {
    type Row = CowOrderRow;

    const VENUE: Venue = Venue::Cowswap;
    const COLLECTION: &'static str = "orders";
    const QUERY: &'static str = ORDERS_QUERY;

    fn id(&self) -> &str {
        &self.id
    }

    /// Exactly the two pair tokens, in either direction.
    fn matches_pair(&self, pair: &TokenPair) -> bool {
        pair.is_exactly(&self.sell_token.symbol, &self.buy_token.symbol)
    }

    fn into_row(self) -> CowOrderRow {
        CowOrderRow {
            id: self.id,
            creation_timestamp: self.creation_timestamp,
            sell_token: self.sell_token.symbol,
            buy_token: self.buy_token.symbol,
            sell_decimals: self.sell_token.decimals,
            buy_decimals: self.buy_token.decimals,
            sell_amount: self.sell_amount,
            buy_amount: self.buy_amount,
        }
    }
}
