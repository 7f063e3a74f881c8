//! Venue rows to [`NormalizedTrade`]s.
//!
//! Each venue decides which side of the trade the base token was on and
//! expresses that as a [`SwapLeg`]; price and size then follow from the leg
//! alone, so every venue quotes `quote per base`.

use tracing::debug;

use crate::error::{AppError, Result};
use crate::fetcher::cowswap::CowOrderRow;
use crate::fetcher::uniswap_v2::UniswapV2Row;
use crate::fetcher::uniswap_v3::UniswapV3Row;
use crate::types::{naive_from_secs, NormalizedTrade, TokenPair};

/// Direction of a trade seen from the venue, with the two relevant magnitudes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwapLeg {
    /// Base left the venue and quote came in (trader bought base).
    BaseOutQuoteIn { base_out: f64, quote_in: f64 },
    /// Base came in and quote left the venue (trader sold base).
    BaseInQuoteOut { base_in: f64, quote_out: f64 },
}

impl SwapLeg {
    fn base_and_quote(&self) -> (f64, f64) {
        match *self {
            SwapLeg::BaseOutQuoteIn { base_out, quote_in } => (base_out, quote_in),
            SwapLeg::BaseInQuoteOut { base_in, quote_out } => (base_in, quote_out),
        }
    }

    /// Quote per base, or `None` when either leg is zero or the ratio is not
    /// a finite positive number.
    pub fn realized_price(&self) -> Option<f64> {
        let (base, quote) = self.base_and_quote();
        if !(base > 0.0 && quote > 0.0) {
            return None;
        }
        let price = quote / base;
        (price.is_finite() && price > 0.0).then_some(price)
    }

    /// The quote-currency leg.
    pub fn trade_size(&self) -> f64 {
        self.base_and_quote().1
    }
}

/// A stored venue row that can be reduced to a [`SwapLeg`].
pub trait VenueTrade {
    fn trade_id(&self) -> &str;
    /// Unix seconds.
    fn unix_time(&self) -> i64;
    fn swap_leg(&self, pair: &TokenPair) -> Result<SwapLeg>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub trades: Vec<NormalizedTrade>,
    /// Rows dropped because a leg was zero or the price was not finite.
    pub skipped_degenerate: usize,
}

/// Normalize every row. Unparseable amounts and unknown tokens are errors;
/// degenerate legs are skipped and counted.
pub fn normalize<T: VenueTrade>(rows: &[T], pair: &TokenPair) -> Result<Normalized> {
    let mut out = Normalized {
        trades: Vec::with_capacity(rows.len()),
        skipped_degenerate: 0,
    };
    for row in rows {
        let leg = row.swap_leg(pair)?;
        let Some(realized_price) = leg.realized_price() else {
            debug!(id = row.trade_id(), ?leg, "Skipping degenerate trade");
            out.skipped_degenerate += 1;
            continue;
        };
        let timestamp_dt = naive_from_secs(row.unix_time()).ok_or_else(|| {
            AppError::DataShape(format!(
                "trade {}: timestamp {} is out of range",
                row.trade_id(),
                row.unix_time()
            ))
        })?;
        out.trades.push(NormalizedTrade {
            timestamp_dt,
            realized_price,
            trade_size_usd: leg.trade_size(),
        });
    }
    Ok(out)
}

fn parse_amount(id: &str, field: &str, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        AppError::DataShape(format!("trade {id}: {field} {text:?} is not a number"))
    })
}

/// Which of token0/token1 is the base token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseSide {
    Token0,
    Token1,
}

fn pool_base_side(id: &str, token0: &str, token1: &str, pair: &TokenPair) -> Result<BaseSide> {
    if token0 == pair.base && token1 == pair.quote {
        Ok(BaseSide::Token0)
    } else if token1 == pair.base && token0 == pair.quote {
        Ok(BaseSide::Token1)
    } else {
        Err(AppError::DataShape(format!(
            "trade {id}: pool {token0}/{token1} is not a {pair} pool"
        )))
    }
}

impl VenueTrade for UniswapV2Row {
    fn trade_id(&self) -> &str {
        &self.id
    }

    fn unix_time(&self) -> i64 {
        self.timestamp
    }

    /// Base leaving the pair means the trader bought base with quote;
    /// otherwise the trader sold base.
    fn swap_leg(&self, pair: &TokenPair) -> Result<SwapLeg> {
        let a0_in = parse_amount(&self.id, "amount0In", &self.amount0_in)?;
        let a0_out = parse_amount(&self.id, "amount0Out", &self.amount0_out)?;
        let a1_in = parse_amount(&self.id, "amount1In", &self.amount1_in)?;
        let a1_out = parse_amount(&self.id, "amount1Out", &self.amount1_out)?;

        let (base_in, base_out, quote_in, quote_out) =
            match pool_base_side(&self.id, &self.token0, &self.token1, pair)? {
                BaseSide::Token0 => (a0_in, a0_out, a1_in, a1_out),
                BaseSide::Token1 => (a1_in, a1_out, a0_in, a0_out),
            };

        Ok(if base_out > 0.0 {
            SwapLeg::BaseOutQuoteIn { base_out, quote_in }
        } else {
            SwapLeg::BaseInQuoteOut { base_in, quote_out }
        })
    }
}

impl VenueTrade for UniswapV3Row {
    fn trade_id(&self) -> &str {
        &self.id
    }

    fn unix_time(&self) -> i64 {
        self.timestamp
    }

    /// A negative base delta means base left the pool.
    fn swap_leg(&self, pair: &TokenPair) -> Result<SwapLeg> {
        let a0 = parse_amount(&self.id, "amount0", &self.amount0)?;
        let a1 = parse_amount(&self.id, "amount1", &self.amount1)?;

        let (base, quote) = match pool_base_side(&self.id, &self.token0, &self.token1, pair)? {
            BaseSide::Token0 => (a0, a1),
            BaseSide::Token1 => (a1, a0),
        };

        Ok(if base < 0.0 {
            SwapLeg::BaseOutQuoteIn { base_out: base.abs(), quote_in: quote.abs() }
        } else {
            SwapLeg::BaseInQuoteOut { base_in: base.abs(), quote_out: quote.abs() }
        })
    }
}

/// Raw token units to whole tokens. Unknown decimals leave the amount as is.
fn scale(id: &str, amount: f64, decimals: Option<i64>) -> Result<f64> {
    match decimals {
        None => Ok(amount),
        Some(d) if (0..=77).contains(&d) => Ok(amount / 10f64.powi(d as i32)),
        Some(d) => Err(AppError::DataShape(format!(
            "trade {id}: token decimals {d} out of range"
        ))),
    }
}

impl VenueTrade for CowOrderRow {
    fn trade_id(&self) -> &str {
        &self.id
    }

    fn unix_time(&self) -> i64 {
        self.creation_timestamp
    }

    /// Selling base means base went in; selling quote means base came out.
    fn swap_leg(&self, pair: &TokenPair) -> Result<SwapLeg> {
        let sell = parse_amount(&self.id, "sellAmount", &self.sell_amount)?;
        let buy = parse_amount(&self.id, "buyAmount", &self.buy_amount)?;
        let sell = scale(&self.id, sell, self.sell_decimals)?;
        let buy = scale(&self.id, buy, self.buy_decimals)?;

        if self.sell_token == pair.base && self.buy_token == pair.quote {
            Ok(SwapLeg::BaseInQuoteOut { base_in: sell, quote_out: buy })
        } else if self.sell_token == pair.quote && self.buy_token == pair.base {
            Ok(SwapLeg::BaseOutQuoteIn { base_out: buy, quote_in: sell })
        } else {
            Err(AppError::DataShape(format!(
                "trade {}: order {} -> {} is not a {pair} order",
                self.id, self.sell_token, self.buy_token
            )))
        }
    }
}
