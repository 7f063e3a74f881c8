use crate::types::{MidPricePoint, NormalizedTrade};

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTrade {
    pub trade: NormalizedTrade,
    pub mid_price: Option<f64>,
    /// `realized_price - mid_price`, `None` when no reference value matched.
    pub price_diff: Option<f64>,
}

/// Index of the point closest in time to `t`. Equidistant candidates resolve
/// to the earlier point. `mids` must be sorted by `datetime`.
fn nearest_index(mids: &[MidPricePoint], t: chrono::NaiveDateTime) -> Option<usize> {
    if mids.is_empty() {
        return None;
    }
    let later = mids.partition_point(|m| m.datetime < t);
    if later == 0 {
        return Some(0);
    }
    if later == mids.len() {
        return Some(later - 1);
    }
    let earlier = later - 1;
    let to_earlier = t - mids[earlier].datetime;
    let to_later = mids[later].datetime - t;
    Some(if to_later < to_earlier { later } else { earlier })
}

/// Sort trades by time and attach the nearest reference mid-price to each.
pub fn join_nearest(mut trades: Vec<NormalizedTrade>, mids: &[MidPricePoint]) -> Vec<JoinedTrade> {
    trades.sort_by_key(|t| t.timestamp_dt);
    trades
        .into_iter()
        .map(|trade| {
            let mid_price = nearest_index(mids, trade.timestamp_dt).and_then(|i| mids[i].mid_price);
            let price_diff = mid_price.map(|mid| trade.realized_price - mid);
            JoinedTrade {
                trade,
                mid_price,
                price_diff,
            }
        })
        .collect()
}
