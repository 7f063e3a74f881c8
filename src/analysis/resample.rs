use chrono::NaiveDateTime;

use crate::types::{naive_from_secs, MidPricePoint};

/// One reference-exchange observation. `None` marks a tick without a price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub datetime: NaiveDateTime,
    pub mid_price: Option<f64>,
}

fn bucket_id(datetime: NaiveDateTime, interval_ms: i64) -> i64 {
    datetime.and_utc().timestamp_millis().div_euclid(interval_ms)
}

/// Average ticks into `interval_secs`-wide buckets aligned to the epoch,
/// spanning the first to the last tick's bucket, and forward-fill empty ones.
///
/// Buckets before the first priced tick stay `None`; nothing is filled backward.
pub fn resample_mid_prices(ticks: &[PriceTick], interval_secs: i64) -> Vec<MidPricePoint> {
    let interval_secs = interval_secs.max(1);
    let interval_ms = interval_secs * 1000;

    let mut ids: Vec<(i64, Option<f64>)> = ticks
        .iter()
        .map(|t| (bucket_id(t.datetime, interval_ms), t.mid_price.filter(|p| !p.is_nan())))
        .collect();
    ids.sort_by_key(|(id, _)| *id);

    let (Some(first), Some(last)) = (ids.first().map(|x| x.0), ids.last().map(|x| x.0)) else {
        return Vec::new();
    };

    let len = (last - first + 1) as usize;
    let mut sums = vec![(0.0f64, 0usize); len];
    for (id, price) in ids {
        if let Some(p) = price {
            let slot = &mut sums[(id - first) as usize];
            slot.0 += p;
            slot.1 += 1;
        }
    }

    let mut carry: Option<f64> = None;
    let mut out = Vec::with_capacity(len);
    for (offset, (sum, count)) in sums.into_iter().enumerate() {
        if count > 0 {
            carry = Some(sum / count as f64);
        }
        let Some(datetime) = naive_from_secs((first + offset as i64) * interval_secs) else {
            continue;
        };
        out.push(MidPricePoint {
            datetime,
            mid_price: carry,
        });
    }
    out
}
