use crate::analysis::join::JoinedTrade;
use crate::types::AggregatedBucket;

/// Value at probability `p` of a sorted, non-empty slice, interpolating
/// linearly between neighbouring order statistics.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Equal-count edges at `0, 1/n, ..., 1`, with repeated edges collapsed so the
/// result is strictly increasing. Empty input gives no edges.
pub fn quantile_edges(values: &[f64], n_buckets: usize) -> Vec<f64> {
    if values.is_empty() || n_buckets == 0 {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut edges: Vec<f64> = Vec::with_capacity(n_buckets + 1);
    for i in 0..=n_buckets {
        let q = quantile_sorted(&sorted, i as f64 / n_buckets as f64);
        let q = edges.last().map_or(q, |prev| q.max(*prev));
        if edges.last() != Some(&q) {
            edges.push(q);
        }
    }
    edges
}

/// Interval index for `v`: `(e[i], e[i+1]]`, with the first interval also
/// holding `e[0]`.
fn interval_of(edges: &[f64], v: f64) -> usize {
    let intervals = edges.len().saturating_sub(1).max(1);
    let first_ge = edges.partition_point(|e| *e < v);
    first_ge.saturating_sub(1).min(intervals - 1)
}

/// Group trades into trade-size quantile buckets and average `price_diff`
/// in each. Buckets come back ordered by lower bound; fewer than `n_buckets`
/// when sizes repeat.
pub fn bucketize(joined: &[JoinedTrade], n_buckets: usize) -> Vec<AggregatedBucket> {
    let sizes: Vec<f64> = joined.iter().map(|j| j.trade.trade_size_usd).collect();
    let edges = quantile_edges(&sizes, n_buckets);
    if edges.is_empty() {
        return Vec::new();
    }

    let bounds: Vec<(f64, f64)> = if edges.len() == 1 {
        vec![(edges[0], edges[0])]
    } else {
        edges.windows(2).map(|w| (w[0], w[1])).collect()
    };

    // (trade_count, diff_sum, diff_count) per interval
    let mut acc = vec![(0usize, 0.0f64, 0usize); bounds.len()];
    for j in joined {
        let slot = &mut acc[interval_of(&edges, j.trade.trade_size_usd)];
        slot.0 += 1;
        if let Some(d) = j.price_diff {
            slot.1 += d;
            slot.2 += 1;
        }
    }

    bounds
        .into_iter()
        .zip(acc)
        .enumerate()
        .map(|(i, ((lower, upper), (trade_count, sum, n)))| AggregatedBucket {
            lower,
            upper,
            closed_left: i == 0,
            trade_count,
            avg_cost_diff: (n > 0).then(|| sum / n as f64),
        })
        .collect()
}
