//! Metric derivation. The four ratios are computed the same way for every
//! source from that source's own base measures; values a platform reports
//! for them are never used.
//!
//! A ratio is absent when an operand is absent or the denominator is zero.
//! cvr and roas are also absent when there were no conversions or no revenue
//! to measure; ctr and cpa can legitimately be 0.

use tracing::{debug, instrument};

use crate::observability::metrics;
use crate::types::{DerivedMetrics, IntermediateRow, IntermediateTable};

/// `numerator / denominator`, or absent when either side is absent or the
/// denominator is zero. Never produces inf or NaN.
pub fn safe_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 || !n.is_finite() || !d.is_finite() {
        return None;
    }
    let ratio = n / d;
    ratio.is_finite().then_some(ratio)
}

/// A zero outcome leaves its rate (cvr, roas) undefined
fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

pub fn derive_row(row: &IntermediateRow) -> DerivedMetrics {
    let conversions = row.conversions.map(|c| c as f64);
    DerivedMetrics {
        ctr: safe_ratio(Some(row.clicks as f64), Some(row.impressions as f64)),
        cvr: safe_ratio(nonzero(conversions), Some(row.clicks as f64)),
        cpa: safe_ratio(Some(row.spend), conversions),
        roas: safe_ratio(nonzero(row.revenue), Some(row.spend)),
    }
}

/// Attach derived ratios to every row of a parsed table
#[instrument(skip(table), fields(platform = %table.platform, rows = table.rows.len()))]
pub fn derive_metrics(table: &mut IntermediateTable) {
    let platform = table.platform.slug();
    let mut absent = [0usize; 4];

    for row in table.rows.iter_mut() {
        let derived = derive_row(row);
        for (slot, value) in absent
            .iter_mut()
            .zip([derived.ctr, derived.cvr, derived.cpa, derived.roas])
        {
            if value.is_none() {
                *slot += 1;
            }
        }
        row.derived = Some(derived);
    }

    for (field, count) in ["ctr", "cvr", "cpa", "roas"].into_iter().zip(absent) {
        if count > 0 {
            metrics::derive::absent_ratios(platform, field, count);
            debug!("{} {} rows with absent {}", count, table.platform, field);
        }
    }
}
