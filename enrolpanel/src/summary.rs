//! Grouped summary tables. Counts are summed first and the ratio metrics
//! re-derived from those sums, so a summary row is never a mean of per-row
//! ratios.

use anyhow::Result;
use polars::prelude::*;

use crate::metrics::{attention_gap_exprs, ratio_metric_exprs, Granularity};
use crate::COL;

const SUMMED_COLUMNS: [&str; 11] = [
    COL::AGE_0_5,
    COL::AGE_5_17,
    COL::AGE_18_GREATER,
    COL::BIO_AGE_5_17,
    COL::BIO_AGE_17_PLUS,
    COL::DEMO_AGE_5_17,
    COL::DEMO_AGE_17_PLUS,
    COL::TOTAL_ENROLMENTS,
    COL::TOTAL_BIO_UPDATES,
    COL::TOTAL_DEMO_UPDATES,
    COL::TOTAL_UPDATES,
];

/// Collapse the reconciled panel to one row per group at `granularity`,
/// with all count columns summed and every ratio metric re-derived.
pub fn summary_at(panel: &DataFrame, granularity: Granularity) -> Result<DataFrame> {
    let sums: Vec<Expr> = SUMMED_COLUMNS.iter().map(|c| col(c).sum()).collect();

    let keys = granularity.key_columns();
    let grouped = if keys.is_empty() {
        panel.clone().lazy().select(sums)
    } else {
        let key_exprs: Vec<Expr> = keys.iter().map(|c| col(*c)).collect();
        panel.clone().lazy().group_by(key_exprs).agg(sums)
    };

    let mut columns: Vec<Expr> = keys.iter().map(|c| col(*c)).collect();
    columns.extend(SUMMED_COLUMNS.iter().map(|c| col(*c)));
    columns.extend([
        col(COL::UPDATE_INTENSITY),
        col(COL::UPDATES_PER_1000),
        col(COL::BIO_SHARE),
        col(COL::DEMO_SHARE),
        col(COL::MINOR_SHARE_ENROLMENTS),
        col(COL::MINOR_SHARE_UPDATES),
        col(COL::CHILD_ATTENTION_GAP),
    ]);

    let mut lf = grouped
        .with_columns(ratio_metric_exprs())
        .with_columns(attention_gap_exprs())
        .with_columns([
            (col(COL::UPDATE_INTENSITY) * lit(1000.0f64)).alias(COL::UPDATES_PER_1000),
            (col(COL::MINOR_SHARE_UPDATES) - col(COL::MINOR_SHARE_ENROLMENTS))
                .alias(COL::CHILD_ATTENTION_GAP),
        ])
        .select(columns);
    if !keys.is_empty() {
        lf = lf.sort(keys.to_vec(), SortMultipleOptions::default());
    }
    Ok(lf.collect()?)
}

pub fn state_summary(panel: &DataFrame) -> Result<DataFrame> {
    summary_at(panel, Granularity::State)
}

pub fn district_summary(panel: &DataFrame) -> Result<DataFrame> {
    summary_at(panel, Granularity::District)
}
