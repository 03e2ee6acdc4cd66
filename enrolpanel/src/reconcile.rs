//! Outer-merge the three aggregated datasets into the unified per-district,
//! per-date panel, zero-fill the intersections no source reported, and drop
//! join artifacts.

use anyhow::Result;
use log::{debug, info};
use polars::prelude::*;

use crate::COL;

/// Combine row predicates with OR. Returns None for an empty input.
fn combine_exprs_with_or(exprs: Vec<Expr>) -> Option<Expr> {
    let mut query: Option<Expr> = None;
    for expr in exprs {
        query = if let Some(partial) = query {
            Some(partial.or(expr))
        } else {
            Some(expr)
        };
    }
    query
}

fn group_key_exprs() -> [Expr; 3] {
    [col(COL::DATE), col(COL::STATE), col(COL::DISTRICT)]
}

fn full_join(left: LazyFrame, right: LazyFrame) -> LazyFrame {
    left.join(
        right,
        group_key_exprs(),
        group_key_exprs(),
        JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
    )
}

/// Full outer join of the aggregated enrolment, biometric and demographic
/// tables on `(date, state, district)`. Unmatched cells become zero, never
/// null. Totals are derived per row, and rows where every age-band source
/// column is zero are discarded: such a row is a join artifact, not an
/// observation, and must not contribute to downstream sums.
///
/// Inputs may be empty (zero rows with the dataset's schema); the missing
/// source's columns then come out as zero for every surviving key.
pub fn reconcile(enrol: &DataFrame, bio: &DataFrame, demo: &DataFrame) -> Result<DataFrame> {
    let joined = full_join(
        full_join(enrol.clone().lazy(), bio.clone().lazy()),
        demo.clone().lazy(),
    )
    .collect()?;

    // A dataset loaded in degraded mode may be missing entirely; its age-band
    // columns are materialized as zero so the panel schema is always fixed.
    let present: Vec<String> = joined
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut bands: Vec<Expr> = Vec::new();
    for band in COL::AGE_BAND_COLUMNS {
        if present.iter().any(|c| c == band) {
            bands.push(col(band).fill_null(lit(0i64)));
        } else {
            bands.push(lit(0i64).alias(band));
        }
    }

    let has_activity = combine_exprs_with_or(
        COL::AGE_BAND_COLUMNS
            .iter()
            .map(|band| col(band).gt(lit(0)))
            .collect(),
    )
    .expect("age band column list is non-empty");

    let panel = joined
        .lazy()
        .with_columns(bands)
        .with_columns([
            (col(COL::AGE_0_5) + col(COL::AGE_5_17) + col(COL::AGE_18_GREATER))
                .alias(COL::TOTAL_ENROLMENTS),
            (col(COL::BIO_AGE_5_17) + col(COL::BIO_AGE_17_PLUS)).alias(COL::TOTAL_BIO_UPDATES),
            (col(COL::DEMO_AGE_5_17) + col(COL::DEMO_AGE_17_PLUS)).alias(COL::TOTAL_DEMO_UPDATES),
        ])
        .with_column(
            (col(COL::TOTAL_BIO_UPDATES) + col(COL::TOTAL_DEMO_UPDATES))
                .alias(COL::TOTAL_UPDATES),
        )
        .filter(has_activity)
        .select(
            [
                COL::DATE,
                COL::STATE,
                COL::DISTRICT,
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
            ]
            .map(col),
        )
        .sort(COL::GROUP_KEYS, SortMultipleOptions::default())
        .collect()?;

    info!(
        "reconciled panel: {} rows from {}/{}/{} aggregated rows",
        panel.height(),
        enrol.height(),
        bio.height(),
        demo.height()
    );
    debug!("panel schema: {:?}", panel.schema());
    Ok(panel)
}
