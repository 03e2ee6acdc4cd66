//! Ratio metrics over the reconciled panel, and the comparative
//! child-attention-gap statistic.

use anyhow::Result;
use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::COL;

/// The aggregation context a comparative statistic is computed over. The gap
/// is not meaningful per panel row, so callers must pick one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, Default,
)]
#[strum(ascii_case_insensitive)]
pub enum Granularity {
    National,
    #[default]
    State,
    District,
}

impl Granularity {
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Granularity::National => &[],
            Granularity::State => &[COL::STATE],
            Granularity::District => &[COL::STATE, COL::DISTRICT],
        }
    }
}

/// Ratio with a zero-denominator guard: yields 0 rather than an error or a
/// NaN that would poison downstream aggregates.
pub(crate) fn guarded_ratio(numerator: Expr, denominator: Expr) -> Expr {
    when(denominator.clone().gt(lit(0)))
        .then(numerator.cast(DataType::Float64) / denominator.cast(DataType::Float64))
        .otherwise(lit(0.0f64))
}

/// The expressions shared between per-row metric derivation and the
/// per-grouping summary tables. All operate on already-summed totals
/// ("intensity of sums", not "average of intensities").
pub(crate) fn ratio_metric_exprs() -> [Expr; 3] {
    [
        guarded_ratio(col(COL::TOTAL_UPDATES), col(COL::TOTAL_ENROLMENTS))
            .alias(COL::UPDATE_INTENSITY),
        guarded_ratio(col(COL::TOTAL_BIO_UPDATES), col(COL::TOTAL_UPDATES)).alias(COL::BIO_SHARE),
        guarded_ratio(col(COL::TOTAL_DEMO_UPDATES), col(COL::TOTAL_UPDATES))
            .alias(COL::DEMO_SHARE),
    ]
}

/// Minor-share and gap expressions over (possibly grouped) age-band sums.
pub(crate) fn attention_gap_exprs() -> [Expr; 2] {
    [
        guarded_ratio(
            col(COL::AGE_0_5) + col(COL::AGE_5_17),
            col(COL::TOTAL_ENROLMENTS),
        )
        .alias(COL::MINOR_SHARE_ENROLMENTS),
        guarded_ratio(
            col(COL::DEMO_AGE_5_17) + col(COL::BIO_AGE_5_17),
            col(COL::TOTAL_UPDATES),
        )
        .alias(COL::MINOR_SHARE_UPDATES),
    ]
}

/// Append `update_intensity`, `updates_per_1000`, `bio_share` and
/// `demo_share` to the reconciled panel. Every ratio is zero-guarded, so for
/// any row `total_updates == 0` implies both shares are 0, and
/// `total_enrolments == 0` implies zero intensity.
pub fn derive_metrics(panel: &DataFrame) -> Result<DataFrame> {
    let mut columns: Vec<Expr> = panel
        .get_column_names()
        .iter()
        .map(|name| col(*name))
        .collect();
    columns.extend([
        col(COL::UPDATE_INTENSITY),
        col(COL::UPDATES_PER_1000),
        col(COL::BIO_SHARE),
        col(COL::DEMO_SHARE),
    ]);

    let out = panel
        .clone()
        .lazy()
        .with_columns(ratio_metric_exprs())
        .with_column((col(COL::UPDATE_INTENSITY) * lit(1000.0f64)).alias(COL::UPDATES_PER_1000))
        .select(columns)
        .collect()?;
    debug!("derived metrics for {} rows", out.height());
    Ok(out)
}

/// Difference between a population's minor-age share in the update channel
/// and in the enrolment channel, computed over sums at the given
/// granularity. Negative means minors are under-represented in updates
/// relative to their presence in new enrolments.
pub fn child_attention_gap(panel: &DataFrame, granularity: Granularity) -> Result<DataFrame> {
    let sums: Vec<Expr> = [
        COL::AGE_0_5,
        COL::AGE_5_17,
        COL::BIO_AGE_5_17,
        COL::DEMO_AGE_5_17,
        COL::TOTAL_ENROLMENTS,
        COL::TOTAL_UPDATES,
    ]
    .iter()
    .map(|c| col(c).sum())
    .collect();

    let keys = granularity.key_columns();
    let grouped = if keys.is_empty() {
        panel.clone().lazy().select(sums)
    } else {
        let key_exprs: Vec<Expr> = keys.iter().map(|c| col(*c)).collect();
        panel.clone().lazy().group_by(key_exprs).agg(sums)
    };

    let mut columns: Vec<Expr> = keys.iter().map(|c| col(*c)).collect();
    columns.extend([
        col(COL::MINOR_SHARE_ENROLMENTS),
        col(COL::MINOR_SHARE_UPDATES),
        col(COL::CHILD_ATTENTION_GAP),
    ]);

    let mut lf = grouped
        .with_columns(attention_gap_exprs())
        .with_column(
            (col(COL::MINOR_SHARE_UPDATES) - col(COL::MINOR_SHARE_ENROLMENTS))
                .alias(COL::CHILD_ATTENTION_GAP),
        )
        .select(columns);
    if !keys.is_empty() {
        lf = lf.sort(keys.to_vec(), SortMultipleOptions::default());
    }
    Ok(lf.collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;

    fn f64_at(df: &DataFrame, column: &str, idx: usize) -> f64 {
        df.column(column).unwrap().f64().unwrap().get(idx).unwrap()
    }

    fn panel() -> DataFrame {
        // Aggregated inputs, already keyed on (date, state, district).
        let date = [19723i32]; // arbitrary day, as days since epoch
        let enrol = df!(
            COL::DATE => &date,
            COL::STATE => &["Delhi"],
            COL::DISTRICT => &["North"],
            COL::AGE_0_5 => &[10i64],
            COL::AGE_5_17 => &[5i64],
            COL::AGE_18_GREATER => &[1i64],
        )
        .unwrap();
        let bio = df!(
            COL::DATE => &date,
            COL::STATE => &["Delhi"],
            COL::DISTRICT => &["North"],
            COL::BIO_AGE_5_17 => &[3i64],
            COL::BIO_AGE_17_PLUS => &[2i64],
        )
        .unwrap();
        let demo = df!(
            COL::DATE => Vec::<i32>::new(),
            COL::STATE => Vec::<String>::new(),
            COL::DISTRICT => Vec::<String>::new(),
            COL::DEMO_AGE_5_17 => Vec::<i64>::new(),
            COL::DEMO_AGE_17_PLUS => Vec::<i64>::new(),
        )
        .unwrap();
        reconcile(&enrol, &bio, &demo).unwrap()
    }

    #[test]
    fn derives_the_documented_ratios() {
        let metrics = derive_metrics(&panel()).unwrap();
        assert_eq!(metrics.height(), 1);
        assert!((f64_at(&metrics, COL::UPDATE_INTENSITY, 0) - 0.3125).abs() < 1e-9);
        assert!((f64_at(&metrics, COL::UPDATES_PER_1000, 0) - 312.5).abs() < 1e-9);
        assert!((f64_at(&metrics, COL::BIO_SHARE, 0) - 1.0).abs() < 1e-9);
        assert!(f64_at(&metrics, COL::DEMO_SHARE, 0).abs() < 1e-9);
    }

    #[test]
    fn shares_are_complementary_when_updates_exist() {
        let enrol = df!(
            COL::DATE => &[19723i32, 19724],
            COL::STATE => &["Delhi", "Delhi"],
            COL::DISTRICT => &["North", "North"],
            COL::AGE_0_5 => &[10i64, 0],
            COL::AGE_5_17 => &[5i64, 0],
            COL::AGE_18_GREATER => &[1i64, 2],
        )
        .unwrap();
        let bio = df!(
            COL::DATE => &[19723i32],
            COL::STATE => &["Delhi"],
            COL::DISTRICT => &["North"],
            COL::BIO_AGE_5_17 => &[3i64],
            COL::BIO_AGE_17_PLUS => &[2i64],
        )
        .unwrap();
        let demo = df!(
            COL::DATE => &[19723i32],
            COL::STATE => &["Delhi"],
            COL::DISTRICT => &["North"],
            COL::DEMO_AGE_5_17 => &[4i64],
            COL::DEMO_AGE_17_PLUS => &[6i64],
        )
        .unwrap();
        let metrics = derive_metrics(&reconcile(&enrol, &bio, &demo).unwrap()).unwrap();

        for idx in 0..metrics.height() {
            let updates = metrics
                .column(COL::TOTAL_UPDATES)
                .unwrap()
                .i64()
                .unwrap()
                .get(idx)
                .unwrap();
            let bio_share = f64_at(&metrics, COL::BIO_SHARE, idx);
            let demo_share = f64_at(&metrics, COL::DEMO_SHARE, idx);
            if updates > 0 {
                assert!((bio_share + demo_share - 1.0).abs() < 1e-9);
            } else {
                assert_eq!(bio_share, 0.0);
                assert_eq!(demo_share, 0.0);
            }
        }
    }

    #[test]
    fn zero_denominators_never_produce_nan() {
        // Update-only key: total_enrolments == 0 must give zero intensity.
        let enrol = df!(
            COL::DATE => Vec::<i32>::new(),
            COL::STATE => Vec::<String>::new(),
            COL::DISTRICT => Vec::<String>::new(),
            COL::AGE_0_5 => Vec::<i64>::new(),
            COL::AGE_5_17 => Vec::<i64>::new(),
            COL::AGE_18_GREATER => Vec::<i64>::new(),
        )
        .unwrap();
        let bio = df!(
            COL::DATE => &[19723i32],
            COL::STATE => &["Delhi"],
            COL::DISTRICT => &["North"],
            COL::BIO_AGE_5_17 => &[3i64],
            COL::BIO_AGE_17_PLUS => &[2i64],
        )
        .unwrap();
        let demo = df!(
            COL::DATE => Vec::<i32>::new(),
            COL::STATE => Vec::<String>::new(),
            COL::DISTRICT => Vec::<String>::new(),
            COL::DEMO_AGE_5_17 => Vec::<i64>::new(),
            COL::DEMO_AGE_17_PLUS => Vec::<i64>::new(),
        )
        .unwrap();
        let metrics = derive_metrics(&reconcile(&enrol, &bio, &demo).unwrap()).unwrap();
        let intensity = f64_at(&metrics, COL::UPDATE_INTENSITY, 0);
        assert_eq!(intensity, 0.0);
        assert!(!intensity.is_nan());
    }

    #[test]
    fn attention_gap_matches_hand_computation() {
        // minor share in updates: (3 + 0) / 5 = 0.6
        // minor share in enrolments: (10 + 5) / 16 = 0.9375
        let gap = child_attention_gap(&panel(), Granularity::District).unwrap();
        assert_eq!(gap.height(), 1);
        assert!((f64_at(&gap, COL::MINOR_SHARE_UPDATES, 0) - 0.6).abs() < 1e-9);
        assert!((f64_at(&gap, COL::MINOR_SHARE_ENROLMENTS, 0) - 0.9375).abs() < 1e-9);
        assert!((f64_at(&gap, COL::CHILD_ATTENTION_GAP, 0) - (0.6 - 0.9375)).abs() < 1e-9);
        assert!(gap.column(COL::STATE).is_ok());
        assert!(gap.column(COL::DISTRICT).is_ok());
    }

    #[test]
    fn national_gap_is_a_single_row_without_keys() {
        let gap = child_attention_gap(&panel(), Granularity::National).unwrap();
        assert_eq!(gap.height(), 1);
        assert!(gap.column(COL::STATE).is_err());
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(Granularity::from_str("district").unwrap(), Granularity::District);
        assert_eq!(Granularity::from_str("STATE").unwrap(), Granularity::State);
        assert!(Granularity::from_str("pincode").is_err());
    }
}
