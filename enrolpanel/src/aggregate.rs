//! Collapse normalized per-pincode records to `(date, state, district)`
//! totals. Pincode is not part of the unit of analysis and is dropped.

use anyhow::Result;
use log::debug;
use polars::prelude::*;

use crate::COL;

/// Sum every numeric column over `(date, state, district)`. Grouping and
/// summation are commutative, so input order never affects the result; the
/// output is sorted by the group key so it is also reproducible byte for
/// byte. An empty input yields an empty output.
pub fn aggregate(df: &DataFrame) -> Result<DataFrame> {
    let mut frame = df.clone();
    if frame
        .get_column_names()
        .iter()
        .any(|c| *c == COL::PINCODE)
    {
        frame = frame.drop(COL::PINCODE)?;
    }

    let sums: Vec<Expr> = frame
        .schema()
        .iter()
        .filter(|(name, dtype)| {
            !COL::GROUP_KEYS.contains(&name.as_str()) && dtype.is_numeric()
        })
        .map(|(name, _)| col(name.as_str()).sum())
        .collect();

    let out = frame
        .lazy()
        .group_by([col(COL::DATE), col(COL::STATE), col(COL::DISTRICT)])
        .agg(sums)
        .sort(COL::GROUP_KEYS, SortMultipleOptions::default())
        .collect()?;
    debug!("aggregated {} -> {} rows", df.height(), out.height());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, NormalizerConfig};

    #[test]
    fn sums_across_pincodes_and_drops_the_column() {
        let raw = df!(
            COL::DATE => &["01-01-2025", "01-01-2025", "02-01-2025"],
            COL::STATE => &["Delhi", "Delhi", "Delhi"],
            COL::DISTRICT => &["North", "North", "North"],
            COL::PINCODE => &["110001", "110002", "110001"],
            COL::AGE_0_5 => &[10i64, 20, 1],
            COL::AGE_5_17 => &[5i64, 5, 2],
            COL::AGE_18_GREATER => &[1i64, 1, 3],
        )
        .unwrap();
        let normalized = normalize(&raw, &NormalizerConfig::default()).unwrap();
        let agg = aggregate(&normalized.frame).unwrap();

        assert_eq!(agg.height(), 2);
        assert!(agg.column(COL::PINCODE).is_err());
        let age_0_5: Vec<Option<i64>> =
            agg.column(COL::AGE_0_5).unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(age_0_5, vec![Some(30), Some(1)]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let raw = df!(
            COL::DATE => Vec::<String>::new(),
            COL::STATE => Vec::<String>::new(),
            COL::DISTRICT => Vec::<String>::new(),
            COL::AGE_0_5 => Vec::<i64>::new(),
            COL::AGE_5_17 => Vec::<i64>::new(),
            COL::AGE_18_GREATER => Vec::<i64>::new(),
        )
        .unwrap();
        let agg = aggregate(&raw).unwrap();
        assert_eq!(agg.height(), 0);
        assert!(agg.column(COL::AGE_0_5).is_ok());
    }
}
