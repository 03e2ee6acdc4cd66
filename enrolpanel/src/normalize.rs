//! Record normalization: date parsing, geographic name canonicalization and
//! key deduplication. Everything here is best-effort; bad rows are dropped
//! and counted, never raised as batch failures.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::COL;

/// Explicit, immutable configuration for the normalizer. Passing alternate
/// alias tables makes `normalize` a pure function of (input, config).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Strict day-month-year format for the raw `date` column.
    pub date_format: String,
    /// The fixed set of recognized administrative region names.
    pub canonical_states: BTreeSet<String>,
    /// Lowercase alias -> canonical name. Covers misspellings, legacy names
    /// and ampersand/"and" variants.
    pub state_aliases: BTreeMap<String, String>,
    /// Lowercase tokens known to be city/district names erroneously placed in
    /// the state field. Rows matching these are dropped.
    pub state_denylist: BTreeSet<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            date_format: "%d-%m-%Y".to_string(),
            canonical_states: CANONICAL_STATES.iter().map(|s| s.to_string()).collect(),
            state_aliases: STATE_ALIASES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            state_denylist: STATE_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Indian states and union territories, 36 total as of 2024.
const CANONICAL_STATES: [&str; 36] = [
    "Andaman And Nicobar Islands",
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chandigarh",
    "Chhattisgarh",
    // Merged UT since 2020
    "Dadra And Nagar Haveli And Daman And Diu",
    "Delhi",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jammu And Kashmir",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Ladakh",
    "Lakshadweep",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Puducherry",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
];

const STATE_ALIASES: [(&str, &str); 31] = [
    ("andaman & nicobar islands", "Andaman And Nicobar Islands"),
    ("andaman and nicobar islands", "Andaman And Nicobar Islands"),
    ("a & n islands", "Andaman And Nicobar Islands"),
    ("a&n islands", "Andaman And Nicobar Islands"),
    ("chattisgarh", "Chhattisgarh"),
    ("chhatisgarh", "Chhattisgarh"),
    ("chatisgarh", "Chhattisgarh"),
    ("dadra & nagar haveli", "Dadra And Nagar Haveli And Daman And Diu"),
    ("dadra and nagar haveli", "Dadra And Nagar Haveli And Daman And Diu"),
    ("daman & diu", "Dadra And Nagar Haveli And Daman And Diu"),
    ("daman and diu", "Dadra And Nagar Haveli And Daman And Diu"),
    (
        "dadra and nagar haveli and daman and diu",
        "Dadra And Nagar Haveli And Daman And Diu",
    ),
    (
        "the dadra and nagar haveli and daman and diu",
        "Dadra And Nagar Haveli And Daman And Diu",
    ),
    ("d&nh", "Dadra And Nagar Haveli And Daman And Diu"),
    ("d & d", "Dadra And Nagar Haveli And Daman And Diu"),
    ("j & k", "Jammu And Kashmir"),
    ("j&k", "Jammu And Kashmir"),
    ("jammu & kashmir", "Jammu And Kashmir"),
    ("jammu and kashmir", "Jammu And Kashmir"),
    ("orissa", "Odisha"),
    ("pondicherry", "Puducherry"),
    ("tamilnadu", "Tamil Nadu"),
    ("tamil  nadu", "Tamil Nadu"),
    ("telengana", "Telangana"),
    ("telanagana", "Telangana"),
    ("uttaranchal", "Uttarakhand"),
    ("uttarkhand", "Uttarakhand"),
    ("west  bengal", "West Bengal"),
    ("westbengal", "West Bengal"),
    ("delhi (nct)", "Delhi"),
    ("nct of delhi", "Delhi"),
];

/// Districts, cities or pincodes observed in the state column of the
/// published files.
const STATE_DENYLIST: [&str; 7] = [
    "balanagar",
    "darbhanga",
    "jaipur",
    "nagpur",
    "madanapalle",
    "puttenahalli",
    "raja annamalai puram",
];

/// Per-stage drop accounting emitted alongside the normalized table.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows_in: usize,
    pub invalid_dates: usize,
    pub invalid_states: usize,
    pub duplicates_removed: usize,
    pub rows_out: usize,
}

/// A normalized table together with its drop accounting.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub frame: DataFrame,
    pub report: NormalizeReport,
}

/// Trim, collapse internal whitespace and title-case a label.
fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => format!(
                    "{}{}",
                    first.to_uppercase(),
                    chars.as_str().to_lowercase()
                ),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl NormalizerConfig {
    /// Map a raw state label to its canonical name, or `None` for values that
    /// do not resolve to one (pincodes in the state field, denylisted
    /// city/district tokens, empty strings, labels outside the canonical
    /// set).
    pub fn canonical_state(&self, raw: &str) -> Option<String> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        // A pincode leaked into the state field
        if collapsed.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let key = collapsed.to_lowercase();
        if self.state_denylist.contains(&key) {
            return None;
        }
        if let Some(canonical) = self.state_aliases.get(&key) {
            return Some(canonical.clone());
        }
        let titled = title_case(&collapsed);
        if self.canonical_states.contains(&titled) {
            return Some(titled);
        }
        // Case variations like "WEST BENGAL" that title-casing alone misses
        // (e.g. mixed separators) resolve against the canonical set.
        for canonical in &self.canonical_states {
            if canonical.to_lowercase() == key {
                return Some(canonical.clone());
            }
        }
        None
    }
}

/// Normalize a raw transaction table: parse dates (dropping unparseable
/// rows), canonicalize state names (dropping unresolvable labels), title-case
/// district names and deduplicate on the composite key
/// `(date, state, district[, pincode])`, first occurrence winning.
pub fn normalize(df: &DataFrame, config: &NormalizerConfig) -> Result<Normalized> {
    let mut report = NormalizeReport {
        rows_in: df.height(),
        ..Default::default()
    };
    let mut frame = df.clone();

    // 1. Dates. A column that is already dtype Date has been through this
    // step before and is left alone, which keeps normalization idempotent.
    if frame.column(COL::DATE)?.dtype() == &DataType::String {
        frame = frame
            .lazy()
            .with_column(
                col(COL::DATE)
                    .str()
                    .to_date(StrptimeOptions {
                        format: Some(config.date_format.clone()),
                        strict: false,
                        exact: true,
                        cache: true,
                    })
                    .alias(COL::DATE),
            )
            .collect()?;
        report.invalid_dates = frame.column(COL::DATE)?.null_count();
        if report.invalid_dates > 0 {
            frame = frame
                .lazy()
                .filter(col(COL::DATE).is_not_null())
                .collect()?;
        }
    }

    // 2. States. Rebuilt value by value through the canonicalization table;
    // rows mapping to None are dropped.
    let states: StringChunked = frame
        .column(COL::STATE)?
        .str()?
        .into_iter()
        .map(|value| value.and_then(|v| config.canonical_state(v)))
        .collect();
    let states = states.with_name(COL::STATE).into_series();
    report.invalid_states = states.null_count();
    frame.with_column(states)?;
    if report.invalid_states > 0 {
        frame = frame
            .lazy()
            .filter(col(COL::STATE).is_not_null())
            .collect()?;
    }

    // 3. Districts: trim and title-case only, no alias table. District names
    // are assumed locally unique within a state.
    let districts: StringChunked = frame
        .column(COL::DISTRICT)?
        .str()?
        .into_iter()
        .map(|value| match value {
            Some(v) if !v.trim().is_empty() => Some(title_case(v)),
            _ => Some("Unknown".to_string()),
        })
        .collect();
    frame.with_column(districts.with_name(COL::DISTRICT).into_series())?;

    // 4. Deduplicate on the composite key, first occurrence wins. The caller
    // fixes the row order (lexicographic by source file) before calling.
    let mut key: Vec<String> = COL::GROUP_KEYS.iter().map(|c| c.to_string()).collect();
    if frame
        .get_column_names()
        .iter()
        .any(|c| *c == COL::PINCODE)
    {
        key.push(COL::PINCODE.to_string());
    }
    let before = frame.height();
    frame = frame.unique_stable(Some(&key), UniqueKeepStrategy::First, None)?;
    report.duplicates_removed = before - frame.height();

    report.rows_out = frame.height();
    info!(
        "normalized {} -> {} rows ({} bad dates, {} bad states, {} duplicates)",
        report.rows_in,
        report.rows_out,
        report.invalid_dates,
        report.invalid_states,
        report.duplicates_removed
    );
    debug!("normalized shape: {:?}", frame.shape());

    Ok(Normalized { frame, report })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrolment_df() -> DataFrame {
        df!(
            COL::DATE => &["01-01-2025", "02-01-2025", "31-02-2025", "03-01-2025"],
            COL::STATE => &["ORISSA", "Delhi", "Delhi", "100000"],
            COL::DISTRICT => &["  khordha ", "North", "North", "North"],
            COL::PINCODE => &["751001", "110001", "110001", "110001"],
            COL::AGE_0_5 => &[1i64, 2, 3, 4],
            COL::AGE_5_17 => &[0i64, 0, 0, 0],
            COL::AGE_18_GREATER => &[5i64, 6, 7, 8],
        )
        .unwrap()
    }

    #[test]
    fn canonicalizes_legacy_and_variant_state_names() {
        let config = NormalizerConfig::default();
        assert_eq!(config.canonical_state("ORISSA").unwrap(), "Odisha");
        assert_eq!(config.canonical_state("orissa").unwrap(), "Odisha");
        assert_eq!(
            config.canonical_state("Jammu & Kashmir").unwrap(),
            "Jammu And Kashmir"
        );
        assert_eq!(config.canonical_state("WEST BENGAL").unwrap(), "West Bengal");
        assert_eq!(config.canonical_state("tamil  nadu").unwrap(), "Tamil Nadu");
    }

    #[test]
    fn rejects_non_state_tokens() {
        let config = NormalizerConfig::default();
        assert_eq!(config.canonical_state("100000"), None);
        assert_eq!(config.canonical_state("jaipur"), None);
        assert_eq!(config.canonical_state("   "), None);
        // Labels outside the canonical set are dropped too, not passed
        // through.
        assert_eq!(config.canonical_state("Not A Real State"), None);
    }

    #[test]
    fn drops_rows_with_unrecognized_state_labels() {
        let df = df!(
            COL::DATE => &["01-01-2025", "01-01-2025"],
            COL::STATE => &["Not A Real State", "Kerala"],
            COL::DISTRICT => &["Somewhere", "Ernakulam"],
            COL::PINCODE => &["999999", "682001"],
            COL::AGE_0_5 => &[1i64, 2],
            COL::AGE_5_17 => &[0i64, 0],
            COL::AGE_18_GREATER => &[3i64, 4],
        )
        .unwrap();
        let config = NormalizerConfig::default();
        let normalized = normalize(&df, &config).unwrap();
        assert_eq!(normalized.report.invalid_states, 1);
        assert_eq!(normalized.frame.height(), 1);
        let states: Vec<Option<&str>> = normalized
            .frame
            .column(COL::STATE)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        for state in states {
            assert!(config.canonical_states.contains(state.unwrap()));
        }
    }

    #[test]
    fn drops_bad_rows_and_counts_them() {
        let normalized = normalize(&enrolment_df(), &NormalizerConfig::default()).unwrap();
        // Row 3 has an impossible date, row 4 a pincode in the state field.
        assert_eq!(normalized.report.rows_in, 4);
        assert_eq!(normalized.report.invalid_dates, 1);
        assert_eq!(normalized.report.invalid_states, 1);
        assert_eq!(normalized.report.rows_out, 2);

        let states: Vec<Option<&str>> = normalized
            .frame
            .column(COL::STATE)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(states, vec![Some("Odisha"), Some("Delhi")]);
        let districts: Vec<Option<&str>> = normalized
            .frame
            .column(COL::DISTRICT)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(districts, vec![Some("Khordha"), Some("North")]);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let df = df!(
            COL::DATE => &["01-01-2025", "01-01-2025"],
            COL::STATE => &["Delhi", "Delhi"],
            COL::DISTRICT => &["North", "North"],
            COL::PINCODE => &["110001", "110001"],
            COL::AGE_0_5 => &[10i64, 99],
            COL::AGE_5_17 => &[5i64, 99],
            COL::AGE_18_GREATER => &[1i64, 99],
        )
        .unwrap();
        let normalized = normalize(&df, &NormalizerConfig::default()).unwrap();
        assert_eq!(normalized.report.duplicates_removed, 1);
        assert_eq!(normalized.frame.height(), 1);
        let first: i64 = normalized
            .frame
            .column(COL::AGE_0_5)
            .unwrap()
            .i64()
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(first, 10);
    }

    #[test]
    fn differing_pincodes_are_not_duplicates() {
        let df = df!(
            COL::DATE => &["01-01-2025", "01-01-2025"],
            COL::STATE => &["Delhi", "Delhi"],
            COL::DISTRICT => &["North", "North"],
            COL::PINCODE => &["110001", "110002"],
            COL::AGE_0_5 => &[10i64, 20],
            COL::AGE_5_17 => &[5i64, 5],
            COL::AGE_18_GREATER => &[1i64, 1],
        )
        .unwrap();
        let normalized = normalize(&df, &NormalizerConfig::default()).unwrap();
        assert_eq!(normalized.report.duplicates_removed, 0);
        assert_eq!(normalized.frame.height(), 2);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize(&enrolment_df(), &NormalizerConfig::default()).unwrap();
        let twice = normalize(&once.frame, &NormalizerConfig::default()).unwrap();
        assert_eq!(once.frame, twice.frame);
        assert_eq!(twice.report.invalid_dates, 0);
        assert_eq!(twice.report.invalid_states, 0);
        assert_eq!(twice.report.duplicates_removed, 0);
    }
}
