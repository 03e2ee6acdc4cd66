//! Statistical quality checks over the reconciled panel: placeholder
//! detection, z-score outliers, zero-after-nonzero reporting gaps, bootstrap
//! confidence intervals and a per-record quality score.

use std::collections::BTreeMap;

use anyhow::Result;
use log::info;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::COL;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Values that are an exact positive multiple of this are treated as
    /// placeholder entries (bulk-loaded sentinels, not real counts).
    pub round_multiple: f64,
    pub zscore_threshold: f64,
    pub n_bootstrap: usize,
    pub confidence: f64,
    pub min_sample_size: usize,
    /// Score deduction per flagged column on a record, on a 0..100 scale.
    pub flag_penalty: f64,
    pub seed: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            round_multiple: 1e9,
            zscore_threshold: 5.0,
            n_bootstrap: 1000,
            confidence: 0.95,
            min_sample_size: 30,
            flag_penalty: 30.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnFlagStats {
    pub placeholder: usize,
    pub outlier: usize,
    pub zero_after_nonzero: usize,
}

impl ColumnFlagStats {
    fn total(&self) -> usize {
        self.placeholder + self.outlier + self.zero_after_nonzero
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub total_records: usize,
    pub columns: BTreeMap<String, ColumnFlagStats>,
    pub total_flags: usize,
    pub mean_quality_score: f64,
    pub median_quality_score: f64,
    pub records_below_80: usize,
    pub small_sample_states: Vec<SmallSampleState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmallSampleState {
    pub state: String,
    pub sample_size: usize,
}

/// Runs all checks over a reconciled panel. The frame is re-sorted by
/// (state, district, date) on construction so that sequence checks and flag
/// indices share one row order.
pub struct QualityValidator {
    frame: DataFrame,
    config: ValidatorConfig,
    columns: Vec<String>,
    flags_per_row: Vec<usize>,
    flag_columns: BTreeMap<String, Vec<bool>>,
    column_stats: BTreeMap<String, ColumnFlagStats>,
}

impl QualityValidator {
    pub fn new(panel: &DataFrame, config: ValidatorConfig) -> Result<Self> {
        let frame = panel
            .clone()
            .lazy()
            .sort(
                [COL::STATE, COL::DISTRICT, COL::DATE],
                SortMultipleOptions::default(),
            )
            .collect()?;
        let columns: Vec<String> = COL::AGE_BAND_COLUMNS
            .iter()
            .chain(
                [
                    COL::TOTAL_ENROLMENTS,
                    COL::TOTAL_BIO_UPDATES,
                    COL::TOTAL_DEMO_UPDATES,
                    COL::TOTAL_UPDATES,
                ]
                .iter(),
            )
            .filter(|name| frame.column(name).is_ok())
            .map(|name| name.to_string())
            .collect();
        let flags_per_row = vec![0; frame.height()];
        let mut validator = Self {
            frame,
            config,
            columns,
            flags_per_row,
            flag_columns: BTreeMap::new(),
            column_stats: BTreeMap::new(),
        };
        validator.detect_suspicious()?;
        Ok(validator)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    fn column_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let series = self.frame.column(name)?.cast(&DataType::Float64)?;
        Ok(series.f64()?.into_iter().collect())
    }

    /// Group boundaries for sequence checks: contiguous runs of one
    /// (state, district) pair in the sorted frame.
    fn group_runs(&self) -> Result<Vec<(usize, usize)>> {
        let states = self.frame.column(COL::STATE)?.str()?.clone();
        let districts = self.frame.column(COL::DISTRICT)?.str()?.clone();
        let mut runs = Vec::new();
        let mut start = 0usize;
        for idx in 1..self.frame.height() {
            if states.get(idx) != states.get(idx - 1)
                || districts.get(idx) != districts.get(idx - 1)
            {
                runs.push((start, idx));
                start = idx;
            }
        }
        if self.frame.height() > 0 {
            runs.push((start, self.frame.height()));
        }
        Ok(runs)
    }

    fn detect_suspicious(&mut self) -> Result<()> {
        let runs = self.group_runs()?;
        for name in self.columns.clone() {
            let values = self.column_values(&name)?;
            let mut stats = ColumnFlagStats::default();
            let mut flagged = vec![false; values.len()];

            for (idx, value) in values.iter().enumerate() {
                let Some(v) = value else { continue };
                if *v > 0.0 && (v % self.config.round_multiple).abs() < f64::EPSILON {
                    stats.placeholder += 1;
                    flagged[idx] = true;
                }
            }

            let present: Vec<f64> = values.iter().flatten().copied().collect();
            if present.len() > 3 {
                let mean = present.iter().sum::<f64>() / present.len() as f64;
                let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                    / present.len() as f64;
                let std = variance.sqrt();
                if std > 0.0 {
                    for (idx, value) in values.iter().enumerate() {
                        let Some(v) = value else { continue };
                        if ((v - mean) / std).abs() > self.config.zscore_threshold {
                            stats.outlier += 1;
                            flagged[idx] = true;
                        }
                    }
                }
            }

            for &(start, end) in &runs {
                let mut seen_nonzero = false;
                for idx in start..end {
                    match values[idx] {
                        Some(v) if v > 0.0 => seen_nonzero = true,
                        Some(v) if v == 0.0 && seen_nonzero => {
                            stats.zero_after_nonzero += 1;
                            flagged[idx] = true;
                        }
                        _ => {}
                    }
                }
            }

            // A column counts once against a record's score no matter how
            // many of the detectors it tripped.
            for (idx, hit) in flagged.iter().enumerate() {
                if *hit {
                    self.flags_per_row[idx] += 1;
                }
            }
            self.flag_columns
                .insert(format!("{name}_suspicious"), flagged);
            self.column_stats.insert(name, stats);
        }
        info!(
            "quality checks flagged {} issues across {} columns",
            self.column_stats.values().map(|s| s.total()).sum::<usize>(),
            self.columns.len()
        );
        Ok(())
    }

    /// Per-state bootstrap confidence interval for the mean of `column`.
    /// States with fewer than two observations get null bounds.
    pub fn confidence_intervals(&self, column: &str) -> Result<DataFrame> {
        let states = self.frame.column(COL::STATE)?.str()?.clone();
        let values = self.column_values(column)?;

        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for idx in 0..self.frame.height() {
            if let (Some(state), Some(value)) = (states.get(idx), values[idx]) {
                grouped.entry(state.to_string()).or_default().push(value);
            }
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut group_col = Vec::new();
        let mut mean_col = Vec::new();
        let mut lower_col = Vec::new();
        let mut upper_col = Vec::new();
        let mut width_col = Vec::new();
        let mut size_col = Vec::new();

        for (state, sample) in &grouped {
            group_col.push(state.clone());
            size_col.push(sample.len() as u32);
            if sample.len() < 2 {
                mean_col.push(None);
                lower_col.push(None);
                upper_col.push(None);
                width_col.push(None);
                continue;
            }
            let mean = sample.iter().sum::<f64>() / sample.len() as f64;
            let mut boot_means = Vec::with_capacity(self.config.n_bootstrap);
            for _ in 0..self.config.n_bootstrap {
                let total: f64 = (0..sample.len())
                    .map(|_| sample[rng.gen_range(0..sample.len())])
                    .sum();
                boot_means.push(total / sample.len() as f64);
            }
            boot_means.sort_by(|a, b| a.total_cmp(b));
            let alpha = 1.0 - self.config.confidence;
            let lower = percentile(&boot_means, 100.0 * alpha / 2.0);
            let upper = percentile(&boot_means, 100.0 * (1.0 - alpha / 2.0));
            mean_col.push(Some(mean));
            lower_col.push(Some(lower));
            upper_col.push(Some(upper));
            width_col.push(Some(upper - lower));
        }

        Ok(df!(
            COL::GROUP => group_col,
            COL::CI_MEAN => mean_col,
            COL::CI_LOWER => lower_col,
            COL::CI_UPPER => upper_col,
            COL::CI_WIDTH => width_col,
            COL::SAMPLE_SIZE => size_col,
        )?)
    }

    /// States whose record count is below the configured minimum, in which
    /// case aggregate conclusions about them are weakly supported.
    pub fn small_sample_states(&self) -> Result<Vec<SmallSampleState>> {
        let states = self.frame.column(COL::STATE)?.str()?.clone();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for idx in 0..self.frame.height() {
            if let Some(state) = states.get(idx) {
                *counts.entry(state.to_string()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .filter(|(_, n)| *n < self.config.min_sample_size)
            .map(|(state, sample_size)| SmallSampleState { state, sample_size })
            .collect())
    }

    pub fn quality_scores(&self) -> Vec<f64> {
        self.flags_per_row
            .iter()
            .map(|flags| (100.0 - self.config.flag_penalty * *flags as f64).clamp(0.0, 100.0))
            .collect()
    }

    /// The sorted panel with one `{column}_suspicious` flag per checked
    /// column and `quality_score` appended.
    pub fn annotated(&self) -> Result<DataFrame> {
        let mut annotated = self.frame.clone();
        for (name, flags) in &self.flag_columns {
            annotated.with_column(Series::new(name, flags.clone()))?;
        }
        annotated.with_column(Series::new(COL::QUALITY_SCORE, self.quality_scores()))?;
        Ok(annotated)
    }

    pub fn report(&self) -> Result<QualityReport> {
        let scores = self.quality_scores();
        let mean = if scores.is_empty() {
            100.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let median = if scores.is_empty() {
            100.0
        } else {
            let mut sorted = scores.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            percentile(&sorted, 50.0)
        };
        Ok(QualityReport {
            total_records: self.frame.height(),
            total_flags: self.column_stats.values().map(|s| s.total()).sum(),
            columns: self.column_stats.clone(),
            mean_quality_score: mean,
            median_quality_score: median,
            records_below_80: scores.iter().filter(|s| **s < 80.0).count(),
            small_sample_states: self.small_sample_states()?,
        })
    }
}

/// Linear-interpolation percentile over an ascending-sorted slice. An empty
/// slice yields NaN.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        sorted[low] + (rank - low as f64) * (sorted[high] - sorted[low])
    }
}
