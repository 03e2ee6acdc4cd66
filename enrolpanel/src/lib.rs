use anyhow::Result;
use load::Datasets;
use log::debug;
use polars::frame::DataFrame;

use crate::config::Config;
use crate::load::DatasetLoad;
use crate::metrics::Granularity;
use crate::normalize::{NormalizeReport, NormalizerConfig};

// Re-exports
pub use column_names as COL;

// Modules
pub mod aggregate;
pub mod column_names;
pub mod config;
pub mod error;
pub mod formatters;
pub mod load;
pub mod metrics;
pub mod normalize;
pub mod reconcile;
pub mod summary;
pub mod validate;

/// Everything a pipeline run produces: the reconciled panel with derived
/// metrics, plus per-source normalization accounting.
#[derive(Debug)]
pub struct PipelineOutput {
    pub panel: DataFrame,
    pub enrolment_report: NormalizeReport,
    pub biometric_report: NormalizeReport,
    pub demographic_report: NormalizeReport,
}

/// Type for enrolpanel data and API
pub struct Enrolpanel {
    pub datasets: Datasets,
    pub config: Config,
}

impl Enrolpanel {
    /// Setup the Enrolpanel object with default configuration
    pub async fn new() -> Result<Self> {
        Self::new_with_config(Config::default()).await
    }

    /// Setup the Enrolpanel object with custom configuration
    pub async fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let datasets = load::load_all(&config).await?;
        Ok(Self { datasets, config })
    }

    /// Runs the full pipeline over the loaded datasets: normalize and
    /// aggregate each source, reconcile into one panel, derive metrics.
    pub fn run(&self, normalizer: &NormalizerConfig) -> Result<PipelineOutput> {
        let (enrol, enrolment_report) = prepare(&self.datasets.enrolment, normalizer)?;
        let (bio, biometric_report) = prepare(&self.datasets.biometric, normalizer)?;
        let (demo, demographic_report) = prepare(&self.datasets.demographic, normalizer)?;

        let panel = reconcile::reconcile(&enrol, &bio, &demo)?;
        let panel = metrics::derive_metrics(&panel)?;
        Ok(PipelineOutput {
            panel,
            enrolment_report,
            biometric_report,
            demographic_report,
        })
    }

    /// Grouped summary of a pipeline run at the given granularity.
    pub fn summary(&self, panel: &DataFrame, granularity: Granularity) -> Result<DataFrame> {
        summary::summary_at(panel, granularity)
    }
}

fn prepare(
    load: &DatasetLoad,
    normalizer: &NormalizerConfig,
) -> Result<(DataFrame, NormalizeReport)> {
    let normalized = normalize::normalize(&load.frame, normalizer)?;
    let aggregated = aggregate::aggregate(&normalized.frame)?;
    Ok((aggregated, normalized.report))
}
