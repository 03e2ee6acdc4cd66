use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use enrolpanel::{
    config::Config,
    formatters::{CsvFormatter, JsonFormatter, JsonLinesFormatter, OutputFormatter, OutputGenerator},
    metrics::Granularity,
    normalize::NormalizerConfig,
    summary::summary_at,
    validate::{QualityValidator, ValidatorConfig},
    Enrolpanel, PipelineOutput, COL,
};

use crate::display::{display_frame, display_normalize_reports, display_quality_report};
use crate::error::EnrolpanelCliResult;

const METRIC_COLUMNS: [&str; 4] = [
    COL::UPDATE_INTENSITY,
    COL::UPDATES_PER_1000,
    COL::BIO_SHARE,
    COL::DEMO_SHARE,
];

/// Defines the output formats we are able to produce data in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Csv,
    Json,
    JsonLines,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            OutputFormat::Csv => OutputFormatter::Csv(CsvFormatter),
            OutputFormat::Json => OutputFormatter::Json(JsonFormatter),
            OutputFormat::JsonLines => OutputFormatter::JsonLines(JsonLinesFormatter),
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: U,
) -> EnrolpanelCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    let mut f = File::create(&output_file).with_context(|| {
        format!("Failed to write output: {}", output_file.as_ref().display())
    })?;
    output_generator.save(&mut f, &mut data)?;
    Ok(())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> EnrolpanelCliResult<()>;
}

/// Source-directory overrides shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(long, help = "Directory containing enrolment CSV files")]
    enrolment_dir: Option<PathBuf>,
    #[arg(long, help = "Directory containing biometric update CSV files")]
    biometric_dir: Option<PathBuf>,
    #[arg(long, help = "Directory containing demographic update CSV files")]
    demographic_dir: Option<PathBuf>,
    #[arg(
        long,
        help = "Continue with an empty dataset when a source directory is missing or unreadable"
    )]
    allow_missing_sources: bool,
}

impl SourceArgs {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.enrolment_dir {
            config.enrolment_dir = dir.clone();
        }
        if let Some(dir) = &self.biometric_dir {
            config.biometric_dir = dir.clone();
        }
        if let Some(dir) = &self.demographic_dir {
            config.demographic_dir = dir.clone();
        }
        if self.allow_missing_sources {
            config.allow_missing_sources = true;
        }
        config
    }
}

async fn run_pipeline(config: Config) -> EnrolpanelCliResult<PipelineOutput> {
    let pipeline = Enrolpanel::new_with_config(config).await?;
    Ok(pipeline.run(&NormalizerConfig::default())?)
}

fn reports<'a>(output: &'a PipelineOutput) -> Vec<(&'static str, &'a enrolpanel::normalize::NormalizeReport)> {
    vec![
        ("enrolment", &output.enrolment_report),
        ("biometric", &output.biometric_report),
        ("demographic", &output.demographic_report),
    ]
}

/// The `run` command executes the full pipeline and writes the panel,
/// derived metrics and summary tables to the output directory.
#[derive(Args, Debug)]
pub struct PipelineCommand {
    #[command(flatten)]
    source_args: SourceArgs,
    #[arg(
        short = 'f',
        long,
        value_name = "csv|json|jsonlines",
        default_value = "csv",
        help = "Output format for the results"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Directory to place the results")]
    output_dir: Option<PathBuf>,
}

impl RunCommand for PipelineCommand {
    async fn run(&self, config: Config) -> EnrolpanelCliResult<()> {
        info!("Running `run` subcommand");
        let config = self.source_args.apply(config);
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output_dir.clone());
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let output = run_pipeline(config).await?;
        debug!("{:#?}", output.panel);

        let ext = self.output_format.extension();
        let panel_only = output.panel.drop_many(&METRIC_COLUMNS);
        let tables = [
            ("reconciled_panel", panel_only),
            ("derived_metrics", output.panel.clone()),
            ("state_summary", summary_at(&output.panel, Granularity::State)?),
            (
                "district_summary",
                summary_at(&output.panel, Granularity::District)?,
            ),
        ];
        for (name, frame) in tables {
            let path = output_dir.join(format!("{name}.{ext}"));
            let formatter: OutputFormatter = (&self.output_format).into();
            write_output(formatter, frame, &path)?;
            println!("Wrote {}", path.display());
        }

        let validator = QualityValidator::new(&output.panel, ValidatorConfig::default())?;
        let report_path = output_dir.join("quality_report.json");
        let f = File::create(&report_path).with_context(|| {
            format!("Failed to write output: {}", report_path.display())
        })?;
        serde_json::to_writer_pretty(f, &validator.report()?)?;
        println!("Wrote {}", report_path.display());

        display_normalize_reports(&reports(&output))?;
        Ok(())
    }
}

/// The `summary` command prints (or writes) one summary table.
#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[command(flatten)]
    source_args: SourceArgs,
    #[arg(
        short = 'g',
        long,
        value_name = "national|state|district",
        default_value = "state",
        help = "Aggregation level of the summary"
    )]
    granularity: Granularity,
    #[arg(
        short = 'f',
        long,
        value_name = "csv|json|jsonlines",
        default_value = "csv",
        help = "Output format when writing to a file"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<PathBuf>,
    #[arg(long, help = "Show all rows even if there are a large number")]
    full: bool,
}

impl RunCommand for SummaryCommand {
    async fn run(&self, config: Config) -> EnrolpanelCliResult<()> {
        info!("Running `summary` subcommand");
        let config = self.source_args.apply(config);
        let output = run_pipeline(config).await?;
        let summary = summary_at(&output.panel, self.granularity)?;

        if let Some(output_file) = &self.output_file {
            let formatter: OutputFormatter = (&self.output_format).into();
            write_output(formatter, summary, output_file)?;
            println!("Wrote {}", output_file.display());
        } else {
            let max_results = (!self.full && summary.height() > 50).then_some(50);
            display_frame(&summary, max_results)?;
        }
        Ok(())
    }
}

/// The `validate` command runs the statistical quality checks over the
/// reconciled panel.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    source_args: SourceArgs,
    #[arg(long, help = "Seed for the bootstrap resampler")]
    seed: Option<u64>,
    #[arg(long, help = "Minimum records per state before flagging it as a small sample")]
    min_sample_size: Option<usize>,
    #[arg(
        long,
        value_name = "COLUMN NAME",
        help = "Also print per-state bootstrap confidence intervals for a column"
    )]
    ci_column: Option<String>,
    #[arg(short = 'o', long, help = "Output file for the JSON quality report")]
    output_file: Option<PathBuf>,
    #[arg(long, help = "Write the panel with a quality_score column instead of the report")]
    annotated: bool,
}

impl RunCommand for ValidateCommand {
    async fn run(&self, config: Config) -> EnrolpanelCliResult<()> {
        info!("Running `validate` subcommand");
        let config = self.source_args.apply(config);
        let output = run_pipeline(config).await?;

        let mut validator_config = ValidatorConfig::default();
        if let Some(seed) = self.seed {
            validator_config.seed = seed;
        }
        if let Some(min_sample_size) = self.min_sample_size {
            validator_config.min_sample_size = min_sample_size;
        }
        let validator = QualityValidator::new(&output.panel, validator_config)?;
        let report = validator.report()?;

        if self.annotated {
            let annotated = validator.annotated()?;
            if let Some(output_file) = &self.output_file {
                write_output(CsvFormatter, annotated, output_file)?;
                println!("Wrote {}", output_file.display());
            } else {
                display_frame(&annotated, Some(50))?;
            }
            return Ok(());
        }

        if let Some(output_file) = &self.output_file {
            let f = File::create(output_file).with_context(|| {
                format!("Failed to write output: {}", output_file.display())
            })?;
            serde_json::to_writer_pretty(f, &report)?;
            println!("Wrote {}", output_file.display());
        } else {
            display_quality_report(&report)?;
        }

        if let Some(column) = &self.ci_column {
            let intervals = validator.confidence_intervals(column)?;
            display_frame(&intervals, None)?;
        }
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Enrolpanel reconciles enrolment and update datasets into one analysable panel.", long_about = None, name="enrolpanel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Run the full pipeline and write every output table
    Run(PipelineCommand),
    /// Print or write one grouped summary table
    Summary(SummaryCommand),
    /// Run statistical quality checks over the reconciled panel
    Validate(ValidateCommand),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn output_type_should_deserialize_properly() {
        let output_format = OutputFormat::from_str("Csv");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::Csv,
            "csv format should be parsed correctly"
        );
        let output_format = OutputFormat::from_str("jsonlines");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::JsonLines,
            "parsing should be case insensitive"
        );
        let output_format = OutputFormat::from_str("parquet");
        assert!(output_format.is_err(), "non listed formats should fail");
    }

    #[test]
    fn cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
