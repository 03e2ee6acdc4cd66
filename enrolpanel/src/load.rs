//! CSV ingestion. Each dataset is a directory of CSV files sharing one
//! header layout; files are read in lexicographic path order so repeated
//! runs see identical row order, and per-file failures are recorded rather
//! than aborting the whole dataset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use polars::prelude::*;
use strum_macros::{Display, EnumString};

use crate::config::Config;
use crate::error::EnrolpanelError;
use crate::COL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DatasetKind {
    Enrolment,
    Biometric,
    Demographic,
}

impl DatasetKind {
    pub fn count_columns(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Enrolment => &[COL::AGE_0_5, COL::AGE_5_17, COL::AGE_18_GREATER],
            DatasetKind::Biometric => &[COL::BIO_AGE_5_17, COL::BIO_AGE_17_PLUS],
            DatasetKind::Demographic => &[COL::DEMO_AGE_5_17, COL::DEMO_AGE_17_PLUS],
        }
    }

    /// Columns a file must carry to be loadable. Pincode is optional and
    /// gets materialized as nulls when a file predates its introduction.
    pub fn required_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![COL::DATE, COL::STATE, COL::DISTRICT];
        columns.extend_from_slice(self.count_columns());
        columns
    }

    fn output_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![COL::DATE, COL::STATE, COL::DISTRICT, COL::PINCODE];
        columns.extend_from_slice(self.count_columns());
        columns
    }
}

/// What happened to one file: row count on success, the error otherwise.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<usize, EnrolpanelError>,
}

/// One dataset directory, concatenated, plus the per-file accounting.
#[derive(Debug)]
pub struct DatasetLoad {
    pub kind: DatasetKind,
    pub frame: DataFrame,
    pub outcomes: Vec<FileOutcome>,
}

impl DatasetLoad {
    pub fn loaded_files(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn skipped_files(&self) -> usize {
        self.outcomes.len() - self.loaded_files()
    }
}

#[derive(Debug)]
pub struct Datasets {
    pub enrolment: DatasetLoad,
    pub biometric: DatasetLoad,
    pub demographic: DatasetLoad,
}

/// Read one CSV into the dataset's canonical column layout: key columns as
/// strings, counts cast to Int64 with junk values nulled then zeroed, and a
/// pincode column added as nulls when the file lacks one.
fn read_csv(path: &Path, kind: DatasetKind) -> Result<DataFrame, EnrolpanelError> {
    // Pincodes keep leading zeros, so never let them infer as integers.
    let overrides = Schema::from_iter([Field::new(COL::PINCODE, DataType::String)]);
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(Arc::new(overrides)))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let missing: Vec<String> = kind
        .required_columns()
        .iter()
        .filter(|name| df.column(name).is_err())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EnrolpanelError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    let mut columns: Vec<Expr> = vec![
        col(COL::DATE).cast(DataType::String),
        col(COL::STATE).cast(DataType::String),
        col(COL::DISTRICT).cast(DataType::String),
        if df.column(COL::PINCODE).is_ok() {
            col(COL::PINCODE)
        } else {
            lit(NULL).cast(DataType::String).alias(COL::PINCODE)
        },
    ];
    columns.extend(
        kind.count_columns()
            .iter()
            .map(|name| col(*name).cast(DataType::Int64).fill_null(lit(0i64))),
    );
    let df = df.lazy().select(columns).collect()?;
    Ok(df.select(kind.output_columns())?)
}

fn csv_paths(dir: &Path) -> Result<Vec<PathBuf>, EnrolpanelError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn empty_frame(kind: DatasetKind) -> DataFrame {
    let mut series = vec![
        Series::new_empty(COL::DATE, &DataType::String),
        Series::new_empty(COL::STATE, &DataType::String),
        Series::new_empty(COL::DISTRICT, &DataType::String),
        Series::new_empty(COL::PINCODE, &DataType::String),
    ];
    series.extend(
        kind.count_columns()
            .iter()
            .map(|name| Series::new_empty(name, &DataType::Int64)),
    );
    // Schema-only construction cannot fail.
    DataFrame::new(series).unwrap_or_default()
}

/// Load every CSV under `dir`, in parallel but reassembled in path order.
pub async fn load_dataset(
    dir: &Path,
    kind: DatasetKind,
    allow_missing: bool,
) -> Result<DatasetLoad> {
    let paths = match csv_paths(dir) {
        Ok(paths) => paths,
        Err(err) if allow_missing => {
            warn!("{kind}: cannot read {}: {err}", dir.display());
            Vec::new()
        }
        Err(err) => return Err(err.into()),
    };

    let handles: Vec<_> = paths
        .into_iter()
        .map(|path| tokio::task::spawn_blocking(move || (path.clone(), read_csv(&path, kind))))
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    let mut frames = Vec::new();
    for handle in handles {
        let (path, result) = handle.await?;
        match result {
            Ok(frame) => {
                info!("{kind}: loaded {} rows from {}", frame.height(), path.display());
                outcomes.push(FileOutcome {
                    path,
                    result: Ok(frame.height()),
                });
                frames.push(frame.lazy());
            }
            Err(err) => {
                warn!("{kind}: skipping {}: {err}", path.display());
                outcomes.push(FileOutcome {
                    path,
                    result: Err(err),
                });
            }
        }
    }

    let frame = if frames.is_empty() {
        if !allow_missing {
            return Err(EnrolpanelError::NoLoadableFiles {
                dataset: kind.to_string(),
                dir: dir.to_path_buf(),
            }
            .into());
        }
        warn!("{kind}: no loadable files, continuing with an empty dataset");
        empty_frame(kind)
    } else {
        concat(&frames, UnionArgs::default())?.collect()?
    };

    Ok(DatasetLoad {
        kind,
        frame,
        outcomes,
    })
}

/// Load all three datasets concurrently.
pub async fn load_all(config: &Config) -> Result<Datasets> {
    let (enrolment, biometric, demographic) = tokio::try_join!(
        load_dataset(
            &config.enrolment_dir,
            DatasetKind::Enrolment,
            config.allow_missing_sources
        ),
        load_dataset(
            &config.biometric_dir,
            DatasetKind::Biometric,
            config.allow_missing_sources
        ),
        load_dataset(
            &config.demographic_dir,
            DatasetKind::Demographic,
            config.allow_missing_sources
        ),
    )?;
    Ok(Datasets {
        enrolment,
        biometric,
        demographic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn loads_files_in_path_order_and_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "b.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
             02-05-2023,Delhi,North,110001,4,5,6\n",
        );
        write_file(
            dir.path(),
            "a.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
             01-05-2023,Delhi,North,110001,1,2,3\n",
        );
        let load = load_dataset(dir.path(), DatasetKind::Enrolment, false)
            .await
            .unwrap();
        assert_eq!(load.frame.height(), 2);
        assert_eq!(load.loaded_files(), 2);
        // a.csv sorts before b.csv, so its row comes first.
        let first = load
            .frame
            .column(COL::AGE_0_5)
            .unwrap()
            .i64()
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(first, 1);
    }

    #[tokio::test]
    async fn missing_pincode_column_is_materialized_as_nulls() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "old.csv",
            "date,state,district,bio_age_5_17,bio_age_17_\n\
             01-05-2023,Delhi,North,7,9\n",
        );
        let load = load_dataset(dir.path(), DatasetKind::Biometric, false)
            .await
            .unwrap();
        let pincode = load.frame.column(COL::PINCODE).unwrap();
        assert_eq!(pincode.dtype(), &DataType::String);
        assert_eq!(pincode.null_count(), 1);
    }

    #[tokio::test]
    async fn files_missing_required_columns_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "good.csv",
            "date,state,district,pincode,demo_age_5_17,demo_age_17_\n\
             01-05-2023,Delhi,North,110001,1,2\n",
        );
        write_file(dir.path(), "bad.csv", "date,state\n01-05-2023,Delhi\n");
        let load = load_dataset(dir.path(), DatasetKind::Demographic, false)
            .await
            .unwrap();
        assert_eq!(load.frame.height(), 1);
        assert_eq!(load.loaded_files(), 1);
        assert_eq!(load.skipped_files(), 1);
        let skipped = load
            .outcomes
            .iter()
            .find(|o| o.path.file_name().unwrap() == "bad.csv")
            .unwrap();
        assert!(matches!(
            skipped.result,
            Err(EnrolpanelError::MissingColumns { .. })
        ));
    }

    #[tokio::test]
    async fn junk_counts_become_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "messy.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
             01-05-2023,Delhi,North,110001,n/a,2,3\n",
        );
        let load = load_dataset(dir.path(), DatasetKind::Enrolment, false)
            .await
            .unwrap();
        let value = load
            .frame
            .column(COL::AGE_0_5)
            .unwrap()
            .i64()
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn repeated_loads_deduplicate_identically() {
        use crate::normalize::{normalize, NormalizerConfig};

        let dir = tempfile::tempdir().unwrap();
        // The same key appears in both files and twice in the second one.
        write_file(
            dir.path(),
            "jan_a.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
             01-05-2023,Delhi,North,110001,1,2,3\n\
             02-05-2023,Delhi,North,110001,4,5,6\n",
        );
        write_file(
            dir.path(),
            "jan_b.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
             01-05-2023,Delhi,North,110001,7,8,9\n\
             01-05-2023,Delhi,North,110001,7,8,9\n",
        );
        let config = NormalizerConfig::default();
        let first = {
            let load = load_dataset(dir.path(), DatasetKind::Enrolment, false)
                .await
                .unwrap();
            normalize(&load.frame, &config).unwrap()
        };
        let second = {
            let load = load_dataset(dir.path(), DatasetKind::Enrolment, false)
                .await
                .unwrap();
            normalize(&load.frame, &config).unwrap()
        };
        assert_eq!(first.report.duplicates_removed, 2);
        assert_eq!(first.report, second.report);
        assert_eq!(first.frame, second.frame);
        // jan_a sorts first, so its value wins for the shared key.
        let kept = first
            .frame
            .column(COL::AGE_0_5)
            .unwrap()
            .i64()
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(kept, 1);
    }

    #[tokio::test]
    async fn empty_directory_is_an_error_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let strict = load_dataset(dir.path(), DatasetKind::Enrolment, false).await;
        assert!(strict.is_err());

        let lenient = load_dataset(dir.path(), DatasetKind::Enrolment, true)
            .await
            .unwrap();
        assert_eq!(lenient.frame.height(), 0);
        assert!(lenient.frame.column(COL::AGE_0_5).is_ok());
    }
}
