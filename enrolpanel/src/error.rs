use std::path::PathBuf;

use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum EnrolpanelError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{}: missing required columns {columns:?}", path.display())]
    MissingColumns { path: PathBuf, columns: Vec<String> },
    #[error("no loadable CSV file for dataset '{dataset}' in {}", dir.display())]
    NoLoadableFiles { dataset: String, dir: PathBuf },
}

pub type EnrolpanelResult<T> = Result<T, EnrolpanelError>;
