use enrolpanel::error::EnrolpanelError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum EnrolpanelCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error")]
    PolarsError(#[from] PolarsError),
    #[error("enrolpanel error")]
    EnrolpanelError(#[from] EnrolpanelError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type EnrolpanelCliResult<T> = Result<T, EnrolpanelCliError>;
