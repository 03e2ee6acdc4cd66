use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory of enrolment CSV snapshots.
    pub enrolment_dir: PathBuf,
    /// Directory of biometric update CSV snapshots.
    pub biometric_dir: PathBuf,
    /// Directory of demographic update CSV snapshots.
    pub demographic_dir: PathBuf,
    /// Where the pipeline writes its output tables.
    pub output_dir: PathBuf,
    /// When true, a dataset type with no loadable file is substituted with an
    /// empty table instead of failing the run. The missing dataset's columns
    /// come out as zero in the reconciled panel.
    pub allow_missing_sources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enrolment_dir: "data/api_data_aadhar_enrolment".into(),
            biometric_dir: "data/api_data_aadhar_biometric".into(),
            demographic_dir: "data/api_data_aadhar_demographic".into(),
            output_dir: "outputs".into(),
            allow_missing_sources: false,
        }
    }
}
