//! Canonical column names for every table the pipeline produces or consumes.
//!
//! All stages refer to columns through these constants (re-exported from the
//! crate root as `COL`) so a rename only ever happens in one place.

// Key columns shared by all three source datasets
pub const DATE: &str = "date";
pub const STATE: &str = "state";
pub const DISTRICT: &str = "district";
pub const PINCODE: &str = "pincode";

// Enrolment age bands
pub const AGE_0_5: &str = "age_0_5";
pub const AGE_5_17: &str = "age_5_17";
pub const AGE_18_GREATER: &str = "age_18_greater";

// Biometric update age bands
pub const BIO_AGE_5_17: &str = "bio_age_5_17";
pub const BIO_AGE_17_PLUS: &str = "bio_age_17_";

// Demographic update age bands
pub const DEMO_AGE_5_17: &str = "demo_age_5_17";
pub const DEMO_AGE_17_PLUS: &str = "demo_age_17_";

// Totals computed by the reconciler
pub const TOTAL_ENROLMENTS: &str = "total_enrolments";
pub const TOTAL_BIO_UPDATES: &str = "total_bio_updates";
pub const TOTAL_DEMO_UPDATES: &str = "total_demo_updates";
pub const TOTAL_UPDATES: &str = "total_updates";

// Ratio metrics appended by the metric engine
pub const UPDATE_INTENSITY: &str = "update_intensity";
pub const UPDATES_PER_1000: &str = "updates_per_1000";
pub const BIO_SHARE: &str = "bio_share";
pub const DEMO_SHARE: &str = "demo_share";

// Attention-gap table columns
pub const MINOR_SHARE_ENROLMENTS: &str = "minor_share_enrolments";
pub const MINOR_SHARE_UPDATES: &str = "minor_share_updates";
pub const CHILD_ATTENTION_GAP: &str = "child_attention_gap";

// Quality annotations
pub const QUALITY_SCORE: &str = "quality_score";
pub const SAMPLE_SIZE: &str = "sample_size";
pub const CI_MEAN: &str = "mean";
pub const CI_LOWER: &str = "ci_lower";
pub const CI_UPPER: &str = "ci_upper";
pub const CI_WIDTH: &str = "ci_width";
pub const GROUP: &str = "group";

/// The three grouping keys every aggregated table is keyed on.
pub const GROUP_KEYS: [&str; 3] = [DATE, STATE, DISTRICT];

/// The seven age-band source columns carried through the reconciled panel.
/// A merged row where all of these are zero is a join artifact.
pub const AGE_BAND_COLUMNS: [&str; 7] = [
    AGE_0_5,
    AGE_5_17,
    AGE_18_GREATER,
    BIO_AGE_5_17,
    BIO_AGE_17_PLUS,
    DEMO_AGE_5_17,
    DEMO_AGE_17_PLUS,
];
