//! Crate-wide error type for the analysis core.

use thiserror::Error;

/// Every failure mode the analysis core can surface to its caller.
///
/// The manager never substitutes defaults on error — callers see these
/// variants verbatim, matching the propagation policy in the pipeline design.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read experiment log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse experiment log: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema mismatch: missing `sysid` tag; run the legacy-schema converter first")]
    SchemaMismatch,

    #[error("unknown analysis type: {0:?}")]
    UnknownAnalysisType(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("OLS normal matrix is singular and cannot be inverted")]
    SingularNormalMatrix,

    #[error("non-physical plant: Kv={kv}, Ka={ka} (both must be > 0)")]
    NonPhysicalPlant { kv: f64, ka: f64 },

    #[error("zero heading change in track-width estimation")]
    ZeroHeadingChange,
}

pub type Result<T> = std::result::Result<T, Error>;
