pub mod error;
pub mod feedback;
pub mod feedforward;
pub mod filtering;
pub mod manager;
pub mod ols;
pub mod schema;
pub mod trackwidth;
pub mod types;

pub use error::{Error, Result};
pub use manager::AnalysisManager;
pub use types::{AnalysisType, Gains, Settings};
