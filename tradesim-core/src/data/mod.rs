//! Dataset ingestion contract and one-shot validation.

pub mod dataset;
pub mod validate;

pub use dataset::{Dataset, RawDataset};
pub use validate::{validate_dataset, DataValidationError};
