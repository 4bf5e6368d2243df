//! Three-click perspective calibration and its durable storage.

mod error;
mod record;
mod repository;
mod store;

pub use error::{CalibrationError, StorageError};
pub use record::{CalibrationRecord, CalibrationRow};
pub use repository::{CalibrationRepository, InMemoryRepository, JsonFileRepository};
pub use store::{CalibrationParams, CalibrationStore};
