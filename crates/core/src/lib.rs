//! Domain model of a project import: backup entities, id mappers, automatic
//! mapping, validation, results and progress.
//!
//! Everything here is synchronous and free of I/O. The pipeline crate drives
//! it from the backup file and the target store.

pub mod automap;
pub mod backup;
pub mod catalog;
pub mod error;
pub mod external;
pub mod i18n;
pub mod mapper;
pub mod message;
pub mod options;
pub mod progress;
pub mod results;
pub mod types;
pub mod validation;
