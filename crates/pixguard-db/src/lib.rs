//! Pixguard DB Library
//!
//! Persistence of validation outcomes: the `image_validation_result`
//! repository, the result store that pairs it with the optional document
//! store, and pool/migration setup.

pub mod repository;
pub mod result_store;
pub mod setup;

pub use repository::{ValidationRecordWriter, ValidationResultRepository};
pub use result_store::{DualWriteResultStore, ImageSummary, ResultStore, StoreError};
pub use setup::setup_database;
