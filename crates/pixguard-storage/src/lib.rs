//! Pixguard Storage Library
//!
//! Retrieval of uploaded objects from the content store, plus the optional
//! secondary document store validation results are mirrored into.
//!
//! # Object addressing
//!
//! Every inbound message names a `bucket` and a `key`. The S3 backend maps
//! them onto the bucket and object path directly; the local backend resolves
//! them to `{root}/{bucket}/{key}`. Keys must not contain `..` or a leading
//! `/`; validation is centralized in the `keys` module so both backends agree.
//!
//! Objects are buffered whole in memory. The configured size cap is the only
//! bound on how large a supported object may be.

#[cfg(feature = "storage-s3")]
pub mod documents;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "storage-s3")]
pub use documents::{DocumentError, DocumentStore, ObjectStoreDocuments};
#[cfg(feature = "storage-s3")]
pub use factory::create_document_store;
pub use factory::create_fetcher;
#[cfg(feature = "storage-local")]
pub use local::LocalFetcher;
pub use pixguard_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Fetcher;
pub use traits::{ContentFetcher, FetchError, FetchResult};
