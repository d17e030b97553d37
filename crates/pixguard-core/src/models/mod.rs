//! Data models for the worker
//!
//! One sub-module per entity a message passes through: the parsed inbound
//! request, the merged validation outcome, the persisted record and the
//! outbound result event.

mod event;
mod outcome;
mod record;
mod request;

// Re-export all models for convenient imports
pub use event::*;
pub use outcome::*;
pub use record::*;
pub use request::*;
