//! Local domain model
//!
//! - `types`: facility, status and session records and their identities
//! - `record`: stream-agnostic `Record` wrapper used by the engine
//! - `source`: read access to the current local state

pub mod types;
pub mod record;
pub mod source;

pub use types::*;
pub use record::{Record, StreamKind};
pub use source::{InMemorySource, LocalSource};
