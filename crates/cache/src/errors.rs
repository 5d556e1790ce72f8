//! Error handling for the cache engine
//!
//! Every error carries a [`RecoveryHint`]. Validation errors are raised
//! before any I/O; corruption never escapes the read paths because corrupt
//! entries are treated as absent and removed.

mod conversions;
mod display;
mod recovery;
mod types;

pub use types::*;
