//! Core traits for the RRset engine
//!
//! - [`RrsetStore`]: Persistent RRset storage
//! - [`ZoneSync`]: Downstream propagation of committed changes

pub mod store;
pub mod zone_sync;

pub use store::RrsetStore;
pub use zone_sync::{AppliedChange, TracingZoneSync, ZoneChange, ZoneSync};
