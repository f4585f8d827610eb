// # rrset-core
//
// Core library for transactional DNS RRset management.
//
// ## Architecture Overview
//
// This library validates and applies batched changes to the RRsets of a
// DNS zone:
// - **Records**: Pure type policy, subname and record content validation
// - **RrsetStore**: Trait for persistent RRset storage
// - **Reconciler**: Validates whole batches and commits them all-or-nothing
// - **ZoneSync / SyncWorker**: Propagates committed changes downstream
// - **DyndnsMerger**: Maps dynamic DNS check-ins onto apex A/AAAA batches
//
// ## Design Principles
//
// 1. **All or nothing**: A batch with one bad item writes nothing
// 2. **Positional errors**: Rejections carry one error object per input item
// 3. **Canonical comparison**: Records are compared by their wire form
// 4. **Single writer**: Every mutation goes through the reconciler's commit
// 5. **Library-First**: The daemon is a thin shell around this crate

pub mod config;
pub mod dyndns;
pub mod engine;
pub mod error;
pub mod model;
pub mod records;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{DyndnsConfig, EngineConfig, ServiceConfig, StoreConfig};
pub use dyndns::{CheckIn, DyndnsMerger, DyndnsStatus};
pub use engine::{
    ApplyOptions, Batch, BatchOperation, BatchOutcome, BatchShape, BuildBatch, ChangeItem,
    Reconciler, SyncWorker,
};
pub use error::{BatchErrors, Error, ErrorKind, ItemErrors, Result};
pub use model::{Domain, Principal, Rrset, RrsetFilter, RrsetKey, RrsetView};
pub use store::{FileRrsetStore, MemoryRrsetStore, open_store};
pub use traits::{AppliedChange, RrsetStore, TracingZoneSync, ZoneChange, ZoneSync};
