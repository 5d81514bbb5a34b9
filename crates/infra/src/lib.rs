//! `registra-infra`: storage, sessions, and the snapshot query engine.
//!
//! Everything stateful lives here: the record store (memory and Postgres),
//! the mutation executors, the live-token store behind the Token Service,
//! and the Consistency Oracle's query engine with its two `SnapshotReader`
//! adapters (in-process and HTTP).

pub mod executor;
pub mod readers;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod token_store;

pub use readers::{HttpSnapshotReader, StoreSnapshotReader};
pub use session::{spawn_sweeper, LoginOutcome, SessionService, SWEEP_PERIOD};
pub use snapshot::{ReadQuery, SnapshotService};
pub use store::{MemoryStore, PgStore, RecordStore, StoreError};
pub use token_store::{MemoryTokenStore, PgTokenStore, TokenRecord, TokenStore};
