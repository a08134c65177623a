//! Persistence for rent tracking.
//!
//! - [`LedgerStore`]: append-only ledger with per-payer aggregation
//!   ([`PgLedgerStore`] for PostgreSQL, [`MemoryLedgerStore`] in-process)
//! - [`IdentityStore`]: payer identity records ([`JsonFileIdentityStore`])

pub mod error;
pub mod identity;
pub mod ledger;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use identity::{IdentityError, IdentityStore, JsonFileIdentityStore, MemoryIdentityStore};
pub use ledger::{with_deadline, LedgerStore};
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;
