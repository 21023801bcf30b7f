//! # auditchain store
//!
//! Persistence contract for the audit ledger. Provides a trait-based interface
//! for event, checkpoint and anchor storage with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests, with tampering hooks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use auditchain_store::{LedgerStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!     let head = store.get_head().await.unwrap();
//!     println!("chain at seq {}", head.last_seq);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Compare-and-swap append**: an event is only inserted if the head is
//!   still the one it was built on; otherwise `HeadMoved` is returned.
//! - **Append-only**: there are no update or delete operations.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{LedgerStore, StoreExt};
