//! MEMO Storage - the store contract and its backends.
//!
//! The engine talks to storage only through [`Store`]. Two backends ship
//! here:
//!
//! - [`LmdbStore`]: persistent, memory-mapped storage via heed
//! - [`InMemoryStore`]: process-local, for tests and development

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbStore, StoredEntry, MAX_INLINE_KEY_LEN};
pub use memory::InMemoryStore;
pub use traits::Store;
