//! Run and transformation persistence for Scrivener.
//!
//! Two backends implement [`RunStore`] and [`TransformationStore`]:
//! [`MemoryStore`] for tests and throwaway runs, and [`SqliteStore`] for a
//! durable audit trail. Both apply every run mutation through the transition
//! methods on [`scrivener_types::TransformationRun`].

mod error;
mod memory;
mod sqlite;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{RunStore, TransformationStore};
