//! Storage layer interface
//!
//! The persistent store is an external collaborator: this module defines
//! the contract the core calls plus an in-memory reference backend. Handles
//! are constructed by the caller and injected where needed; there is no
//! process-wide storage singleton.

mod memory;
mod traits;

pub use memory::MemoryStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::sync::{Arc, Mutex};

/// Shared storage handle injected into the tracker and scheduler
pub type StorageHandle = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a backend into a shareable handle
pub fn shared<S: Storage + Send + 'static>(storage: S) -> StorageHandle {
    Arc::new(Mutex::new(storage))
}
