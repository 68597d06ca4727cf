//! Namespaced shared memory for Maestro workflow runs.

pub mod store;

pub use store::{shared, MemoryStore, NamespaceWriter, SharedMemory};
