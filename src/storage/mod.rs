//! Embedded storage engine
//!
//! Collections with B-tree indexes and validators, held in memory and
//! served through the `DocumentStore` trait by `MemoryStore`.

pub mod collection;
pub mod index;
mod memory;

pub use memory::MemoryStore;
