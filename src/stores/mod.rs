//! Durable store adapters.

pub mod memory;
pub mod redis;

pub use memory::MemoryDurableStore;
pub use redis::{RedisDurableStore, RedisDurableStoreConfig};
