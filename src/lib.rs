//! tiercache - a two-tier read-through cache for path-addressed data
//!
//! This library provides the data tier of an interactive application:
//! - Near-instant reads from an in-process ephemeral tier
//! - Single-flight coalescing of concurrent fetches per key
//! - A best-effort durable tier that survives process restarts
//! - Per-key subscriptions with replay of the current value
//! - Progressive "critical-then-background" loading
//!
//! # Example
//!
//! ```ignore
//! use tiercache::{CacheBuilder, MemoryDurableStore, ProgressiveLoader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     // The fetcher is the authoritative remote source.
//!     let fetcher = Arc::new(|path: String| async move {
//!         api.read_document(&path).await
//!     });
//!
//!     let cache = CacheBuilder::new(fetcher)
//!         .durable_store(Arc::new(MemoryDurableStore::new()))
//!         .build();
//!
//!     // Reads coalesce: concurrent demand for one key fetches once.
//!     let employees = cache.get("hr/employees").await.unwrap();
//!
//!     // Observers hear every successful fetch, starting with the
//!     // current value.
//!     let sub = cache.subscribe("hr/employees", |payload| {
//!         render(payload);
//!     });
//!
//!     // Critical keys first, the rest in the background.
//!     let loader = ProgressiveLoader::new(
//!         cache.clone(),
//!         &["hr/employees", "hr/shifts"],
//!         &["reports/weekly", "reports/monthly"],
//!     );
//!     let critical = loader.load().await.unwrap();
//!
//!     sub.unsubscribe();
//! }
//! ```

mod builder;
mod cache;
mod config;
mod durable;
mod entry;
mod error;
mod fetcher;
mod loader;
pub mod stores;
mod subscription;
mod utils;

// Re-export public API
pub use builder::CacheBuilder;
pub use cache::{CacheStats, TieredCache};
pub use config::CacheConfig;
pub use durable::{DurableError, DurableStore};
pub use entry::{CacheEntry, DurableRecord, SCHEMA_VERSION};
pub use error::CacheError;
pub use fetcher::RemoteFetcher;
pub use loader::{LoadPhase, ProgressiveLoader};
pub use stores::memory::MemoryDurableStore;
pub use stores::redis::{RedisDurableStore, RedisDurableStoreConfig};
pub use subscription::Subscription;
pub use utils::normalize_path;
