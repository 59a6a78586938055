//! swr-resource - a cancelable stale-while-revalidate resource cache
//!
//! This library provides the data-fetching layer backend-bound reads funnel
//! through:
//! - Stale-while-revalidate (SWR) semantics with per-entry TTL
//! - Deduplication of concurrent fetches per logical key
//! - Generation-gated commits: a superseded fetch can never corrupt state
//! - Subscription handles exposing `{data, error, is_loading}` + `mutate`
//! - Optional fixed-interval refresh and focus revalidation
//!
//! # Example
//!
//! ```ignore
//! use swr_resource::{ResourceCache, ResourceOptions, FetchError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache: ResourceCache<String> = ResourceCache::in_memory();
//!
//!     let mut user = cache
//!         .subscribe(
//!             Some("user:123"),
//!             |key, _cancel| async move {
//!                 // Load from the backend - 'key' is "user:123"
//!                 Ok(format!("User data for {}", key))
//!             },
//!             ResourceOptions {
//!                 ttl: Some(Duration::from_secs(60)),
//!                 ..Default::default()
//!             },
//!         )
//!         .await;
//!
//!     let state = user.settled().await;
//!     println!("{:?}", state.data);
//!
//!     // Force the next read to reflect server state after a write.
//!     user.mutate().await;
//! }
//! ```

mod entry;
mod error;
mod generation;
mod orchestrator;
mod resource;
mod store;
pub mod stores;
mod utils;

// Re-export public API
pub use entry::Entry;
pub use error::{FetchError, StoreError};
pub use generation::CancelSignal;
pub use resource::{ResourceCache, ResourceHandle, ResourceOptions, ResourceState};
pub use store::Store;
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use utils::resource_key;
