//! Client-side CRUD state and collection caching for REST-style APIs.
//!
//! The crate wires three layers together:
//! - [`RequestState`]: a reducer-driven record of one query's lifecycle
//!   (loading flag, reconciled collection, accumulated errors, CRUD handles)
//! - A layered cache: [`CollectionCache`] instances handed out by a shared
//!   [`CacheContainer`], optionally persisted through a [`PersistentSession`]
//! - [`Resource`]: the stateful handle that mounts a query, spawns CRUD
//!   operations against an injected [`Transport`], and folds results back
//!   into state and cache
//!
//! Request failures are data, not panics: they accumulate in
//! [`RequestState::errors`] and rendering decides what to do with them.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     name: String,
//! }
//!
//! impl Record for User {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//! }
//!
//! let caches = Arc::new(CacheContainer::new());
//! let transport = HttpTransport::new("https://api.example.com")?;
//! let mut users: Resource<User, _> =
//!     Resource::new(ApiQuery::new("users"), transport, caches);
//!
//! loop {
//!     if users.poll() {
//!         // State changed, re-render
//!     }
//! }
//! ```

mod cache;
mod error;
mod http;
mod query;
mod record;
mod resource;
mod state;
mod transport;

pub use cache::{
  CacheContainer, CacheHandle, CollectionCache, MemoryStorage, PersistentSession, SessionOptions,
  SqliteStorage, StorageBackend, StorageScope, DEFAULT_STORAGE_KEY,
};
pub use error::ApiError;
pub use http::HttpTransport;
pub use query::ApiQuery;
pub use record::Record;
pub use resource::Resource;
pub use state::{Action, CrudHandles, OpFn, RefreshFn, RequestState};
pub use transport::{Transport, TransportResult};
