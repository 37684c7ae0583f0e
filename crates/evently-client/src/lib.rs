//! # evently-client
//!
//! Async client for the evently event-management API: authentication with
//! silent token refresh, and a cached, debounced collection view engine.
//!
//! ## Features
//!
//! - Bearer-token attachment on every protected request
//! - Silent 401 recovery: at most one refresh in flight, all concurrent
//!   callers share its outcome, each original request is replayed once
//! - Token persistence through a pluggable [`TokenStore`]
//! - Session transitions published on a watch channel (no storage polling)
//! - Collection pages cached by query identity with in-flight coalescing
//! - Debounced filter commits, stable multi-key sorting, clamped pagination
//! - Stale responses discarded when the query has moved on
//!
//! ## Architecture
//!
//! ```text
//! Application / UI layer
//!        ↓
//! EventListView (query engine: debounce, sort, paginate)
//!        ↓
//! EventsClient (typed endpoints + CollectionCache)
//!        ↓
//! SessionManager (token, refresh, replay)
//!        ↓
//! reqwest (HTTP, cookie jar)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evently_client::{ClientConfig, EventsClient, SortKey};
//!
//! # async fn example() -> evently_client::Result<()> {
//! let client = EventsClient::new(ClientConfig::default()).await?;
//! client.login("organizer@example.com", "secret").await?;
//!
//! let view = client.event_list_view();
//! view.set_filter_input("rust").await; // commits after the quiet period
//! view.toggle_sort(SortKey::StartDate).await;
//! view.refresh().await;
//!
//! for event in view.snapshot().await.rows {
//!     println!("{} @ {}", event.name, event.location);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod query;
pub mod request;
pub mod session;

pub use api::EventsClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use query::cache::{CacheStats, CachedPage, CollectionCache, QueryIdentity};
pub use query::view::{
    CollectionSource, EventListView, SortDirection, SortKey, ViewSnapshot, paginate, sort_events,
};
pub use session::store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use session::{SessionManager, SessionState};

// The wire types are part of this crate's API surface.
pub use evently_types as types;
