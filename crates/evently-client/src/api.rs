//! Typed endpoint surface.
//!
//! [`EventsClient`] owns the session manager and the events cache. Reads go
//! through the cache (and so coalesce); every mutation that succeeds
//! invalidates the cache so the next read refetches. Failures are
//! classified here: read paths surface [`Error::LoadFailed`], mutation
//! paths [`Error::MutationFailed`], and auth teardown always surfaces as
//! [`Error::AuthExpired`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use tracing::debug;

use evently_types::{DeleteConfirmation, Event, EventDraft};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::query::cache::{CacheStats, CollectionCache, QueryIdentity};
use crate::query::view::{CollectionSource, EVENTS_RESOURCE, EventListView};
use crate::request::{Part, RequestDescriptor};
use crate::session::store::{MemoryTokenStore, TokenStore};
use crate::session::SessionManager;

/// High-level client for the event-management API.
///
/// Cheap to clone; clones share the session and the cache.
#[derive(Clone)]
pub struct EventsClient {
    config: ClientConfig,
    session: Arc<SessionManager>,
    cache: Arc<CollectionCache<Event>>,
}

impl EventsClient {
    /// Build a client with in-memory token storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unusable base URL.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryTokenStore::default())).await
    }

    /// Build a client with a caller-provided token store, restoring any
    /// persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unusable base URL.
    pub async fn with_store(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let session = SessionManager::new(&config, store).await?;
        Ok(Self {
            config,
            session: Arc::new(session),
            cache: Arc::new(CollectionCache::new()),
        })
    }

    /// The session manager, for state subscriptions and direct access.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// A list view wired to this client's cache and configuration.
    #[must_use]
    pub fn event_list_view(&self) -> EventListView {
        EventListView::new(
            Arc::new(self.clone()),
            self.config.page_size,
            self.config.debounce,
        )
    }

    /// Establish a session. See [`SessionManager::login`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationFailed`] when the credentials are rejected.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.session.login(email, password).await
    }

    /// Create an account. See [`SessionManager::register`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationFailed`] when the registration is rejected.
    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        self.session.register(email, password).await
    }

    /// Drop the session.
    pub async fn logout(&self) {
        self.session.logout().await;
    }

    /// Cached, coalesced read of one collection page.
    ///
    /// `filter` must be a settled value: it becomes part of cache identity.
    ///
    /// # Errors
    ///
    /// [`Error::LoadFailed`] for non-auth failures, [`Error::AuthExpired`]
    /// when the session could not be recovered.
    pub async fn events_page(&self, filter: &str, page: usize) -> Result<Arc<[Event]>> {
        let identity = QueryIdentity::new(EVENTS_RESOURCE, filter, page);
        self.load_page(&identity).await
    }

    /// Uncached single-record read.
    ///
    /// # Errors
    ///
    /// [`Error::LoadFailed`] for non-auth failures, [`Error::AuthExpired`]
    /// when the session could not be recovered.
    pub async fn event_details(&self, id: u64) -> Result<Event> {
        let request = RequestDescriptor::get(format!("/events/{id}"));
        self.read(&request).await
    }

    /// Create an event from a draft (multipart).
    ///
    /// Invalidates the events cache on success.
    ///
    /// # Errors
    ///
    /// [`Error::MutationFailed`] on rejection; the cache is untouched then.
    pub async fn create_event(&self, draft: &EventDraft) -> Result<Event> {
        let request = RequestDescriptor::post("/events").multipart(draft_parts(draft));
        let created: Event = self.mutate(&request).await?;
        self.invalidate_events().await;
        Ok(created)
    }

    /// Update an event from a draft (multipart).
    ///
    /// Invalidates the events cache on success.
    ///
    /// # Errors
    ///
    /// [`Error::MutationFailed`] on rejection; the cache is untouched then.
    pub async fn update_event(&self, id: u64, draft: &EventDraft) -> Result<Event> {
        let request =
            RequestDescriptor::patch(format!("/events/{id}")).multipart(draft_parts(draft));
        let updated: Event = self.mutate(&request).await?;
        self.invalidate_events().await;
        Ok(updated)
    }

    /// Delete an event, confirming with the re-entered password.
    ///
    /// Invalidates the events cache on success. Pagination adjustment after
    /// a delete is the view's concern; see [`EventListView::delete`].
    ///
    /// # Errors
    ///
    /// [`Error::MutationFailed`] on rejection; the cache is untouched then.
    pub async fn delete_event(&self, id: u64, password: &str) -> Result<()> {
        let outcome: Result<()> = async {
            let request = RequestDescriptor::delete(format!("/events/{id}")).json(
                &DeleteConfirmation {
                    password: password.to_owned(),
                },
            )?;
            let response = self.session.dispatch(&request).await?;
            if !response.status().is_success() {
                return Err(Error::from_response(response).await);
            }
            Ok(())
        }
        .await;
        outcome.map_err(Error::into_mutation_failed)?;
        self.invalidate_events().await;
        Ok(())
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn load_page(&self, identity: &QueryIdentity) -> Result<Arc<[Event]>> {
        let page = self
            .cache
            .get_or_fetch(identity, || async {
                let request = RequestDescriptor::get("/events")
                    .query("filter", identity.filter.clone())
                    .query("page", identity.page.to_string());
                let response = self.session.dispatch(&request).await?;
                if !response.status().is_success() {
                    return Err(Error::from_response(response).await);
                }
                Ok(response.json::<Vec<Event>>().await?)
            })
            .await
            .map_err(Error::into_load_failed)?;
        Ok(page.records)
    }

    async fn read<T: DeserializeOwned>(&self, request: &RequestDescriptor) -> Result<T> {
        let outcome: Result<T> = async {
            let response = self.session.dispatch(request).await?;
            if !response.status().is_success() {
                return Err(Error::from_response(response).await);
            }
            Ok(response.json().await?)
        }
        .await;
        outcome.map_err(Error::into_load_failed)
    }

    async fn mutate<T: DeserializeOwned>(&self, request: &RequestDescriptor) -> Result<T> {
        let outcome: Result<T> = async {
            let response = self.session.dispatch(request).await?;
            if !response.status().is_success() {
                return Err(Error::from_response(response).await);
            }
            Ok(response.json().await?)
        }
        .await;
        outcome.map_err(Error::into_mutation_failed)
    }

    async fn invalidate_events(&self) {
        debug!("mutation succeeded, invalidating events cache");
        self.cache.invalidate(EVENTS_RESOURCE).await;
    }
}

#[async_trait]
impl CollectionSource for EventsClient {
    async fn fetch_page(&self, identity: &QueryIdentity) -> Result<Arc<[Event]>> {
        self.load_page(identity).await
    }

    async fn delete(&self, id: u64, password: &str) -> Result<()> {
        self.delete_event(id, password).await
    }
}

/// Flatten a draft into multipart parts; dates travel as ISO 8601 strings
/// and the optional thumbnail as a file part named `thumbnail`.
fn draft_parts(draft: &EventDraft) -> Vec<Part> {
    let mut parts = vec![
        Part::text("name", draft.name.clone()),
        Part::text(
            "startDate",
            draft.start_date.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        Part::text(
            "endDate",
            draft.end_date.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        Part::text("location", draft.location.clone()),
    ];
    if let Some(thumbnail) = &draft.thumbnail {
        parts.push(Part::file(
            "thumbnail",
            thumbnail.file_name.clone(),
            thumbnail.mime_type.clone(),
            thumbnail.bytes.clone(),
        ));
    }
    parts
}
