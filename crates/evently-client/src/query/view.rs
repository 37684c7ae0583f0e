//! The event-list view engine.
//!
//! Holds the query state the UI mutates (filter keystrokes, page and sort
//! changes), fetches pages through the coalescing cache, and exposes a
//! render snapshot. Keystrokes are debounced before they become the settled
//! filter that participates in cache identity; a response that arrives for
//! a query the view has already moved past is discarded.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use evently_types::Event;

use crate::error::Result;
use crate::query::cache::QueryIdentity;

/// Resource segment of every identity this view derives.
pub(crate) const EVENTS_RESOURCE: &str = "events";

/// Supplies collection pages and deletions to a view.
///
/// Implemented by [`EventsClient`](crate::EventsClient); tests substitute a
/// scripted source.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Fetch (or serve from cache) the page for `identity`.
    async fn fetch_page(&self, identity: &QueryIdentity) -> Result<Arc<[Event]>>;

    /// Delete one record, confirming with the re-entered password.
    async fn delete(&self, id: u64, password: &str) -> Result<()>;
}

/// Column to order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Event name, lexicographic.
    Name,
    /// Start date, chronological.
    StartDate,
    /// End date, chronological.
    EndDate,
    /// Location, lexicographic.
    Location,
    /// Lifecycle status, ongoing first.
    Status,
}

/// Direction of the active sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest key first.
    Ascending,
    /// Largest key first.
    Descending,
}

impl SortDirection {
    fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// Everything the render layer needs for one frame.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    /// Raw filter text, echoed back immediately on every keystroke.
    pub filter_input: String,
    /// Settled (debounced) filter the current rows were fetched under.
    pub filter: String,
    /// Requested page index; `rows` reflects the clamped position.
    pub page_index: usize,
    /// Rows per page.
    pub page_size: usize,
    /// Active sort, if any.
    pub sort: Option<(SortKey, SortDirection)>,
    /// The visible page slice, sorted.
    pub rows: Vec<Event>,
    /// Size of the whole cached collection for this query.
    pub total: usize,
    /// Message of the last failed fetch, cleared by the next success.
    pub error: Option<String>,
}

#[derive(Debug)]
struct ViewState {
    filter_input: String,
    filter: String,
    page_index: usize,
    page_size: usize,
    sort: Option<(SortKey, SortDirection)>,
    rows: Arc<[Event]>,
    error: Option<String>,
}

struct ViewInner {
    source: Arc<dyn CollectionSource>,
    state: RwLock<ViewState>,
    debounce: Duration,
    /// The armed debounce timer; replaced (and the old one aborted) on
    /// every keystroke.
    timer: Mutex<Option<JoinHandle<()>>>,
    changed: watch::Sender<u64>,
}

/// A filtered, sorted, paginated view over the events collection.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventListView {
    inner: Arc<ViewInner>,
}

impl EventListView {
    /// A view over `source`, starting unfiltered on page 0.
    #[must_use]
    pub fn new(source: Arc<dyn CollectionSource>, page_size: usize, debounce: Duration) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(ViewInner {
                source,
                state: RwLock::new(ViewState {
                    filter_input: String::new(),
                    filter: String::new(),
                    page_index: 0,
                    page_size,
                    sort: None,
                    rows: Arc::from(Vec::new()),
                    error: None,
                }),
                debounce,
                timer: Mutex::new(None),
                changed,
            }),
        }
    }

    /// Record a filter keystroke.
    ///
    /// The raw value is visible immediately through
    /// [`snapshot`](Self::snapshot); the settled value only commits after
    /// the quiet period, and every keystroke restarts the timer. Committing
    /// resets the view to page 0 and fetches.
    pub async fn set_filter_input(&self, raw: impl Into<String>) {
        let raw = raw.into();
        {
            let mut state = self.inner.state.write().await;
            state.filter_input = raw.clone();
        }
        self.notify();

        let mut timer = self.inner.timer.lock().await;
        if let Some(armed) = timer.take() {
            armed.abort();
        }
        let view = self.clone();
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(view.inner.debounce).await;
            // Only the quiet period is cancellable. A commit that has
            // started runs to completion in its own task; a newer commit
            // supersedes it through the identity check, not by abort.
            tokio::spawn(async move { view.commit_filter(raw).await });
        }));
    }

    /// Debounce expiry: commit the settled filter and go back to page 0.
    async fn commit_filter(&self, filter: String) {
        {
            let mut state = self.inner.state.write().await;
            if state.filter == filter && state.page_index == 0 {
                return;
            }
            debug!(filter = %filter, "filter settled");
            state.filter = filter;
            state.page_index = 0;
        }
        self.notify();
        self.refresh().await;
    }

    /// Re-derive the current identity and fetch it.
    ///
    /// This is also the manual retry after a failure: the engine never
    /// retries by itself.
    pub async fn refresh(&self) {
        let identity = {
            let state = self.inner.state.read().await;
            Self::identity(&state)
        };
        self.fetch_into_view(identity).await;
    }

    /// Fetch `identity` and install the result, unless the view has moved
    /// on to a different identity while the fetch was in flight.
    async fn fetch_into_view(&self, identity: QueryIdentity) {
        let outcome = self.inner.source.fetch_page(&identity).await;
        {
            let mut state = self.inner.state.write().await;
            if Self::identity(&state) != identity {
                debug!(?identity, "discarding stale response");
                return;
            }
            match outcome {
                Ok(records) => {
                    state.rows = records;
                    state.error = None;
                }
                Err(error) => {
                    warn!(%error, ?identity, "collection fetch failed");
                    state.error = Some(error.to_string());
                }
            }
        }
        self.notify();
    }

    /// Move to `page`. The page index is part of cache identity, so this
    /// refetches (or re-serves from cache).
    pub async fn set_page(&self, page_index: usize) {
        {
            let mut state = self.inner.state.write().await;
            state.page_index = page_index;
        }
        self.notify();
        self.refresh().await;
    }

    /// Change rows-per-page and reset to the first page. A client-side
    /// concern: the cache is untouched.
    pub async fn set_page_size(&self, page_size: usize) {
        {
            let mut state = self.inner.state.write().await;
            if page_size > 0 {
                state.page_size = page_size;
            }
            state.page_index = 0;
        }
        self.notify();
        self.refresh().await;
    }

    /// Cycle the sort state for `key`: a new key sorts ascending, the same
    /// key flips direction. Pure view concern, no fetch.
    pub async fn toggle_sort(&self, key: SortKey) {
        {
            let mut state = self.inner.state.write().await;
            state.sort = match state.sort {
                Some((current, direction)) if current == key => Some((key, direction.flipped())),
                _ => Some((key, SortDirection::Ascending)),
            };
        }
        self.notify();
    }

    /// Delete `id` after the caller re-confirmed with `password`.
    ///
    /// The source invalidates its cache on success, so the refetch below
    /// sees fresh data. If that leaves the requested page past the end of
    /// the shrunken collection and it is not the first page, the view steps
    /// back one page and fetches again.
    ///
    /// # Errors
    ///
    /// Propagates the source's [`MutationFailed`](crate::Error::MutationFailed)
    /// (or [`AuthExpired`](crate::Error::AuthExpired)); the view state is
    /// unchanged on failure.
    pub async fn delete(&self, id: u64, password: &str) -> Result<()> {
        self.inner.source.delete(id, password).await?;
        self.refresh().await;

        let step_back = {
            let state = self.inner.state.read().await;
            state.page_index > 0 && state.page_index > max_page_index(state.rows.len(), state.page_size)
        };
        if step_back {
            let page_index = {
                let mut state = self.inner.state.write().await;
                state.page_index -= 1;
                state.page_index
            };
            debug!(page_index, "page emptied by delete, stepping back");
            self.notify();
            self.refresh().await;
        }
        Ok(())
    }

    /// Assemble the render contract for the current frame.
    pub async fn snapshot(&self) -> ViewSnapshot {
        let state = self.inner.state.read().await;
        let sorted = match state.sort {
            Some((key, direction)) => sort_events(&state.rows, key, direction),
            None => state.rows.to_vec(),
        };
        let (rows, total) = paginate(&sorted, state.page_index, state.page_size);
        ViewSnapshot {
            filter_input: state.filter_input.clone(),
            filter: state.filter.clone(),
            page_index: state.page_index,
            page_size: state.page_size,
            sort: state.sort,
            rows: rows.to_vec(),
            total,
            error: state.error.clone(),
        }
    }

    /// Watch view changes; the value is a change counter.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    fn identity(state: &ViewState) -> QueryIdentity {
        QueryIdentity::new(EVENTS_RESOURCE, state.filter.clone(), state.page_index)
    }

    fn notify(&self) {
        self.inner.changed.send_modify(|n| *n += 1);
    }
}

/// Stable sort by `key`; equal keys keep their fetch order in either
/// direction.
#[must_use]
pub fn sort_events(data: &[Event], key: SortKey, direction: SortDirection) -> Vec<Event> {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| {
        let ordering = compare_by(a, b, key);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    sorted
}

fn compare_by(a: &Event, b: &Event, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.name.cmp(&b.name),
        SortKey::StartDate => a.start_date.cmp(&b.start_date),
        SortKey::EndDate => a.end_date.cmp(&b.end_date),
        SortKey::Location => a.location.cmp(&b.location),
        SortKey::Status => a.status.cmp(&b.status),
    }
}

/// Slice `data` for one page, clamping the page index into range when the
/// collection has shrunk. Returns the slice and the total count.
#[must_use]
pub fn paginate<T>(data: &[T], page_index: usize, page_size: usize) -> (&[T], usize) {
    let total = data.len();
    if total == 0 || page_size == 0 {
        return (&[], total);
    }
    let page = page_index.min(max_page_index(total, page_size));
    let start = page * page_size;
    let end = (start + page_size).min(total);
    (&data[start..end], total)
}

/// Last valid page index for a collection of `total` records.
fn max_page_index(total: usize, page_size: usize) -> usize {
    if total == 0 || page_size == 0 {
        return 0;
    }
    (total - 1) / page_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use evently_types::EventStatus;
    use pretty_assertions::assert_eq;

    fn event(id: u64, name: &str) -> Event {
        Event {
            id,
            name: name.to_string(),
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
            location: "Berlin".to_string(),
            status: EventStatus::Ongoing,
            thumbnail_url: None,
        }
    }

    fn ids(events: &[Event]) -> Vec<u64> {
        events.iter().map(|event| event.id).collect()
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let data = [event(1, "B"), event(2, "A"), event(3, "A")];
        let sorted = sort_events(&data, SortKey::Name, SortDirection::Ascending);
        assert_eq!(ids(&sorted), vec![2, 3, 1]);
    }

    #[test]
    fn descending_sort_keeps_fetch_order_for_ties() {
        let data = [event(1, "A"), event(2, "B"), event(3, "A")];
        let sorted = sort_events(&data, SortKey::Name, SortDirection::Descending);
        assert_eq!(ids(&sorted), vec![2, 1, 3]);
    }

    #[test]
    fn sort_by_date_is_chronological() {
        let mut early = event(1, "x");
        early.start_date = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let late = event(2, "a");
        let sorted = sort_events(
            &[late.clone(), early.clone()],
            SortKey::StartDate,
            SortDirection::Ascending,
        );
        assert_eq!(ids(&sorted), vec![1, 2]);
    }

    #[test]
    fn paginate_slices_and_counts() {
        let data: Vec<u32> = (1..=5).collect();
        let (page, total) = paginate(&data, 1, 2);
        assert_eq!(page, &[3, 4]);
        assert_eq!(total, 5);
    }

    #[test]
    fn paginate_clamps_past_the_end() {
        // 4 records at page size 2: page 2 no longer exists, clamp to 1.
        let data: Vec<u32> = (1..=4).collect();
        let (page, total) = paginate(&data, 2, 2);
        assert_eq!(page, &[3, 4]);
        assert_eq!(total, 4);
    }

    #[test]
    fn paginate_handles_empty_collections() {
        let data: Vec<u32> = Vec::new();
        let (page, total) = paginate(&data, 3, 2);
        assert!(page.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn last_partial_page_is_short() {
        let data: Vec<u32> = (1..=5).collect();
        let (page, _) = paginate(&data, 2, 2);
        assert_eq!(page, &[5]);
    }
}
