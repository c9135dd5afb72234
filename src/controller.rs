//! # Search-and-cache controller
//!
//! [`SearchController`] owns the current result list and the artwork cache and
//! is the only thing that mutates them. Every network completion re-enters
//! through the controller's state mutex, so list and cache see a single
//! writer at a time; the lock is never held across an `.await`.
//!
//! Each list replacement or clear bumps a generation counter. Artwork fetches
//! carry the generation they were issued under, and a completion whose
//! generation no longer matches is discarded. Searches carry a sequence
//! number so that only the most recently issued search can replace the list.

use crate::api::{CatalogClient, CatalogClientImpl};
use crate::cache::{ArtworkCache, CacheStats};
use crate::types::{
    Artwork, CacheClearReason, ControllerConfig, ControllerEvent, ControllerEventReceiver,
    EventBroadcaster, FailedOperation, FailureRecord, ResultItem, Row, RowImage,
};
use crate::{CatalogError, Result};
use http_client::HttpClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What happened to the list after a search completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The results replaced the list.
    Applied {
        /// Generation of the new list
        generation: u64,
        /// Number of items in the new list
        count: usize,
    },
    /// A newer search was issued while this one was in flight; its results
    /// were dropped.
    Superseded,
}

/// Rows waiting on one artwork download.
#[derive(Debug)]
struct PendingFetch {
    generation: u64,
    indices: Vec<usize>,
}

#[derive(Debug)]
struct ControllerState {
    items: Vec<ResultItem>,
    cache: ArtworkCache,
    generation: u64,
    search_seq: u64,
    in_flight: HashMap<String, PendingFetch>,
    last_query: Option<String>,
    last_error: Option<FailureRecord>,
}

impl ControllerState {
    fn record_failure(&mut self, operation: FailedOperation, error: CatalogError) {
        self.last_error = Some(FailureRecord {
            operation,
            error,
            at: chrono::Utc::now(),
        });
    }
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Searches the catalog, holds the results and serves rows with lazily
/// fetched, cached artwork.
///
/// Clones share the same state and event stream.
///
/// # Examples
///
/// ```rust,no_run
/// use catalog_browse::{ControllerConfig, ControllerEvent, SearchController};
///
/// #[tokio::main]
/// async fn main() -> catalog_browse::Result<()> {
///     let http_client = http_client::native::NativeClient::new();
///     let controller =
///         SearchController::with_http_client(Box::new(http_client), ControllerConfig::default());
///     let mut events = controller.subscribe();
///
///     controller.clear_and_research("books").await?;
///
///     // First request schedules the download and returns a placeholder
///     let row = controller.row(0).expect("at least one result");
///     assert!(row.image.is_placeholder());
///
///     while let Ok(event) = events.recv().await {
///         if let ControllerEvent::RowUpdated { index: 0, .. } = event {
///             break;
///         }
///     }
///     assert!(!controller.row(0).unwrap().image.is_placeholder());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SearchController {
    client: Arc<dyn CatalogClient>,
    config: ControllerConfig,
    state: Arc<Mutex<ControllerState>>,
    broadcaster: EventBroadcaster<ControllerEvent>,
}

impl SearchController {
    pub fn new(client: Arc<dyn CatalogClient>, config: ControllerConfig) -> Self {
        let state = ControllerState {
            items: Vec::new(),
            cache: ArtworkCache::new(config.cache_capacity),
            generation: 0,
            search_seq: 0,
            in_flight: HashMap::new(),
            last_query: None,
            last_error: None,
        };

        Self {
            client,
            config,
            state: Arc::new(Mutex::new(state)),
            broadcaster: EventBroadcaster::new(),
        }
    }

    /// Build a controller over a [`CatalogClientImpl`] using `client` for HTTP.
    pub fn with_http_client(
        client: Box<dyn HttpClient + Send + Sync>,
        config: ControllerConfig,
    ) -> Self {
        let catalog = CatalogClientImpl::new(client, config.clone());
        Self::new(Arc::new(catalog), config)
    }

    /// Search the catalog and, on success, replace the result list.
    ///
    /// The artwork cache is kept: it is keyed by URL, so entries remain valid
    /// for the new list. On failure the previous list stays in place, the
    /// error is recorded in [`last_error`](Self::last_error) and a
    /// [`ControllerEvent::SearchFailed`] is emitted.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let seq = {
            let mut state = lock(&self.state);
            state.search_seq += 1;
            state.last_query = Some(query.to_string());
            state.search_seq
        };

        log::debug!("Searching catalog for {query:?} (search #{seq})");
        let result = self.client.search(query).await;

        match result {
            Ok(items) => {
                let (generation, count) = {
                    let mut state = lock(&self.state);
                    if state.search_seq != seq {
                        log::debug!(
                            "Dropping results for {query:?}: search #{} superseded it",
                            state.search_seq
                        );
                        return Ok(SearchOutcome::Superseded);
                    }
                    state.items = items;
                    state.generation += 1;
                    state.in_flight.clear();
                    state.last_error = None;
                    (state.generation, state.items.len())
                };

                log::info!("Search {query:?} returned {count} results (generation {generation})");
                self.broadcaster
                    .broadcast_event(ControllerEvent::DataUpdated { generation, count });
                Ok(SearchOutcome::Applied { generation, count })
            }
            Err(e) => {
                log::warn!("Search {query:?} failed: {e}");
                let current = {
                    let mut state = lock(&self.state);
                    let current = state.search_seq == seq;
                    if current {
                        state.record_failure(FailedOperation::Search, e.clone());
                    }
                    current
                };
                if current {
                    self.broadcaster
                        .broadcast_event(ControllerEvent::SearchFailed {
                            query: query.to_string(),
                            error: e.to_string(),
                        });
                }
                Err(e)
            }
        }
    }

    /// Clear list and cache, then search again with the last query, or the
    /// configured placeholder query if nothing has been searched yet.
    pub async fn refresh(&self) -> Result<SearchOutcome> {
        let query = self.reset(CacheClearReason::Refresh);
        let query = query.unwrap_or_else(|| self.config.placeholder_query.clone());
        self.search(&query).await
    }

    /// Clear list and cache, then search for `query`.
    pub async fn clear_and_research(&self, query: &str) -> Result<SearchOutcome> {
        self.reset(CacheClearReason::NewSearch);
        self.search(query).await
    }

    /// Empty the list and the cache under a new generation. Returns the last
    /// query so `refresh` can reuse it.
    fn reset(&self, reason: CacheClearReason) -> Option<String> {
        let (generation, last_query) = {
            let mut state = lock(&self.state);
            state.items.clear();
            state.cache.clear();
            state.in_flight.clear();
            state.generation += 1;
            (state.generation, state.last_query.clone())
        };

        log::debug!("Cleared results and artwork ({reason:?}), generation {generation}");
        self.broadcaster
            .broadcast_event(ControllerEvent::CacheCleared { reason });
        self.broadcaster
            .broadcast_event(ControllerEvent::DataUpdated {
                generation,
                count: 0,
            });
        last_query
    }

    /// Row data for `index`, or `None` past the end of the list.
    ///
    /// When the item's artwork is not cached this returns a placeholder and
    /// starts a download unless one for the same artwork is already running
    /// under the current generation. A [`ControllerEvent::RowUpdated`] follows
    /// once the artwork is cached.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn row(&self, index: usize) -> Option<Row> {
        let (title, url, generation) = {
            let mut state = lock(&self.state);
            let item = state.items.get(index)?;
            let title = item.track_name.clone();
            let url = item.artwork_url.clone();

            if let Some(artwork) = state.cache.get(&url) {
                return Some(Row {
                    index,
                    title,
                    image: RowImage::Cached(artwork),
                });
            }

            let generation = state.generation;
            let already_pending = match state.in_flight.get_mut(&url) {
                Some(pending) if pending.generation == generation => {
                    if !pending.indices.contains(&index) {
                        pending.indices.push(index);
                    }
                    true
                }
                _ => false,
            };
            if already_pending {
                return Some(Row {
                    index,
                    title,
                    image: RowImage::Placeholder,
                });
            }

            state.in_flight.insert(
                url.clone(),
                PendingFetch {
                    generation,
                    indices: vec![index],
                },
            );
            (title, url, generation)
        };

        self.spawn_artwork_fetch(index, url, generation);

        Some(Row {
            index,
            title,
            image: RowImage::Placeholder,
        })
    }

    fn spawn_artwork_fetch(&self, index: usize, url: String, generation: u64) {
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let broadcaster = self.broadcaster.clone();

        log::debug!("Fetching artwork for row {index} (generation {generation}): {url}");
        tokio::spawn(async move {
            let result = client.fetch_artwork(&url).await;
            complete_artwork_fetch(&state, &broadcaster, index, &url, generation, result);
        });
    }

    /// Drop all cached artwork; the result list is kept.
    pub fn on_memory_pressure(&self) {
        let dropped = {
            let mut state = lock(&self.state);
            let dropped = state.cache.len();
            state.cache.clear();
            dropped
        };

        log::info!("Memory pressure: dropped {dropped} cached artworks");
        self.broadcaster
            .broadcast_event(ControllerEvent::CacheCleared {
                reason: CacheClearReason::MemoryPressure,
            });
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).items.is_empty()
    }

    /// Snapshot of the current result list.
    pub fn items(&self) -> Vec<ResultItem> {
        lock(&self.state).items.clone()
    }

    pub fn item(&self, index: usize) -> Option<ResultItem> {
        lock(&self.state).items.get(index).cloned()
    }

    /// Generation of the current list.
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    pub fn cached_artwork_count(&self) -> usize {
        lock(&self.state).cache.len()
    }

    /// Cached artwork for `url` without affecting recency or statistics.
    pub fn is_artwork_cached(&self, url: &str) -> bool {
        lock(&self.state).cache.contains(url)
    }

    pub fn cache_stats(&self) -> CacheStats {
        lock(&self.state).cache.stats()
    }

    pub fn last_query(&self) -> Option<String> {
        lock(&self.state).last_query.clone()
    }

    /// The most recent failure, cleared by the next successful search.
    pub fn last_error(&self) -> Option<FailureRecord> {
        lock(&self.state).last_error.clone()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> ControllerEventReceiver {
        self.broadcaster.subscribe()
    }

    pub fn latest_event(&self) -> Option<ControllerEvent> {
        self.broadcaster.latest_event()
    }
}

impl std::fmt::Debug for SearchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchController")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}

/// Apply a finished artwork download if it still belongs to the current list.
fn complete_artwork_fetch(
    state: &Mutex<ControllerState>,
    broadcaster: &EventBroadcaster<ControllerEvent>,
    index: usize,
    url: &str,
    generation: u64,
    result: Result<Artwork>,
) {
    let indices = {
        let mut state = lock(state);
        if state.generation != generation {
            log::debug!(
                "Discarding artwork for row {index}: fetched under generation {generation}, list is at {}",
                state.generation
            );
            return;
        }

        let indices = match state.in_flight.remove(url) {
            Some(pending) if pending.generation == generation => pending.indices,
            _ => vec![index],
        };

        match &result {
            Ok(artwork) => state.cache.insert(artwork.clone()),
            Err(e) => state.record_failure(FailedOperation::Artwork, e.clone()),
        }
        indices
    };

    match result {
        Ok(_) => {
            for index in indices {
                broadcaster.broadcast_event(ControllerEvent::RowUpdated { generation, index });
            }
        }
        Err(e) => {
            log::warn!("Artwork fetch for row {index} failed: {e}");
            for index in indices {
                broadcaster.broadcast_event(ControllerEvent::ArtworkFailed {
                    index,
                    url: url.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}
