//! Data types for catalog search results, artwork and controller operations.
//!
//! This module contains the core data structures used throughout the crate,
//! including result items, artwork, table rows, configuration and the event
//! system shared by the client and the controller.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tokio::sync::{broadcast, watch};

// ================================================================================================
// SEARCH RESULTS
// ================================================================================================

/// One catalog entry returned by a search query.
///
/// Only `track_name` and `artwork_url` are required; the catalog sends many
/// more fields and a handful of useful ones are kept as optional values.
///
/// # Examples
///
/// ```rust
/// use catalog_browse::ResultItem;
///
/// let item: ResultItem = serde_json::from_str(
///     r#"{"trackName": "Kindle", "artworkUrl100": "https://example.com/kindle.png"}"#,
/// ).unwrap();
///
/// assert_eq!(item.track_name, "Kindle");
/// assert_eq!(item.artist_name, None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Display name of the entry
    #[serde(rename = "trackName")]
    pub track_name: String,
    /// 100x100 artwork URL, used for row images
    #[serde(rename = "artworkUrl100")]
    pub artwork_url: String,
    /// Catalog identifier
    #[serde(rename = "trackId", default)]
    pub track_id: Option<u64>,
    /// Publisher or developer name
    #[serde(rename = "artistName", default)]
    pub artist_name: Option<String>,
    /// Bundle identifier for software entities
    #[serde(rename = "bundleId", default)]
    pub bundle_id: Option<String>,
    /// Price as the store formats it ("Free", "$4.99")
    #[serde(rename = "formattedPrice", default)]
    pub formatted_price: Option<String>,
    /// Average user rating, 0 to 5
    #[serde(rename = "averageUserRating", default)]
    pub average_user_rating: Option<f64>,
    /// Store page for the entry
    #[serde(rename = "trackViewUrl", default)]
    pub track_view_url: Option<String>,
    /// Smaller artwork variant
    #[serde(rename = "artworkUrl60", default)]
    pub artwork_url_60: Option<String>,
    /// Larger artwork variant
    #[serde(rename = "artworkUrl512", default)]
    pub artwork_url_512: Option<String>,
}

impl ResultItem {
    /// Create an item with just the required fields.
    pub fn new(track_name: impl Into<String>, artwork_url: impl Into<String>) -> Self {
        Self {
            track_name: track_name.into(),
            artwork_url: artwork_url.into(),
            track_id: None,
            artist_name: None,
            bundle_id: None,
            formatted_price: None,
            average_user_rating: None,
            track_view_url: None,
            artwork_url_60: None,
            artwork_url_512: None,
        }
    }
}

// ================================================================================================
// ARTWORK AND ROWS
// ================================================================================================

/// Artwork bytes that were fetched and confirmed to decode as an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    /// URL the bytes were fetched from
    pub url: String,
    /// Raw encoded image bytes, cheap to clone
    pub bytes: Bytes,
    /// Format sniffed from the bytes
    pub format: image::ImageFormat,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// When the artwork finished downloading
    pub fetched_at: DateTime<Utc>,
}

impl Artwork {
    /// Size of the encoded image in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the encoded payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Image shown for a row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowImage {
    /// Artwork is not cached yet; a fetch has been scheduled or is in flight.
    Placeholder,
    /// Artwork served from the cache.
    Cached(Artwork),
}

impl RowImage {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, RowImage::Placeholder)
    }

    pub fn artwork(&self) -> Option<&Artwork> {
        match self {
            RowImage::Placeholder => None,
            RowImage::Cached(artwork) => Some(artwork),
        }
    }
}

/// What a view needs to render one row of the result list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Position in the current result list
    pub index: usize,
    /// Title taken from the item's `trackName`
    pub title: String,
    /// Cached artwork or a placeholder
    pub image: RowImage,
}

// ================================================================================================
// CONFIGURATION
// ================================================================================================

/// Default catalog host.
pub const DEFAULT_BASE_URL: &str = "https://itunes.apple.com";

/// Default entity type requested from the catalog.
pub const DEFAULT_ENTITY: &str = "software";

/// Query used by `refresh` before any search has been issued.
pub const DEFAULT_PLACEHOLDER_QUERY: &str = "books";

/// Default number of artworks kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Configuration for the catalog client and the controller built on it.
///
/// # Examples
///
/// ```rust
/// use catalog_browse::ControllerConfig;
/// use std::num::NonZeroUsize;
///
/// let config = ControllerConfig::new()
///     .with_country("GB")
///     .with_limit(25)
///     .with_cache_capacity(NonZeroUsize::new(64).unwrap());
///
/// assert_eq!(config.entity, "software");
/// assert_eq!(config.cache_capacity.get(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Scheme and host of the catalog, without a trailing slash
    pub base_url: String,
    /// Value of the `entity` query parameter
    pub entity: String,
    /// Query used by `refresh` when no search has been made yet
    pub placeholder_query: String,
    /// Maximum number of artworks held by the cache
    pub cache_capacity: NonZeroUsize,
    /// Optional storefront country code
    pub country: Option<String>,
    /// Optional cap on the number of results
    pub limit: Option<u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            entity: DEFAULT_ENTITY.to_string(),
            placeholder_query: DEFAULT_PLACEHOLDER_QUERY.to_string(),
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            country: None,
            limit: None,
        }
    }
}

impl ControllerConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `CATALOG_*` environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup("CATALOG_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Some(entity) = lookup("CATALOG_ENTITY") {
            config.entity = entity;
        }
        if let Some(query) = lookup("CATALOG_PLACEHOLDER_QUERY") {
            config.placeholder_query = query;
        }
        if let Some(raw) = lookup("CATALOG_CACHE_CAPACITY") {
            match raw.parse::<NonZeroUsize>() {
                Ok(capacity) => config.cache_capacity = capacity,
                Err(e) => log::warn!("Ignoring CATALOG_CACHE_CAPACITY={raw:?}: {e}"),
            }
        }
        if let Some(country) = lookup("CATALOG_COUNTRY") {
            config.country = Some(country);
        }
        if let Some(raw) = lookup("CATALOG_LIMIT") {
            match raw.parse::<u32>() {
                Ok(limit) => config.limit = Some(limit),
                Err(e) => log::warn!("Ignoring CATALOG_LIMIT={raw:?}: {e}"),
            }
        }

        config
    }

    /// Point the client at a different catalog host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Request a different entity type
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Set the query `refresh` falls back to
    pub fn with_placeholder_query(mut self, query: impl Into<String>) -> Self {
        self.placeholder_query = query.into();
        self
    }

    /// Set the artwork cache capacity
    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Restrict results to one storefront
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Cap the number of results per search
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Full search URL for `term`, with the term percent-encoded.
    pub fn search_url(&self, term: &str) -> String {
        let mut url = format!(
            "{}/search?entity={}&term={}",
            self.base_url,
            urlencoding::encode(&self.entity),
            urlencoding::encode(term)
        );
        if let Some(country) = &self.country {
            url.push_str(&format!("&country={}", urlencoding::encode(country)));
        }
        if let Some(limit) = self.limit {
            url.push_str(&format!("&limit={limit}"));
        }
        url
    }
}

// ================================================================================================
// EVENT SYSTEM
// ================================================================================================

/// Request information for client events
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestInfo {
    /// The HTTP method (GET, POST, etc.)
    pub method: String,
    /// The full URI being requested
    pub uri: String,
    /// Query parameters as key-value pairs, decoded
    pub query_params: Vec<(String, String)>,
    /// Path without query parameters
    pub path: String,
}

impl RequestInfo {
    /// Create RequestInfo from a parsed URL and method
    pub fn from_url_and_method(url: &http_types::Url, method: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: url.to_string(),
            query_params: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            path: url.path().to_string(),
        }
    }

    /// Get a short description of the request for logging
    pub fn short_description(&self) -> String {
        let mut desc = format!("{} {}", self.method, self.path);
        if !self.query_params.is_empty() {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if params.len() <= 2 {
                desc.push_str(&format!("?{}", params.join("&")));
            } else {
                desc.push_str(&format!("?{}...", params[0]));
            }
        }
        desc
    }
}

/// Event type to describe internal HTTP client activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Request started
    RequestStarted {
        /// Request details
        request: RequestInfo,
    },
    /// Response headers received
    RequestCompleted {
        /// Request details
        request: RequestInfo,
        /// HTTP status code
        status_code: u16,
        /// Duration of the request in milliseconds
        duration_ms: u64,
    },
    /// The request never produced a response
    RequestFailed {
        /// Request details
        request: RequestInfo,
        /// Transport error message
        error: String,
    },
}

/// Why the artwork cache was emptied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheClearReason {
    /// Pull-to-refresh style reload
    Refresh,
    /// An explicit new search
    NewSearch,
    /// The host signalled memory pressure
    MemoryPressure,
}

/// Events the controller emits for a view layer to react to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ControllerEvent {
    /// The result list was replaced; the whole table should reload
    DataUpdated {
        /// Generation of the new list
        generation: u64,
        /// Number of rows in the new list
        count: usize,
    },
    /// Artwork for a row is now cached
    RowUpdated {
        /// Generation the fetch was issued under
        generation: u64,
        /// Row whose image changed
        index: usize,
    },
    /// A search failed; the previous list is still shown
    SearchFailed {
        /// The query that failed
        query: String,
        /// Error message
        error: String,
    },
    /// An artwork fetch failed; the row keeps its placeholder
    ArtworkFailed {
        /// Row that requested the artwork
        index: usize,
        /// Artwork URL
        url: String,
        /// Error message
        error: String,
    },
    /// The artwork cache was emptied
    CacheCleared {
        /// What triggered the clear
        reason: CacheClearReason,
    },
}

/// Which controller operation a failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailedOperation {
    Search,
    Artwork,
}

/// The most recent failure seen by the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct FailureRecord {
    /// Operation that failed
    pub operation: FailedOperation,
    /// The error itself
    pub error: crate::CatalogError,
    /// When the failure was observed
    pub at: DateTime<Utc>,
}

/// Type alias for the client event receiver
pub type ClientEventReceiver = broadcast::Receiver<ClientEvent>;

/// Type alias for the controller event receiver
pub type ControllerEventReceiver = broadcast::Receiver<ControllerEvent>;

/// Broadcasts events to any number of subscribers and remembers the latest one.
///
/// Cloning shares the underlying channels, so every clone observes the same
/// stream.
#[derive(Clone)]
pub struct EventBroadcaster<E: Clone> {
    event_tx: broadcast::Sender<E>,
    last_event_tx: watch::Sender<Option<E>>,
}

impl<E: Clone> EventBroadcaster<E> {
    /// Create a new broadcaster with room for 100 undelivered events
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (last_event_tx, _) = watch::channel(None);

        Self {
            event_tx,
            last_event_tx,
        }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: E) {
        let _ = self.event_tx.send(event.clone());
        self.last_event_tx.send_replace(Some(event));
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.event_tx.subscribe()
    }

    /// Get the latest event
    pub fn latest_event(&self) -> Option<E> {
        self.last_event_tx.borrow().clone()
    }
}

impl<E: Clone> Default for EventBroadcaster<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> std::fmt::Debug for EventBroadcaster<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

// ================================================================================================
// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_search_url_encodes_term() {
        let config = ControllerConfig::default();
        assert_eq!(
            config.search_url("angry birds & co"),
            "https://itunes.apple.com/search?entity=software&term=angry%20birds%20%26%20co"
        );
    }

    #[test]
    fn test_search_url_optional_params() {
        let config = ControllerConfig::new()
            .with_base_url("http://localhost:8080/")
            .with_country("us")
            .with_limit(10);
        assert_eq!(
            config.search_url("books"),
            "http://localhost:8080/search?entity=software&term=books&country=us&limit=10"
        );
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CATALOG_BASE_URL", "http://127.0.0.1:9000"),
            ("CATALOG_PLACEHOLDER_QUERY", "games"),
            ("CATALOG_CACHE_CAPACITY", "12"),
            ("CATALOG_LIMIT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ControllerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.placeholder_query, "games");
        assert_eq!(config.cache_capacity.get(), 12);
        assert_eq!(config.limit, None);
        assert_eq!(config.entity, DEFAULT_ENTITY);
    }

    #[test]
    fn test_zero_capacity_is_ignored() {
        let config = ControllerConfig::from_lookup(|key| {
            (key == "CATALOG_CACHE_CAPACITY").then(|| "0".to_string())
        });
        assert_eq!(config.cache_capacity.get(), DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_request_info_from_url() {
        let url: http_types::Url = "https://itunes.apple.com/search?entity=software&term=a%20b"
            .parse()
            .unwrap();
        let info = RequestInfo::from_url_and_method(&url, "GET");

        assert_eq!(info.path, "/search");
        assert_eq!(
            info.query_params,
            vec![
                ("entity".to_string(), "software".to_string()),
                ("term".to_string(), "a b".to_string()),
            ]
        );
        assert_eq!(info.short_description(), "GET /search?entity=software&term=a b");
    }

    #[test]
    fn test_broadcaster_remembers_latest_event() {
        let broadcaster: EventBroadcaster<ControllerEvent> = EventBroadcaster::new();
        assert!(broadcaster.latest_event().is_none());

        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast_event(ControllerEvent::CacheCleared {
            reason: CacheClearReason::MemoryPressure,
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            ControllerEvent::CacheCleared {
                reason: CacheClearReason::MemoryPressure
            }
        );
        assert_eq!(
            broadcaster.latest_event(),
            Some(ControllerEvent::CacheCleared {
                reason: CacheClearReason::MemoryPressure
            })
        );
    }

    #[test]
    fn test_result_item_ignores_unknown_fields() {
        let item: ResultItem = serde_json::from_str(
            r#"{
                "wrapperType": "software",
                "trackName": "Reader",
                "artworkUrl100": "https://example.com/100.png",
                "trackId": 42,
                "averageUserRating": 4.5
            }"#,
        )
        .unwrap();

        assert_eq!(item.track_name, "Reader");
        assert_eq!(item.track_id, Some(42));
        assert_eq!(item.average_user_rating, Some(4.5));
        assert_eq!(item.bundle_id, None);
    }
}
