use crate::types::{
    Artwork, ClientEvent, ClientEventReceiver, ControllerConfig, EventBroadcaster, RequestInfo,
    ResultItem,
};
use crate::{CatalogError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_client::{HttpClient, Request, Response};
use http_types::{Method, Url};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;

// =============================================================================
// CatalogClient trait and implementation
// =============================================================================

/// Network operations the controller needs from the catalog.
///
/// When the `mock` feature is enabled, this crate provides `MockCatalogClient`
/// that implements this trait using the `mockall` library.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Search the catalog and return items in response order.
    async fn search(&self, term: &str) -> Result<Vec<ResultItem>>;

    /// Download artwork and check that it decodes as an image.
    async fn fetch_artwork(&self, url: &str) -> Result<Artwork>;
}

/// [`CatalogClient`] over any [`HttpClient`] implementation.
///
/// # Examples
///
/// ```rust,no_run
/// use catalog_browse::{CatalogClient, CatalogClientImpl, ControllerConfig};
///
/// # tokio_test::block_on(async {
/// let http_client = http_client::native::NativeClient::new();
/// let client = CatalogClientImpl::new(Box::new(http_client), ControllerConfig::default());
///
/// for item in client.search("books").await? {
///     println!("{} -> {}", item.track_name, item.artwork_url);
/// }
/// # Ok::<(), catalog_browse::CatalogError>(())
/// # });
/// ```
#[derive(Clone)]
pub struct CatalogClientImpl {
    client: Arc<dyn HttpClient + Send + Sync>,
    config: ControllerConfig,
    broadcaster: EventBroadcaster<ClientEvent>,
}

impl CatalogClientImpl {
    pub fn new(client: Box<dyn HttpClient + Send + Sync>, config: ControllerConfig) -> Self {
        Self {
            client: Arc::from(client),
            config,
            broadcaster: EventBroadcaster::new(),
        }
    }

    /// Create a client that shares this client's event stream but sends
    /// through a different HTTP implementation.
    pub fn with_shared_broadcaster(&self, client: Box<dyn HttpClient + Send + Sync>) -> Self {
        Self {
            client: Arc::from(client),
            config: self.config.clone(),
            broadcaster: self.broadcaster.clone(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> ClientEventReceiver {
        self.broadcaster.subscribe()
    }

    pub fn latest_event(&self) -> Option<ClientEvent> {
        self.broadcaster.latest_event()
    }

    /// Send a GET request and return the response if its status is a success.
    async fn get(&self, url: &str) -> Result<Response> {
        let url: Url = url
            .parse()
            .map_err(|e| CatalogError::InvalidUrl(format!("{url}: {e}")))?;
        let request_info = RequestInfo::from_url_and_method(&url, "GET");
        let request_start = std::time::Instant::now();

        log::debug!("{}", request_info.short_description());
        self.broadcaster.broadcast_event(ClientEvent::RequestStarted {
            request: request_info.clone(),
        });

        let request = Request::new(Method::Get, url);
        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.broadcaster.broadcast_event(ClientEvent::RequestFailed {
                    request: request_info,
                    error: e.to_string(),
                });
                return Err(CatalogError::Http(e.to_string()));
            }
        };

        let status: u16 = response.status().into();
        self.broadcaster.broadcast_event(ClientEvent::RequestCompleted {
            request: request_info,
            status_code: status,
            duration_ms: request_start.elapsed().as_millis() as u64,
        });

        check_status(response)
    }
}

#[async_trait]
impl CatalogClient for CatalogClientImpl {
    async fn search(&self, term: &str) -> Result<Vec<ResultItem>> {
        let url = self.config.search_url(term);
        let mut response = self.get(&url).await?;

        let body = response
            .body_string()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        parse_search_response(&body)
    }

    async fn fetch_artwork(&self, url: &str) -> Result<Artwork> {
        let mut response = self.get(url).await?;

        let body = response
            .body_bytes()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        decode_artwork(url, Bytes::from(body))
    }
}

/// Map non-success statuses to errors; 429 becomes [`CatalogError::RateLimit`].
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if u16::from(status) == 429 {
        let retry_after = response
            .header("Retry-After")
            .and_then(|values| values.last().as_str().trim().parse::<u64>().ok())
            .unwrap_or(60);
        log::debug!("429 response, retry after {retry_after}s");
        return Err(CatalogError::RateLimit { retry_after });
    }

    Err(CatalogError::Http(format!(
        "unexpected status {} {}",
        u16::from(status),
        status.canonical_reason()
    )))
}

#[derive(Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "resultCount", default)]
    pub result_count: Option<usize>,
    pub results: Vec<serde_json::Value>,
}

/// Parse a catalog search body into items, keeping response order.
///
/// Entries without a `trackName` or `artworkUrl100` cannot be shown as rows
/// and are skipped rather than failing the whole response.
pub fn parse_search_response(json: &str) -> Result<Vec<ResultItem>> {
    let response: SearchResponse =
        serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;

    if let Some(count) = response.result_count {
        if count != response.results.len() {
            log::debug!(
                "resultCount {} does not match {} results",
                count,
                response.results.len()
            );
        }
    }

    let items = response
        .results
        .into_iter()
        .enumerate()
        .filter_map(
            |(position, value)| match serde_json::from_value::<ResultItem>(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::debug!("Skipping result {position}: {e}");
                    None
                }
            },
        )
        .collect();

    Ok(items)
}

/// Check that `bytes` are a decodable image and wrap them as [`Artwork`].
pub fn decode_artwork(url: &str, bytes: Bytes) -> Result<Artwork> {
    let reader = image::ImageReader::new(Cursor::new(bytes.as_ref()))
        .with_guessed_format()
        .map_err(|e| CatalogError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| CatalogError::Decode(format!("unrecognized image format from {url}")))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| CatalogError::Decode(e.to_string()))?;

    Ok(Artwork {
        url: url.to_string(),
        bytes,
        format,
        width,
        height,
        fetched_at: chrono::Utc::now(),
    })
}
