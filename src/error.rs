use thiserror::Error;

/// Error types for catalog operations.
///
/// This enum covers everything that can go wrong while talking to the catalog:
/// transport failures, rate limiting, malformed search payloads and artwork
/// bytes that do not decode as an image.
///
/// # Error Handling Examples
///
/// ```rust,no_run
/// use catalog_browse::{CatalogClient, CatalogClientImpl, CatalogError, ControllerConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let http_client = http_client::native::NativeClient::new();
///     let client = CatalogClientImpl::new(Box::new(http_client), ControllerConfig::default());
///
///     match client.search("books").await {
///         Ok(items) => println!("{} results", items.len()),
///         Err(CatalogError::RateLimit { retry_after }) => {
///             eprintln!("Rate limited, retry in {} seconds", retry_after);
///         }
///         Err(CatalogError::Http(msg)) => eprintln!("Network error: {}", msg),
///         Err(CatalogError::Parse(msg)) => eprintln!("Unexpected payload: {}", msg),
///         Err(e) => eprintln!("Other error: {}", e),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// HTTP/network related errors.
    ///
    /// This includes connection failures, DNS errors and any non-success
    /// status other than rate limiting.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The catalog answered with 429 Too Many Requests.
    ///
    /// The `retry_after` field carries the `Retry-After` header when present,
    /// otherwise a default of 60 seconds. Nothing in this crate retries
    /// automatically.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimit {
        /// Number of seconds to wait before retrying
        retry_after: u64,
    },

    /// The search response was not valid JSON or had no `results` array.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Artwork bytes were fetched but are not a recognizable image.
    #[error("Failed to decode artwork: {0}")]
    Decode(String),

    /// A configured base URL or an artwork URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl CatalogError {
    /// Whether the failure happened before any payload was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, CatalogError::Http(_) | CatalogError::RateLimit { .. })
    }
}
