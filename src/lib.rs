//! # catalog-browse
//!
//! Search a public software catalog, keep the results as an ordered list and
//! serve table rows whose artwork is downloaded lazily, validated as an image
//! and cached by URL.
//!
//! The entry point is [`SearchController`]; [`CatalogClientImpl`] is the HTTP
//! client underneath it and can be used on its own.

pub mod api;
pub mod cache;
pub mod controller;
pub mod error;
pub mod types;

pub use api::{decode_artwork, parse_search_response, CatalogClient, CatalogClientImpl};
pub use cache::{ArtworkCache, CacheStats};
pub use controller::{SearchController, SearchOutcome};
pub use error::CatalogError;
pub use types::{
    Artwork, CacheClearReason, ClientEvent, ClientEventReceiver, ControllerConfig,
    ControllerEvent, ControllerEventReceiver, EventBroadcaster, FailedOperation, FailureRecord,
    RequestInfo, ResultItem, Row, RowImage,
};

#[cfg(feature = "mock")]
pub use api::MockCatalogClient;

pub type Result<T> = std::result::Result<T, CatalogError>;
