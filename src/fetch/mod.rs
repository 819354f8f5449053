//! Fetch pipeline
//!
//! Request/response types, the error taxonomy, wait-strategy dispatch, and
//! the orchestrating [`Fetcher`].

pub mod error;
pub mod fetcher;
pub mod types;
pub mod wait;

pub use error::{classify_driver_error, classify_http_status, FetchError, FetchErrorKind};
pub use fetcher::Fetcher;
pub use types::{
    ContentKind, ExtractedLink, FetchRequest, FetchResult, PageMetadata, StructuredData,
    WaitStrategy, MAX_BATCH_SIZE,
};
