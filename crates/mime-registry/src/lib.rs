// Public fallible APIs in this crate share one concrete error contract (`MimeError`).
// Per-function `# Errors` sections would only restate that contract.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod cache;
pub mod config;
pub mod detect;
pub mod error;
pub mod mime;
pub mod registry;
pub mod source;

pub use cache::{FileTtlCache, MIME_TYPES_CACHE_KEY, MemoryTtlCache, MimeTypesCache, TtlCache};
pub use config::MimeDbConfig;
pub use detect::{ContentSniffer, DetectionMethods, InferSniffer};
pub use error::{MimeError, Result};
pub use mime::{DefaultMimeTypeFactory, MimeType, MimeTypeFactory, MimeTypeMap, MimeTypeRecord};
pub use registry::MimeTypes;
pub use source::{
    CdnMimeTypesSrc, DEFAULT_MIME_DB_URL, FileMimeDbFetcher, HttpMimeDbFetcher, MimeDbFetcher,
    MimeTypesProvider, MimeTypesSrc, RawMimeDb, RawMimeTypeEntry,
};
