//! Backs up a Posterous blog.
//!
//! Post metadata is paged out of the API into `<backup>/xml/<timestamp>/page<N>.xml`,
//! then every file referenced from it (plus the unscaled original of every thumbnail)
//! is mirrored into `<backup>/files/`.

pub mod config;
pub mod download;
mod error;
pub mod extract;
mod macros;
pub mod parse;
pub mod process;
pub mod request;
pub mod store;

pub use error::{Error, FetchError, Result};

/// Posts requested per metadata page.
pub const PAGE_SIZE: usize = 50;
pub const XML_DIR_NAME: &str = "xml";
pub const FILES_DIR_NAME: &str = "files";
/// Run directories are named after the local start time in this format.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
pub const PLACEHOLDER_HOSTNAME: &str = "put hostname here";
pub const DEFAULT_API_URL: &str = "http://posterous.com";
