//! The persistent conditional HTTP cache (§4.8): a content-addressed
//! store for `url`-sourced files, keyed by `hex(sha256(url))`, with
//! conditional revalidation and bounded retry on cache miss.

pub mod cache;
pub mod progress;

pub use cache::{CacheEntry, FetchOutcome, HttpCache};
pub use progress::ProgressReporter;
