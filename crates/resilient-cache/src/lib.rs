//! Conditional-GET refresh cache controller.
//!
//! [`RefreshCache`] keeps a single value in sync with a remote resource
//! fetched over HTTP GET, using `If-None-Match`/`If-Modified-Since` to
//! avoid re-downloading unchanged data and deriving its own refresh
//! cadence from the response's caching headers. It implements
//! `resilient_scheduler::Tick`, so a `Scheduler` can dispatch it directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;
mod entry;
mod lifetime;
mod mapper;
mod static_headers;

pub use cache::{RefreshCache, RefreshCacheBuilder, TlsOptions};
pub use entry::Ready;
pub use lifetime::parse_cache_lifetime;
pub use mapper::{Mapper, MapperError};
