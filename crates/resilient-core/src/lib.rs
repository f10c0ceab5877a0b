//! Shared infrastructure for resilient-http: the event system and the
//! unified error type used by the retry transport, scheduler, and refresh
//! cache crates.
//!
//! Most users will not depend on this crate directly — it's re-exported
//! through the `resilient-http` umbrella crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;

pub use error::ResilienceError;
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, ResilienceEvent};
