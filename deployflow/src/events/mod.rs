//! Run lifecycle events.
//!
//! The executor reports progress through an [`EventSink`] passed to it
//! explicitly. Payloads are built from [`RunEvent`].

mod run;
mod sink;

pub use run::RunEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
