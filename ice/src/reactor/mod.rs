//! The reactor: execution contexts and single-shot reactor events.
//!
//! A [`Context`] is the only component that talks to the OS notification
//! facility. Reactor [`Event`]s register themselves with a context and are
//! completed by whichever thread runs its dispatch loop.

mod context;
mod event;
mod poller;

pub use context::{Context, Schedule};
pub use event::Event;
