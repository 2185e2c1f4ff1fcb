//! Runtime glue: the thread-local current context, the [`Runtime`]
//! entry point and the task primitives.

mod core;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod yield_now;

pub mod task;

pub use self::core::Runtime;
