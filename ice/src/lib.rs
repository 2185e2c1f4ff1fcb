//! # Ice
//!
//! **Ice** is a minimal asynchronous engine: a thin layer over the operating
//! system's completion or readiness facility that lets call chains suspend
//! on I/O, or on each other, without blocking a thread.
//!
//! There is no scheduler and no run queue. A suspended computation is
//! resumed in place by whichever thread completes what it waits on: the
//! thread that dispatched a reactor event, the producer that finished a
//! value, or the holder that released a lock.
//!
//! The crate offers:
//!
//! - An **execution context** ([`Context`]) owning one OS reactor (epoll,
//!   kqueue or an I/O completion port) that any number of threads may run
//! - **Reactor events** ([`Event`]) resolving when the OS reports readiness
//!   or completion
//! - **Fire-and-forget tasks** ([`spawn`]) whose failures go to the
//!   [diagnostic sink](diagnostic)
//! - **Eager computations** ([`Async`]) producing a value or an error once
//! - **Asynchronous generators** ([`Generator`]) with cooperative
//!   cancellation
//! - A **non-blocking mutex** ([`sync::Mutex`]) with a lock-free waiter list
//! - **Macros** `#[ice::main]`, `#[ice::test]` and `join!`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ice::{Async, current};
//!
//! #[ice::main(threads = 4)]
//! async fn main() {
//!     let answer = Async::new(async {
//!         if let Some(context) = current() {
//!             context.schedule().await;
//!         }
//!         42
//!     });
//!
//!     println!("{}", answer.await.unwrap());
//! }
//! ```

mod continuation;
mod error;
mod handle;
mod reactor;
mod runtime;

pub mod diagnostic;
pub mod stream;
pub mod sync;

pub use continuation::Continuation;
pub use error::{Error, Result};
pub use handle::{Handle, RawHandle};
pub use reactor::{Context, Event, Schedule};
pub use runtime::Runtime;
pub use runtime::builder::Builder;
pub use runtime::context::current;
pub use runtime::task::{self, Async, spawn, start};
pub use runtime::yield_now::yield_now;
pub use stream::{Generator, Yielder};

pub use ice_macros::*;
