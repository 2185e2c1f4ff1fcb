//! Asynchronous generators.

mod generator;

pub use generator::{Completion, Generator, Next, YieldValue, Yielder};
