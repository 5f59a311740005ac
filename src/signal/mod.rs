//! Synchronization primitives shared by the service supervisor.

mod completion;

pub use completion::*;
