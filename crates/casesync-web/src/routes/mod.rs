//! Route handlers.

pub mod sync;
