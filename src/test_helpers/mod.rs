//! Helpers shared by in-crate unit tests.

pub(crate) mod tracing;
