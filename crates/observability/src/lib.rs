//! Process observability: logging setup.

mod tracing;

pub use crate::tracing::init;
