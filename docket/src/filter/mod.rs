//! Equality filters over collections.
mod executor;
mod spec;

pub use executor::FilterExecutor;
pub use spec::FilterSpec;
