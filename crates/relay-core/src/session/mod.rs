//! Session metadata caching

pub mod registry;

pub use registry::SessionRegistry;
