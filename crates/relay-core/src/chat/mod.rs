//! Request orchestration

pub mod orchestrator;

pub use orchestrator::ChatRelay;
