//! Upstream provider gateways

pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod sse;

pub use provider::{FragmentStream, LlmProvider};
pub use providers::{GeminiProvider, GroqProvider};
pub use registry::ProviderRegistry;
