//! AI module - provider catalog, backend clients and routing

pub mod catalog;
pub mod providers;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use catalog::{BackendKind, CapabilityTier, Catalog, CatalogError, ProviderDescriptor};
pub use providers::{Provider, ProviderError, ProviderRegistry};
pub use router::{
    AttemptReport, GenerateRequest, InferenceRouter, Outcome, RouterError, RouterStream,
};
