//! Provider catalog
//!
//! Static, cost-ordered descriptors of every inference backend. There is one
//! list for vision and one list per text capability tier. The router walks a
//! list front to back, so every list must be cost-ascending: the cheapest
//! backend that works is always the one that answers.
//!
//! The default tables below are operational configuration. The settings file
//! can replace any list without a code change (see `config`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Bytes per megabyte for image size limits
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// ============================================================================
// Backend identity
// ============================================================================

/// The fixed set of interchangeable inference backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Groq,
    Gemini,
    DeepSeek,
    OpenAI,
    Anthropic,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Groq => write!(f, "groq"),
            BackendKind::Gemini => write!(f, "gemini"),
            BackendKind::DeepSeek => write!(f, "deepseek"),
            BackendKind::OpenAI => write!(f, "openai"),
            BackendKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl BackendKind {
    /// Every backend, in declaration order
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Groq,
        BackendKind::Gemini,
        BackendKind::DeepSeek,
        BackendKind::OpenAI,
        BackendKind::Anthropic,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Some(BackendKind::Groq),
            "gemini" | "google" => Some(BackendKind::Gemini),
            "deepseek" => Some(BackendKind::DeepSeek),
            "openai" => Some(BackendKind::OpenAI),
            "anthropic" | "claude" => Some(BackendKind::Anthropic),
            _ => None,
        }
    }

    /// Environment variables that may hold this backend's credential, in priority order
    pub fn credential_env_vars(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Groq => &["GROQ_API_KEY"],
            BackendKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            BackendKind::DeepSeek => &["DEEPSEEK_API_KEY"],
            BackendKind::OpenAI => &["OPENAI_API_KEY"],
            BackendKind::Anthropic => &["ANTHROPIC_API_KEY"],
        }
    }
}

// ============================================================================
// Capability tiers
// ============================================================================

/// Named quality/cost class of a text request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityTier {
    Simple,
    Moderate,
    Complex,
    Coding,
    Research,
}

impl CapabilityTier {
    pub const ALL: [CapabilityTier; 5] = [
        CapabilityTier::Simple,
        CapabilityTier::Moderate,
        CapabilityTier::Complex,
        CapabilityTier::Coding,
        CapabilityTier::Research,
    ];
}

impl std::fmt::Display for CapabilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityTier::Simple => write!(f, "simple"),
            CapabilityTier::Moderate => write!(f, "moderate"),
            CapabilityTier::Complex => write!(f, "complex"),
            CapabilityTier::Coding => write!(f, "coding"),
            CapabilityTier::Research => write!(f, "research"),
        }
    }
}

impl FromStr for CapabilityTier {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(CapabilityTier::Simple),
            "moderate" => Ok(CapabilityTier::Moderate),
            "complex" => Ok(CapabilityTier::Complex),
            "coding" => Ok(CapabilityTier::Coding),
            "research" => Ok(CapabilityTier::Research),
            other => Err(CatalogError::UnknownTier(other.to_string())),
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// One backend/model pairing with its pricing and vision limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub backend: BackendKind,
    pub model: String,
    /// Currency units per 1000 input tokens
    pub input_cost_per_1k: f64,
    /// Currency units per 1000 output tokens
    pub output_cost_per_1k: f64,
    #[serde(default)]
    pub supports_vision: bool,
    /// Largest accepted image, in megabytes
    #[serde(default)]
    pub max_image_mb: f64,
}

impl ProviderDescriptor {
    pub fn text(backend: BackendKind, model: &str, input_cost: f64, output_cost: f64) -> Self {
        Self {
            backend,
            model: model.to_string(),
            input_cost_per_1k: input_cost,
            output_cost_per_1k: output_cost,
            supports_vision: false,
            max_image_mb: 0.0,
        }
    }

    pub fn vision(
        backend: BackendKind,
        model: &str,
        input_cost: f64,
        output_cost: f64,
        max_image_mb: f64,
    ) -> Self {
        Self {
            backend,
            model: model.to_string(),
            input_cost_per_1k: input_cost,
            output_cost_per_1k: output_cost,
            supports_vision: true,
            max_image_mb,
        }
    }

    /// Key used for the cost-ascending invariant
    pub fn ordering_cost(&self) -> f64 {
        self.input_cost_per_1k + self.output_cost_per_1k
    }

    pub fn is_free(&self) -> bool {
        self.input_cost_per_1k == 0.0 && self.output_cost_per_1k == 0.0
    }

    /// Realized cost of one call
    pub fn cost_for(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        if self.is_free() {
            return 0.0;
        }
        (input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }

    /// Whether an image of `len_bytes` fits this backend
    pub fn accepts_image(&self, len_bytes: usize) -> bool {
        self.supports_vision && (len_bytes as f64) <= self.max_image_mb * BYTES_PER_MB
    }

    /// "backend/model", used in logs and failure reports
    pub fn label(&self) -> String {
        format!("{}/{}", self.backend, self.model)
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Unsupported capability tier: {0}")]
    UnknownTier(String),
    #[error("Provider list '{0}' is empty")]
    EmptyList(String),
    #[error("Provider list '{list}' is not cost-ascending at position {position} ({model})")]
    CostOrder {
        list: String,
        position: usize,
        model: String,
    },
    #[error("Vision list entry {0} does not support vision")]
    NotVisionCapable(String),
}

/// Cost-ordered provider lists: one for vision, one per capability tier
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    vision: Vec<ProviderDescriptor>,
    tiers: BTreeMap<CapabilityTier, Vec<ProviderDescriptor>>,
}

impl Default for Catalog {
    fn default() -> Self {
        let tiers = CapabilityTier::ALL
            .iter()
            .map(|tier| (*tier, default_tier_chain(*tier)))
            .collect();
        Self {
            vision: default_vision_chain(),
            tiers,
        }
    }
}

impl Catalog {
    /// Build a catalog from explicit lists, validating every invariant
    pub fn new(
        vision: Vec<ProviderDescriptor>,
        tiers: BTreeMap<CapabilityTier, Vec<ProviderDescriptor>>,
    ) -> Result<Self, CatalogError> {
        let catalog = Self { vision, tiers };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Replace the vision chain
    pub fn with_vision_chain(
        mut self,
        chain: Vec<ProviderDescriptor>,
    ) -> Result<Self, CatalogError> {
        self.vision = chain;
        self.validate()?;
        Ok(self)
    }

    /// Replace one tier's chain
    pub fn with_tier(
        mut self,
        tier: CapabilityTier,
        chain: Vec<ProviderDescriptor>,
    ) -> Result<Self, CatalogError> {
        self.tiers.insert(tier, chain);
        self.validate()?;
        Ok(self)
    }

    pub fn vision_chain(&self) -> &[ProviderDescriptor] {
        &self.vision
    }

    /// Provider list for a text tier
    pub fn tier(&self, tier: CapabilityTier) -> Result<&[ProviderDescriptor], CatalogError> {
        match self.tiers.get(&tier) {
            Some(list) if !list.is_empty() => Ok(list),
            _ => Err(CatalogError::EmptyList(tier.to_string())),
        }
    }

    pub fn tiers(&self) -> impl Iterator<Item = (&CapabilityTier, &Vec<ProviderDescriptor>)> {
        self.tiers.iter()
    }

    /// Check non-emptiness and cost ordering of every list
    pub fn validate(&self) -> Result<(), CatalogError> {
        check_list("vision", &self.vision)?;
        if let Some(entry) = self.vision.iter().find(|d| !d.supports_vision) {
            return Err(CatalogError::NotVisionCapable(entry.label()));
        }
        for tier in CapabilityTier::ALL {
            let list = self
                .tiers
                .get(&tier)
                .ok_or_else(|| CatalogError::EmptyList(tier.to_string()))?;
            check_list(&tier.to_string(), list)?;
        }
        Ok(())
    }
}

fn check_list(name: &str, list: &[ProviderDescriptor]) -> Result<(), CatalogError> {
    if list.is_empty() {
        return Err(CatalogError::EmptyList(name.to_string()));
    }
    for (position, pair) in list.windows(2).enumerate() {
        if pair[1].ordering_cost() < pair[0].ordering_cost() {
            return Err(CatalogError::CostOrder {
                list: name.to_string(),
                position: position + 1,
                model: pair[1].model.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Default tables (USD per 1000 tokens)
// ============================================================================

/// Cheapest-first vision chain
pub fn default_vision_chain() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor::vision(
            BackendKind::Groq,
            "meta-llama/llama-4-scout-17b-16e-instruct",
            0.00011,
            0.00034,
            4.0,
        ),
        ProviderDescriptor::vision(BackendKind::Gemini, "gemini-2.0-flash", 0.0001, 0.0004, 20.0),
        ProviderDescriptor::vision(BackendKind::OpenAI, "gpt-4o-mini", 0.00015, 0.0006, 20.0),
        ProviderDescriptor::vision(
            BackendKind::Anthropic,
            "claude-3-5-haiku-latest",
            0.0008,
            0.004,
            5.0,
        ),
        ProviderDescriptor::vision(BackendKind::OpenAI, "gpt-4o", 0.0025, 0.01, 20.0),
        ProviderDescriptor::vision(
            BackendKind::Anthropic,
            "claude-sonnet-4-20250514",
            0.003,
            0.015,
            5.0,
        ),
    ]
}

/// Cheapest-first text chain for a tier
pub fn default_tier_chain(tier: CapabilityTier) -> Vec<ProviderDescriptor> {
    let groq_small = ProviderDescriptor::text(BackendKind::Groq, "llama-3.1-8b-instant", 0.00005, 0.00008);
    let groq_large =
        ProviderDescriptor::text(BackendKind::Groq, "llama-3.3-70b-versatile", 0.00059, 0.00079);
    let gemini_flash = ProviderDescriptor::text(BackendKind::Gemini, "gemini-2.0-flash", 0.0001, 0.0004);
    let gemini_pro = ProviderDescriptor::text(BackendKind::Gemini, "gemini-2.5-pro", 0.00125, 0.01);
    let deepseek = ProviderDescriptor::text(BackendKind::DeepSeek, "deepseek-chat", 0.00027, 0.0011);
    let gpt_mini = ProviderDescriptor::text(BackendKind::OpenAI, "gpt-4o-mini", 0.00015, 0.0006);
    let gpt_4o = ProviderDescriptor::text(BackendKind::OpenAI, "gpt-4o", 0.0025, 0.01);
    let haiku =
        ProviderDescriptor::text(BackendKind::Anthropic, "claude-3-5-haiku-latest", 0.0008, 0.004);
    let sonnet =
        ProviderDescriptor::text(BackendKind::Anthropic, "claude-sonnet-4-20250514", 0.003, 0.015);

    match tier {
        CapabilityTier::Simple => vec![groq_small, gemini_flash, gpt_mini],
        CapabilityTier::Moderate => vec![gemini_flash, gpt_mini, deepseek, groq_large],
        CapabilityTier::Complex => vec![deepseek, haiku, gpt_4o, sonnet],
        CapabilityTier::Coding => vec![deepseek, gpt_4o, sonnet],
        CapabilityTier::Research => vec![gemini_pro, gpt_4o, sonnet],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = Catalog::default();
        assert!(catalog.validate().is_ok());
        for tier in CapabilityTier::ALL {
            assert!(!catalog.tier(tier).unwrap().is_empty());
        }
        assert!(catalog.vision_chain().iter().all(|d| d.supports_vision));
    }

    #[test]
    fn test_default_lists_are_cost_ascending() {
        let catalog = Catalog::default();
        let lists = std::iter::once(catalog.vision_chain().to_vec())
            .chain(catalog.tiers().map(|(_, list)| list.clone()));
        for list in lists {
            for pair in list.windows(2) {
                assert!(pair[0].ordering_cost() <= pair[1].ordering_cost());
            }
        }
    }

    #[test]
    fn test_rejects_descending_list() {
        let chain = vec![
            ProviderDescriptor::vision(BackendKind::OpenAI, "gpt-4o", 0.0025, 0.01, 20.0),
            ProviderDescriptor::vision(BackendKind::Gemini, "gemini-2.0-flash", 0.0001, 0.0004, 20.0),
        ];
        let err = Catalog::default().with_vision_chain(chain).unwrap_err();
        assert!(matches!(err, CatalogError::CostOrder { position: 1, .. }));
    }

    #[test]
    fn test_rejects_empty_tier() {
        let err = Catalog::default()
            .with_tier(CapabilityTier::Coding, vec![])
            .unwrap_err();
        assert_eq!(err, CatalogError::EmptyList("coding".to_string()));
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("Simple".parse::<CapabilityTier>().unwrap(), CapabilityTier::Simple);
        assert_eq!(" research ".parse::<CapabilityTier>().unwrap(), CapabilityTier::Research);
        assert!(matches!(
            "galaxy-brain".parse::<CapabilityTier>(),
            Err(CatalogError::UnknownTier(_))
        ));
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!(BackendKind::from_str("gemini"), Some(BackendKind::Gemini));
        assert_eq!(BackendKind::from_str("OpenAI"), Some(BackendKind::OpenAI));
        assert_eq!(BackendKind::from_str("unknown"), None);
    }

    #[test]
    fn test_cost_for() {
        let d = ProviderDescriptor::text(BackendKind::OpenAI, "gpt-4o", 0.0025, 0.01);
        let cost = d.cost_for(2000, 500);
        assert!((cost - (0.005 + 0.005)).abs() < 1e-12);

        let free = ProviderDescriptor::text(BackendKind::Groq, "free-model", 0.0, 0.0);
        assert_eq!(free.cost_for(1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn test_accepts_image() {
        let d = ProviderDescriptor::vision(BackendKind::Groq, "scout", 0.0, 0.0, 4.0);
        assert!(d.accepts_image(4 * 1024 * 1024));
        assert!(!d.accepts_image(4 * 1024 * 1024 + 1));

        let text_only = ProviderDescriptor::text(BackendKind::Groq, "small", 0.0, 0.0);
        assert!(!text_only.accepts_image(10));
    }
}
