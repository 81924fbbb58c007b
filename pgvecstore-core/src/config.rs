//! Store configuration.

use crate::error::Result;
use crate::ident::validate_schema_name;

/// Configuration for a [`VectorStore`](crate::VectorStore).
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Schema holding the index tables.
    pub schema: String,
    /// Discover existing indexes in the background at construction.
    pub warmup: bool,
    /// Hybrid search considers `top_k * factor` candidates from each side.
    pub hybrid_candidate_factor: u32,
    /// Lower bound on the hybrid candidate pool.
    pub min_hybrid_candidates: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            warmup: true,
            hybrid_candidate_factor: 4,
            min_hybrid_candidates: 20,
        }
    }
}

impl StoreConfig {
    /// Creates a config using the `public` schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema. Chainable.
    pub fn with_schema<S: Into<String>>(mut self, schema: S) -> Self {
        self.schema = schema.into();
        self
    }

    /// Enables or disables the background warmup. Chainable.
    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    /// Sets the hybrid candidate factor. Chainable.
    pub fn with_hybrid_candidate_factor(mut self, factor: u32) -> Self {
        self.hybrid_candidate_factor = factor.max(1);
        self
    }

    /// Checks the schema name.
    pub fn validate(&self) -> Result<()> {
        validate_schema_name(&self.schema)
    }

    /// Candidate pool size for a hybrid query returning `top_k` rows.
    pub fn hybrid_pool(&self, top_k: u32) -> u32 {
        top_k
            .saturating_mul(self.hybrid_candidate_factor)
            .max(self.min_hybrid_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .with_schema("vectors")
            .with_warmup(false)
            .with_hybrid_candidate_factor(0);
        assert_eq!(config.schema, "vectors");
        assert!(!config.warmup);
        assert_eq!(config.hybrid_candidate_factor, 1);
        assert!(config.validate().is_ok());
        assert!(StoreConfig::new().with_schema("bad schema").validate().is_err());
    }

    #[test]
    fn test_hybrid_pool() {
        let config = StoreConfig::default();
        assert_eq!(config.hybrid_pool(2), 20);
        assert_eq!(config.hybrid_pool(10), 40);
    }
}
