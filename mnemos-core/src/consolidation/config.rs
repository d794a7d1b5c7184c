use serde::{Deserialize, Serialize};

use super::confidence::ConfidenceCurve;
use crate::error::{MnemosError, Result};

/// Configuration for the consolidation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Minimum confidence for a pattern to be reported (default: 0.3)
    pub min_confidence: f64,

    /// Minimum number of independent sessions backing a pattern (default: 2)
    pub min_evidence: usize,

    /// Per-session contribution to the confidence curve (default: 0.25)
    pub base_rate: f64,

    /// Confidence assigned to facts extracted at full match strength (default: 0.8)
    pub fact_confidence: f64,

    /// Whether `MemorySystem::ingest` asks the reasoning provider for a reflection (default: true)
    pub reflect_on_ingest: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            min_evidence: 2,
            base_rate: 0.25,
            fact_confidence: 0.8,
            reflect_on_ingest: true,
        }
    }
}

impl ConsolidationConfig {
    /// Create a new consolidation configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum reported confidence.
    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the minimum evidence floor.
    pub fn with_min_evidence(mut self, evidence: usize) -> Self {
        self.min_evidence = evidence.max(1); // Ensure at least 1
        self
    }

    /// Set the per-session contribution to confidence.
    pub fn with_base_rate(mut self, rate: f64) -> Self {
        self.base_rate = rate;
        self
    }

    pub fn with_fact_confidence(mut self, confidence: f64) -> Self {
        self.fact_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_reflect_on_ingest(mut self, enabled: bool) -> Self {
        self.reflect_on_ingest = enabled;
        self
    }

    /// The confidence curve these thresholds describe.
    pub fn curve(&self) -> ConfidenceCurve {
        ConfidenceCurve::new(self.base_rate, self.min_confidence, self.min_evidence)
    }

    /// Check that thresholds are in range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(MnemosError::Configuration(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.min_evidence == 0 {
            return Err(MnemosError::Configuration(
                "min_evidence must be at least 1".to_string(),
            ));
        }
        if !(self.base_rate > 0.0 && self.base_rate <= 1.0) {
            return Err(MnemosError::Configuration(format!(
                "base_rate must be within (0, 1], got {}",
                self.base_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.fact_confidence) {
            return Err(MnemosError::Configuration(format!(
                "fact_confidence must be within [0, 1], got {}",
                self.fact_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConsolidationConfig::default();
        assert_eq!(config.min_confidence, 0.3);
        assert_eq!(config.min_evidence, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConsolidationConfig::new()
            .with_min_confidence(0.5)
            .with_min_evidence(3)
            .with_reflect_on_ingest(false);

        assert_eq!(config.min_confidence, 0.5);
        assert_eq!(config.min_evidence, 3);
        assert!(!config.reflect_on_ingest);
    }

    #[test]
    fn test_min_evidence_minimum() {
        let config = ConsolidationConfig::new().with_min_evidence(0);
        assert_eq!(config.min_evidence, 1);
    }

    #[test]
    fn test_invalid_base_rate() {
        let config = ConsolidationConfig::new().with_base_rate(0.0);
        assert!(matches!(
            config.validate(),
            Err(MnemosError::Configuration(_))
        ));
    }
}
