//! Evidence-to-confidence mapping

use serde::{Deserialize, Serialize};

/// Gap kept between provisional confidence and `min_confidence`.
const PROVISIONAL_MARGIN: f64 = 1e-9;

/// Maps an evidence count to a confidence score.
///
/// `score(n) = 1 - (1 - base_rate)^n`, capped strictly below `min_confidence`
/// while `n < min_evidence`. The result is non-decreasing in `n` and always in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceCurve {
    pub base_rate: f64,
    pub min_confidence: f64,
    pub min_evidence: usize,
}

impl Default for ConfidenceCurve {
    fn default() -> Self {
        Self::new(0.25, 0.3, 2)
    }
}

impl ConfidenceCurve {
    pub fn new(base_rate: f64, min_confidence: f64, min_evidence: usize) -> Self {
        Self {
            base_rate: base_rate.clamp(0.0, 1.0),
            min_confidence: min_confidence.clamp(0.0, 1.0),
            min_evidence: min_evidence.max(1),
        }
    }

    /// Confidence for a principle backed by `evidence` independent sessions.
    pub fn score(&self, evidence: usize) -> f64 {
        if evidence == 0 {
            return 0.0;
        }
        let exponent = i32::try_from(evidence).unwrap_or(i32::MAX);
        let raw = 1.0 - (1.0 - self.base_rate).powi(exponent);
        self.cap(raw, evidence)
    }

    /// Clamp a confidence to `[0, 1]` and enforce the evidence floor.
    pub fn cap(&self, confidence: f64, evidence: usize) -> f64 {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        if evidence < self.min_evidence {
            confidence.min(self.provisional_ceiling())
        } else {
            confidence
        }
    }

    /// Highest confidence reportable below the evidence floor.
    pub fn provisional_ceiling(&self) -> f64 {
        (self.min_confidence - PROVISIONAL_MARGIN).max(0.0)
    }

    /// Whether a pattern with these numbers clears both thresholds.
    pub fn is_corroborated(&self, confidence: f64, evidence: usize) -> bool {
        evidence >= self.min_evidence && confidence >= self.min_confidence
    }
}
