//! Long-term memory: profile attributes, learned patterns and facts

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consolidation::{ConfidenceCurve, Fact, Insights, Pattern};
use crate::error::{MnemosError, Result};

/// Recognized long-term memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Attribute map, merged key by key
    Profile,
    Patterns,
    Facts,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Patterns => "patterns",
            Self::Facts => "facts",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = MnemosError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "profile" | "user_profile" => Ok(Self::Profile),
            "patterns" => Ok(Self::Patterns),
            "facts" => Ok(Self::Facts),
            other => Err(MnemosError::InvalidCategory(other.to_string())),
        }
    }
}

/// A typed long-term update.
#[derive(Debug, Clone, PartialEq)]
pub enum LongTermUpdate {
    Profile(BTreeMap<String, Value>),
    Patterns(Vec<Pattern>),
    Facts(Vec<Fact>),
}

/// Decode `data` as one record or an array of records.
fn one_or_many<T: DeserializeOwned>(category: MemoryCategory, data: Value) -> Result<Vec<T>> {
    let decoded = match data {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>(),
        single => serde_json::from_value(single).map(|record| vec![record]),
    };

    decoded.map_err(|e| {
        MnemosError::validation(format!("invalid {} record: {}", category, e))
    })
}

impl LongTermUpdate {
    /// Decode an untyped update.
    ///
    /// # Errors
    ///
    /// `InvalidCategory` for an unknown category, `Validation` when `data` does
    /// not have the category's shape. Nothing is partially decoded.
    pub fn from_json(category: &str, data: Value) -> Result<Self> {
        let category: MemoryCategory = category.parse()?;

        let update = match category {
            MemoryCategory::Profile => {
                let maps: Vec<BTreeMap<String, Value>> = one_or_many(category, data)?;
                Self::Profile(maps.into_iter().flatten().collect())
            }
            MemoryCategory::Patterns => Self::Patterns(one_or_many(category, data)?),
            MemoryCategory::Facts => Self::Facts(one_or_many(category, data)?),
        };
        update.validate()?;
        Ok(update)
    }

    pub fn category(&self) -> MemoryCategory {
        match self {
            Self::Profile(_) => MemoryCategory::Profile,
            Self::Patterns(_) => MemoryCategory::Patterns,
            Self::Facts(_) => MemoryCategory::Facts,
        }
    }

    /// Check every record before anything is applied.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Profile(entries) => {
                if entries.keys().any(|k| k.trim().is_empty()) {
                    return Err(MnemosError::validation("profile keys must not be empty"));
                }
                Ok(())
            }
            Self::Patterns(patterns) => patterns.iter().try_for_each(Pattern::validate),
            Self::Facts(facts) => facts.iter().try_for_each(Fact::validate),
        }
    }
}

impl From<Insights> for Vec<LongTermUpdate> {
    fn from(insights: Insights) -> Self {
        let mut patterns = insights.patterns;
        patterns.extend(insights.candidates);

        let mut updates = Vec::with_capacity(2);
        if !patterns.is_empty() {
            updates.push(LongTermUpdate::Patterns(patterns));
        }
        if !insights.facts.is_empty() {
            updates.push(LongTermUpdate::Facts(insights.facts));
        }
        updates
    }
}

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub merged: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.added + self.merged
    }
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.merged += other.merged;
    }
}

/// Consolidated knowledge about one user.
///
/// Principle text is unique among patterns and statement text among facts;
/// both are compared case and whitespace insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermProfile {
    #[serde(default)]
    pub profile: BTreeMap<String, Value>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub facts: Vec<Fact>,
}

impl LongTermProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(&self, principle: &str) -> Option<&Pattern> {
        let key = crate::consolidation::insights::text_key(principle);
        self.patterns.iter().find(|p| p.key() == key)
    }

    pub fn fact(&self, statement: &str) -> Option<&Fact> {
        let key = crate::consolidation::insights::text_key(statement);
        self.facts.iter().find(|f| f.key() == key)
    }

    /// Apply a validated update.
    pub fn apply(&mut self, update: LongTermUpdate, curve: &ConfidenceCurve) -> MergeStats {
        match update {
            LongTermUpdate::Profile(entries) => self.merge_profile(entries),
            LongTermUpdate::Patterns(patterns) => self.merge_patterns(patterns, curve),
            LongTermUpdate::Facts(facts) => self.merge_facts(facts),
        }
    }

    /// Last write wins per key.
    pub fn merge_profile(&mut self, entries: BTreeMap<String, Value>) -> MergeStats {
        let mut stats = MergeStats::default();
        for (key, value) in entries {
            match self.profile.insert(key, value) {
                Some(_) => stats.merged += 1,
                None => stats.added += 1,
            }
        }
        stats
    }

    /// Merge patterns by principle text.
    ///
    /// Provenance is unioned and confidence re-scored, so merging the same
    /// pattern twice leaves the profile unchanged.
    pub fn merge_patterns(&mut self, patterns: Vec<Pattern>, curve: &ConfidenceCurve) -> MergeStats {
        let mut stats = MergeStats::default();
        for incoming in patterns {
            let incoming = incoming.normalized(curve);
            let key = incoming.key();
            match self.patterns.iter_mut().find(|p| p.key() == key) {
                Some(existing) => {
                    existing.absorb(incoming, curve);
                    stats.merged += 1;
                }
                None => {
                    self.patterns.push(incoming);
                    stats.added += 1;
                }
            }
        }
        stats
    }

    /// Merge facts by statement text.
    pub fn merge_facts(&mut self, facts: Vec<Fact>) -> MergeStats {
        let mut stats = MergeStats::default();
        for incoming in facts {
            let key = incoming.key();
            match self.facts.iter_mut().find(|f| f.key() == key) {
                Some(existing) => {
                    existing.absorb(incoming);
                    stats.merged += 1;
                }
                None => {
                    self.facts.push(incoming);
                    stats.added += 1;
                }
            }
        }
        stats
    }

    /// Repair a profile read from storage: fold duplicate principles and
    /// statements together and enforce the evidence floor.
    pub fn normalized(self, curve: &ConfidenceCurve) -> Self {
        let mut clean = Self {
            profile: self.profile,
            ..Self::default()
        };
        clean.merge_patterns(self.patterns, curve);
        clean.merge_facts(self.facts);
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("profile".parse::<MemoryCategory>().unwrap(), MemoryCategory::Profile);
        assert_eq!(
            "user_profile".parse::<MemoryCategory>().unwrap(),
            MemoryCategory::Profile
        );
        assert!(matches!(
            "preferences".parse::<MemoryCategory>(),
            Err(MnemosError::InvalidCategory(c)) if c == "preferences"
        ));
    }

    #[test]
    fn test_update_from_single_record_and_array() {
        let single = LongTermUpdate::from_json(
            "patterns",
            json!({ "principle": "User prefers concise answers", "confidence": 0.2 }),
        )
        .unwrap();
        assert!(matches!(single, LongTermUpdate::Patterns(ref p) if p.len() == 1));

        let many = LongTermUpdate::from_json(
            "facts",
            json!([
                { "statement": "User's name is Ada", "confidence": 0.8 },
                { "statement": "User works with Rust", "confidence": 0.8 }
            ]),
        )
        .unwrap();
        assert_eq!(many.category(), MemoryCategory::Facts);
    }

    #[test]
    fn test_update_shape_mismatch_is_validation_error() {
        let err = LongTermUpdate::from_json("patterns", json!({ "confidence": "high" })).unwrap_err();
        assert!(matches!(err, MnemosError::Validation(_)));

        let err = LongTermUpdate::from_json("profile", json!("concise")).unwrap_err();
        assert!(matches!(err, MnemosError::Validation(_)));

        // One bad record rejects the whole batch
        let err = LongTermUpdate::from_json(
            "facts",
            json!([{ "statement": "ok", "confidence": 0.5 }, { "statement": "", "confidence": 0.5 }]),
        )
        .unwrap_err();
        assert!(matches!(err, MnemosError::Validation(_)));
    }

    #[test]
    fn test_profile_merge_last_write_wins() {
        let mut long_term = LongTermProfile::new();
        let update = LongTermUpdate::from_json(
            "profile",
            json!([{ "tone": "formal", "language": "en" }, { "tone": "casual" }]),
        )
        .unwrap();

        long_term.apply(update, &ConfidenceCurve::default());

        assert_eq!(long_term.profile["tone"], json!("casual"));
        assert_eq!(long_term.profile["language"], json!("en"));
    }

    #[test]
    fn test_pattern_merge_is_idempotent() {
        let curve = ConfidenceCurve::default();
        let pattern = Pattern::new(
            "User prefers concise answers",
            "response_length",
            curve.score(2),
            ids(&["s1", "s2"]),
        )
        .unwrap();

        let mut long_term = LongTermProfile::new();
        let first = long_term.merge_patterns(vec![pattern.clone()], &curve);
        let second = long_term.merge_patterns(vec![pattern], &curve);

        assert_eq!(first, MergeStats { added: 1, merged: 0 });
        assert_eq!(second, MergeStats { added: 0, merged: 1 });
        assert_eq!(long_term.patterns.len(), 1);
        assert_eq!(long_term.patterns[0].evidence_count, 2);
    }

    #[test]
    fn test_pattern_merge_accumulates_distinct_sessions() {
        let curve = ConfidenceCurve::default();
        let mut long_term = LongTermProfile::new();

        for id in ["s1", "s2", "s3"] {
            let candidate =
                Pattern::new("User prefers concise answers", "response_length", curve.score(1), ids(&[id]))
                    .unwrap();
            long_term.merge_patterns(vec![candidate], &curve);
        }

        let merged = long_term.pattern("user prefers concise answers").unwrap();
        assert_eq!(merged.evidence_count, 3);
        assert!((merged.confidence - curve.score(3)).abs() < 1e-12);
    }

    #[test]
    fn test_insights_become_updates() {
        let curve = ConfidenceCurve::default();
        let insights = Insights {
            candidates: vec![Pattern::new("p", "t", curve.score(1), ids(&["s1"])).unwrap()],
            facts: vec![Fact::new("f", 0.8, ids(&["s1"])).unwrap()],
            ..Insights::default()
        };

        let updates: Vec<LongTermUpdate> = insights.into();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].category(), MemoryCategory::Patterns);
    }

    #[test]
    fn test_normalized_folds_duplicates() {
        let curve = ConfidenceCurve::default();
        let long_term = LongTermProfile {
            patterns: vec![
                Pattern::new("Prefers short", "len", 0.25, ids(&["s1"])).unwrap(),
                Pattern::new("prefers  SHORT", "len", 0.25, ids(&["s2"])).unwrap(),
            ],
            ..LongTermProfile::default()
        };

        let clean = long_term.normalized(&curve);
        assert_eq!(clean.patterns.len(), 1);
        assert_eq!(clean.patterns[0].evidence_count, 2);
    }
}
