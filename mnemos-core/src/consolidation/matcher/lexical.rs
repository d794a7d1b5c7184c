use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Observation, ObservationKind, PatternMatcher, SessionField};
use crate::consolidation::insights::text_key;
use crate::error::{MnemosError, Result};
use crate::session::{Outcome, Session};

/// Cache for compiled regex patterns to avoid recompilation.
static REGEX_CACHE: Lazy<std::sync::Mutex<HashMap<String, Regex>>> =
    Lazy::new(|| std::sync::Mutex::new(HashMap::new()));

/// A regex rule mapping session text to a principle or fact.
///
/// The first matching pattern wins. `template` may reference capture groups
/// using `${1}` syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalRule {
    pub name: String,
    pub topic: String,

    #[serde(default)]
    pub field: SessionField,

    pub patterns: Vec<String>,

    /// Only fire for sessions with this outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    #[serde(default)]
    pub kind: ObservationKind,

    pub template: String,
}

impl LexicalRule {
    /// Create a pattern rule over session feedback.
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        patterns: Vec<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            field: SessionField::Feedback,
            patterns,
            outcome: None,
            kind: ObservationKind::Pattern,
            template: template.into(),
        }
    }

    pub fn on_field(mut self, field: SessionField) -> Self {
        self.field = field;
        self
    }

    pub fn when_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Emit facts instead of patterns.
    pub fn as_fact(mut self) -> Self {
        self.kind = ObservationKind::Fact;
        self
    }
}

fn rule(name: &str, topic: &str, patterns: &[&str], template: &str) -> LexicalRule {
    LexicalRule::new(
        name,
        topic,
        patterns.iter().map(|p| p.to_string()).collect(),
        template,
    )
}

/// Built-in rules for common feedback about answer style.
pub fn default_rules() -> Vec<LexicalRule> {
    vec![
        rule(
            "concise",
            "response_length",
            &[
                r"(?i)\btoo (long|verbose|wordy|lengthy)\b",
                r"(?i)\b(shorter|more concise|get to the point|tl;?dr)\b",
            ],
            "User prefers concise answers",
        )
        .when_outcome(Outcome::Negative),
        rule(
            "detailed",
            "response_length",
            &[
                r"(?i)\btoo (short|brief|terse|vague)\b",
                r"(?i)\bmore (detail|depth|context)\b",
            ],
            "User prefers detailed answers",
        )
        .when_outcome(Outcome::Negative),
        rule(
            "casual_tone",
            "tone",
            &[r"(?i)\btoo (formal|stiff|robotic)\b"],
            "User prefers a casual tone",
        )
        .when_outcome(Outcome::Negative),
        rule(
            "formal_tone",
            "tone",
            &[r"(?i)\btoo (casual|informal|chatty)\b"],
            "User prefers a formal tone",
        )
        .when_outcome(Outcome::Negative),
        rule(
            "examples",
            "examples",
            &[
                r"(?i)\bexamples? (helped|was helpful|were helpful|made it clear)\b",
                r"(?i)\bthanks? for the examples?\b",
            ],
            "User values concrete examples",
        )
        .when_outcome(Outcome::Positive),
        rule(
            "name",
            "identity",
            &[r"(?i)\bmy name is ([a-z][a-z'-]*)"],
            "User's name is ${1}",
        )
        .on_field(SessionField::UserUtterance)
        .as_fact(),
        rule(
            "stack",
            "stack",
            &[r"(?i)\bi (?:mostly |usually )?(?:code|program|work) in ([a-z][a-z0-9+#.]*)"],
            "User works with ${1}",
        )
        .on_field(SessionField::UserUtterance)
        .as_fact(),
    ]
}

struct CompiledRule {
    rule: LexicalRule,
    regexes: Vec<Regex>,
}

impl CompiledRule {
    fn first_match(&self, text: &str) -> Option<String> {
        for regex in &self.regexes {
            if let Some(caps) = regex.captures(text) {
                let mut expanded = String::new();
                caps.expand(&self.rule.template, &mut expanded);
                let statement = expanded.split_whitespace().collect::<Vec<_>>().join(" ");
                if !statement.is_empty() {
                    return Some(statement);
                }
            }
        }
        None
    }
}

/// Rule-based matcher using regex patterns over session text.
pub struct LexicalRuleMatcher {
    rules: Vec<CompiledRule>,
}

impl LexicalRuleMatcher {
    /// Create a matcher from a rule set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a rule is incomplete or any regex is invalid.
    pub fn new(rules: Vec<LexicalRule>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.topic.trim().is_empty() || rule.template.trim().is_empty() {
                return Err(MnemosError::Configuration(format!(
                    "rule '{}' needs a topic and a template",
                    rule.name
                )));
            }
            if rule.patterns.is_empty() {
                return Err(MnemosError::Configuration(format!(
                    "rule '{}' has no patterns",
                    rule.name
                )));
            }
            let regexes = rule
                .patterns
                .iter()
                .map(|p| Self::compile_pattern(p))
                .collect::<Result<Vec<_>>>()?;
            compiled.push(CompiledRule { rule, regexes });
        }
        Ok(Self { rules: compiled })
    }

    /// Matcher with [`default_rules`].
    pub fn with_default_rules() -> Result<Self> {
        Self::new(default_rules())
    }

    /// Get or compile a regex pattern, using cache when available.
    fn compile_pattern(pattern: &str) -> Result<Regex> {
        let mut cache = REGEX_CACHE.lock().map_err(|e| {
            MnemosError::Configuration(format!("Failed to lock regex cache: {}", e))
        })?;

        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern).map_err(|e| {
            MnemosError::Configuration(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[async_trait]
impl PatternMatcher for LexicalRuleMatcher {
    async fn observe(&self, session: &Session) -> Result<Vec<Observation>> {
        let mut observations = Vec::new();
        let mut seen = HashSet::new();

        for compiled in &self.rules {
            let rule = &compiled.rule;
            if rule.outcome.is_some_and(|required| required != session.outcome) {
                continue;
            }

            let text = rule.field.text(session);
            let Some(statement) = compiled.first_match(&text) else {
                continue;
            };

            // Skip duplicates from overlapping rules
            if !seen.insert((rule.kind, text_key(&statement))) {
                continue;
            }

            tracing::debug!("Rule '{}' matched session {}", rule.name, session.id);
            observations.push(Observation {
                kind: rule.kind,
                topic: rule.topic.clone(),
                statement,
                strength: 1.0,
            });
        }

        Ok(observations)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(utterance: &str, feedback: &str, outcome: Outcome) -> Session {
        Session::builder(utterance, "Here is a long explanation...")
            .feedback(feedback)
            .outcome(outcome)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_too_long_feedback_yields_concise_principle() {
        let matcher = LexicalRuleMatcher::with_default_rules().unwrap();
        let observations = matcher
            .observe(&session("Explain async", "This was way too long", Outcome::Negative))
            .await
            .unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].statement, "User prefers concise answers");
        assert_eq!(observations[0].topic, "response_length");
        assert_eq!(observations[0].kind, ObservationKind::Pattern);
    }

    #[tokio::test]
    async fn test_outcome_filter() {
        let matcher = LexicalRuleMatcher::with_default_rules().unwrap();
        let observations = matcher
            .observe(&session("Explain async", "too long but fine", Outcome::Positive))
            .await
            .unwrap();

        assert!(observations.is_empty());
    }

    #[tokio::test]
    async fn test_fact_template_expands_capture() {
        let matcher = LexicalRuleMatcher::with_default_rules().unwrap();
        let observations = matcher
            .observe(&session("Hi, my name is Ada and I work in Rust", "", Outcome::Neutral))
            .await
            .unwrap();

        let facts: Vec<_> = observations
            .iter()
            .filter(|o| o.kind == ObservationKind::Fact)
            .map(|o| o.statement.as_str())
            .collect();
        assert_eq!(facts, vec!["User's name is Ada", "User works with Rust"]);
    }

    #[tokio::test]
    async fn test_custom_rule() {
        let rules = vec![LexicalRule::new(
            "bullets",
            "format",
            vec![r"(?i)\bbullet points?\b".to_string()],
            "User likes bullet points",
        )];
        let matcher = LexicalRuleMatcher::new(rules).unwrap();
        let observations = matcher
            .observe(&session("q", "use bullet points please", Outcome::Neutral))
            .await
            .unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(matcher.name(), "lexical");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let rules = vec![LexicalRule::new("bad", "t", vec!["(".to_string()], "x")];
        assert!(matches!(
            LexicalRuleMatcher::new(rules),
            Err(MnemosError::Configuration(_))
        ));
    }

    #[test]
    fn test_rule_without_patterns_rejected() {
        let rules = vec![LexicalRule::new("empty", "t", vec![], "x")];
        assert!(LexicalRuleMatcher::new(rules).is_err());
    }
}
