use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::llm::{with_retry, LLMProvider, ReasoningContext, RetryConfig};
use crate::session::Session;

use super::confidence::ConfidenceCurve;
use super::config::ConsolidationConfig;
use super::insights::{text_key, Fact, Insights, Pattern, Reflection};
use super::matcher::{LexicalRuleMatcher, Observation, ObservationKind, PatternMatcher};

/// Memory consolidation engine.
///
/// Turns sessions into insights: principles with confidence and evidence
/// counts, and facts. The engine holds only thresholds and injected
/// collaborators; it never owns memory state, so the same engine can serve
/// any number of users.
///
/// # Example
///
/// ```rust,ignore
/// use mnemos_core::consolidation::{ConsolidationConfig, ConsolidationEngine};
///
/// let engine = ConsolidationEngine::with_lexical_defaults()?;
///
/// let insights = engine.consolidate(&session).await?;
/// let patterns = engine.extract_patterns(&episodes).await?;
/// ```
pub struct ConsolidationEngine {
    matcher: Arc<dyn PatternMatcher>,
    llm: Option<Arc<dyn LLMProvider>>,
    config: ConsolidationConfig,
    retry: RetryConfig,
}

/// Observations of one principle gathered across sessions.
struct Group {
    topic: String,
    principle: String,
    provenance: Vec<String>,
    last_evidence_at: DateTime<Utc>,
}

impl ConsolidationEngine {
    /// Create a new consolidation engine.
    pub fn new(matcher: Arc<dyn PatternMatcher>, config: ConsolidationConfig) -> Self {
        Self {
            matcher,
            llm: None,
            config,
            retry: RetryConfig::default(),
        }
    }

    /// Engine using the built-in lexical rules and default thresholds.
    pub fn with_lexical_defaults() -> Result<Self> {
        let matcher = LexicalRuleMatcher::with_default_rules()?;
        Ok(Self::new(Arc::new(matcher), ConsolidationConfig::default()))
    }

    /// Attach the reasoning provider used by [`reflect`](Self::reflect).
    pub fn with_reasoner(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Retry policy for reasoning calls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    pub fn curve(&self) -> ConfidenceCurve {
        self.config.curve()
    }

    pub fn has_reasoner(&self) -> bool {
        self.llm.is_some()
    }

    /// Consolidate a single session.
    ///
    /// One session is one piece of evidence, so with the default floor every
    /// principle lands in [`Insights::candidates`] with its confidence capped
    /// below `min_confidence`. Facts are reported as extracted.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed session and a collaborator
    /// error if the matcher's embedding provider fails.
    pub async fn consolidate(&self, session: &Session) -> Result<Insights> {
        session.validate()?;

        let observations = self.matcher.observe(session).await?;
        let curve = self.curve();
        let mut insights = Insights::default();

        let mut groups = Vec::new();
        for observation in &observations {
            match observation.kind {
                ObservationKind::Pattern => groups.push(Group {
                    topic: observation.topic.clone(),
                    principle: observation.statement.clone(),
                    provenance: vec![session.id.clone()],
                    last_evidence_at: session.timestamp,
                }),
                ObservationKind::Fact => {
                    let fact = self.fact_from(observation, &session.id)?;
                    match insights.facts.iter_mut().find(|f| f.key() == fact.key()) {
                        Some(existing) => existing.absorb(fact),
                        None => insights.facts.push(fact),
                    }
                }
            }
        }

        for group in resolve_contradictions(groups) {
            let strength = observations
                .iter()
                .find(|o| o.kind == ObservationKind::Pattern && o.statement == group.principle)
                .map_or(1.0, |o| o.strength);
            let confidence = curve.cap(curve.score(1) * strength, 1);
            let pattern = Pattern::new(group.principle, group.topic, confidence, group.provenance)?
                .with_last_evidence_at(group.last_evidence_at);

            if curve.is_corroborated(pattern.confidence, pattern.evidence_count) {
                insights.patterns.push(pattern);
            } else {
                insights.candidates.push(pattern);
            }
        }

        tracing::debug!(
            "Consolidated session {} with {} matcher: {} patterns, {} candidates, {} facts",
            session.id,
            self.matcher.name(),
            insights.patterns.len(),
            insights.candidates.len(),
            insights.facts.len()
        );

        Ok(insights)
    }

    /// Extract recurring principles from an ordered batch of sessions.
    ///
    /// Evidence is the number of distinct sessions supporting a principle.
    /// Only principles with at least `min_evidence` sessions and
    /// `min_confidence` are emitted. When several principles share a topic,
    /// the one with more evidence wins, then the one with the most recent
    /// evidence. Output is sorted by confidence, highest first.
    ///
    /// # Errors
    ///
    /// Every episode is validated before any matching happens.
    pub async fn extract_patterns(&self, episodes: &[Session]) -> Result<Vec<Pattern>> {
        for episode in episodes {
            episode.validate()?;
        }

        let curve = self.curve();
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for episode in episodes {
            for observation in self.matcher.observe(episode).await? {
                if observation.kind != ObservationKind::Pattern {
                    continue;
                }
                let key = (observation.topic.clone(), text_key(&observation.statement));
                match index.get(&key) {
                    Some(&idx) => {
                        let group = &mut groups[idx];
                        if !group.provenance.contains(&episode.id) {
                            group.provenance.push(episode.id.clone());
                        }
                        group.last_evidence_at = group.last_evidence_at.max(episode.timestamp);
                    }
                    None => {
                        index.insert(key, groups.len());
                        groups.push(Group {
                            topic: observation.topic,
                            principle: observation.statement,
                            provenance: vec![episode.id.clone()],
                            last_evidence_at: episode.timestamp,
                        });
                    }
                }
            }
        }

        let observed = groups.len();
        let corroborated: Vec<Group> = groups
            .into_iter()
            .filter(|g| {
                let evidence = g.provenance.len();
                curve.is_corroborated(curve.score(evidence), evidence)
            })
            .collect();

        let mut patterns = Vec::new();
        for group in resolve_contradictions(corroborated) {
            let confidence = curve.score(group.provenance.len());
            patterns.push(
                Pattern::new(group.principle, group.topic, confidence, group.provenance)?
                    .with_last_evidence_at(group.last_evidence_at),
            );
        }

        patterns.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.principle.cmp(&b.principle))
        });

        tracing::info!(
            "Extracted {} patterns from {} episodes ({} principles observed)",
            patterns.len(),
            episodes.len(),
            observed
        );

        Ok(patterns)
    }

    /// Ask the reasoning provider why the session turned out the way it did.
    ///
    /// A missing or failing provider yields [`Reflection::Unavailable`]; only a
    /// malformed session is an error.
    pub async fn reflect(&self, session: &Session) -> Result<Reflection> {
        session.validate()?;

        let Some(llm) = &self.llm else {
            return Ok(Reflection::Unavailable {
                reason: "no reasoning provider configured".to_string(),
            });
        };

        let prompt = reflection_prompt(session);
        let context = ReasoningContext::new()
            .with("session_id", session.id.as_str())
            .with("outcome", session.outcome.as_str());

        match with_retry(&self.retry, || llm.generate(&prompt, &context)).await {
            Ok(text) if text.trim().is_empty() => Ok(Reflection::Unavailable {
                reason: "reasoning provider returned an empty analysis".to_string(),
            }),
            Ok(text) => Ok(Reflection::Available {
                analysis: text.trim().to_string(),
            }),
            Err(e) => {
                tracing::warn!(
                    "Reflection unavailable for session {} ({}): {}",
                    session.id,
                    llm.model_info().provider,
                    e
                );
                Ok(Reflection::Unavailable {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn fact_from(&self, observation: &Observation, session_id: &str) -> Result<Fact> {
        let confidence = (observation.strength * self.config.fact_confidence).clamp(0.0, 1.0);
        Fact::new(
            observation.statement.clone(),
            confidence,
            vec![session_id.to_string()],
        )
    }
}

/// Keep one principle per topic: most evidence, then most recent, then alphabetical.
fn resolve_contradictions(groups: Vec<Group>) -> Vec<Group> {
    let mut winners: BTreeMap<String, Group> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();

    for group in groups {
        let topic = group.topic.clone();
        match winners.get(&topic) {
            None => {
                order.push(topic.clone());
                winners.insert(topic, group);
            }
            Some(current) if beats(&group, current) => {
                tracing::debug!(
                    "Principle '{}' supersedes '{}' for topic '{}'",
                    group.principle,
                    current.principle,
                    topic
                );
                winners.insert(topic, group);
            }
            Some(current) => {
                tracing::debug!(
                    "Principle '{}' loses to '{}' for topic '{}'",
                    group.principle,
                    current.principle,
                    topic
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|topic| winners.remove(&topic))
        .collect()
}

fn beats(challenger: &Group, current: &Group) -> bool {
    challenger
        .provenance
        .len()
        .cmp(&current.provenance.len())
        .then_with(|| challenger.last_evidence_at.cmp(&current.last_evidence_at))
        .then_with(|| current.principle.cmp(&challenger.principle))
        .is_gt()
}

fn reflection_prompt(session: &Session) -> String {
    let feedback = if session.feedback.trim().is_empty() {
        "(none)"
    } else {
        session.feedback.as_str()
    };

    format!(
        r#"Analyze this interaction and explain why the outcome was {outcome}.

USER:
{utterance}

AGENT:
{response}

FEEDBACK:
{feedback}

Describe what worked or failed and one principle the agent should keep in mind next time."#,
        outcome = session.outcome,
        utterance = session.user_utterance,
        response = session.agent_response,
        feedback = feedback,
    )
}
