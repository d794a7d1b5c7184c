//! Recorded interaction sessions

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MnemosError, Result};

/// How an interaction turned out, as judged by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = MnemosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(MnemosError::validation(format!("unknown outcome '{}'", other))),
        }
    }
}

/// One recorded interaction turn.
///
/// Sessions are immutable once built. Use [`Session::builder`] to construct one;
/// `build` validates the required fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier
    pub id: String,

    /// What the user said
    pub user_utterance: String,

    /// What the agent answered
    pub agent_response: String,

    /// Free-text feedback from the user (may be empty)
    #[serde(default)]
    pub feedback: String,

    /// Outcome tag
    #[serde(default)]
    pub outcome: Outcome,

    /// Free-form context
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,

    /// When the interaction happened
    pub timestamp: DateTime<Utc>,
}

impl Session {
    /// Start building a session from the two required text fields.
    pub fn builder(
        user_utterance: impl Into<String>,
        agent_response: impl Into<String>,
    ) -> SessionBuilder {
        SessionBuilder {
            id: None,
            user_utterance: user_utterance.into(),
            agent_response: agent_response.into(),
            feedback: String::new(),
            outcome: Outcome::Neutral,
            context: HashMap::new(),
            timestamp: None,
        }
    }

    /// Check the required fields.
    ///
    /// Sessions created through the builder are always valid; this exists for
    /// sessions that arrive through deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(MnemosError::validation("session id must not be empty"));
        }
        if self.user_utterance.trim().is_empty() {
            return Err(MnemosError::validation(format!(
                "session {}: user_utterance must not be empty",
                self.id
            )));
        }
        if self.agent_response.trim().is_empty() {
            return Err(MnemosError::validation(format!(
                "session {}: agent_response must not be empty",
                self.id
            )));
        }
        Ok(())
    }

    /// All free text of the session, used for lexical matching.
    pub fn text(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.user_utterance, self.agent_response, self.feedback
        )
    }
}

/// Builder for [`Session`]
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    id: Option<String>,
    user_utterance: String,
    agent_response: String,
    feedback: String,
    outcome: Outcome,
    context: HashMap<String, serde_json::Value>,
    timestamp: Option<DateTime<Utc>>,
}

impl SessionBuilder {
    /// Use an explicit id instead of a generated UUID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Add a context entry.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate and build the session.
    pub fn build(self) -> Result<Session> {
        let session = Session {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_utterance: self.user_utterance,
            agent_response: self.agent_response,
            feedback: self.feedback,
            outcome: self.outcome,
            context: self.context,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        session.validate()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_generates_id_and_timestamp() {
        let session = Session::builder("Explain lifetimes", "Lifetimes are...")
            .feedback("Too long")
            .outcome(Outcome::Negative)
            .context("topic", "rust")
            .build()
            .unwrap();

        assert!(uuid::Uuid::parse_str(&session.id).is_ok());
        assert_eq!(session.outcome, Outcome::Negative);
        assert_eq!(session.context["topic"], "rust");
    }

    #[test]
    fn test_builder_rejects_blank_utterance() {
        let err = Session::builder("   ", "answer").build().unwrap_err();
        assert!(matches!(err, MnemosError::Validation(_)));
    }

    #[test]
    fn test_builder_rejects_blank_response() {
        let err = Session::builder("question", "").build().unwrap_err();
        assert!(matches!(err, MnemosError::Validation(_)));
    }

    #[test]
    fn test_deserialized_session_validation() {
        let json = serde_json::json!({
            "id": "s-1",
            "user_utterance": "hi",
            "agent_response": "",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.outcome, Outcome::Neutral);
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_outcome_parsing() {
        assert_eq!("Negative".parse::<Outcome>().unwrap(), Outcome::Negative);
        assert_eq!(Outcome::Positive.to_string(), "positive");
        assert!("great".parse::<Outcome>().is_err());
    }
}
