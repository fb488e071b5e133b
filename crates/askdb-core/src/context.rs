//! Decides how much conversation state a question gets to see.
//!
//! A question that refers back ("this", "same", "last", ...) or is short
//! enough to be an elliptical follow-up gets the session history and last
//! entity. Anything else is a fresh start: the session still holds its state,
//! but none of it reaches the model, so stale filters never leak into a new
//! topic.

use once_cell::sync::Lazy;
use regex::Regex;

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(this|that|these|those|it|its|they|them|same|previous|above|last|earlier)\b")
        .expect("valid reference regex")
});

/// Questions this short are treated as follow-ups.
///
/// Short new topics ("list all customers") also land here; kept that way on
/// purpose, see DESIGN.md.
const FOLLOW_UP_MAX_WORDS: usize = 3;

/// Whether `question` should be resolved against prior conversation state.
pub fn requires_context(question: &str) -> bool {
    let lowered = question.trim().to_lowercase();
    if REFERENCE_RE.is_match(&lowered) {
        return true;
    }
    lowered.split_whitespace().count() <= FOLLOW_UP_MAX_WORDS
}

/// The conversation state actually forwarded downstream for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextScope {
    /// History text for the model; empty on a fresh start.
    pub history: String,
    /// Entity hint for the model; `None` on a fresh start.
    pub entity: Option<String>,
    /// True when the question must also be rewritten against the history.
    pub uses_context: bool,
}

impl ContextScope {
    /// Apply the policy to one question.
    pub fn decide(question: &str, history: &str, last_entity: Option<&str>) -> Self {
        if requires_context(question) {
            Self {
                history: history.to_string(),
                entity: last_entity.map(str::to_string),
                uses_context: true,
            }
        } else {
            Self::fresh()
        }
    }

    /// Nothing from the session is forwarded.
    pub fn fresh() -> Self {
        Self {
            history: String::new(),
            entity: None,
            uses_context: false,
        }
    }
}
