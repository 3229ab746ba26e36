//! Importance assessment
//!
//! The engine asks an [`ImportanceAssessor`] how much a piece of content is
//! worth keeping. The score gates storage (below the configured threshold
//! nothing is written) and feeds recall ranking.

use async_trait::async_trait;
use mnemon_core::MemoryContext;

use crate::SDKResult;

/// (content, context) → score in [0, 1].
#[async_trait]
pub trait ImportanceAssessor: Send + Sync {
    async fn assess(&self, content: &str, context: MemoryContext) -> SDKResult<f64>;
}

/// Words that usually mark durable, actionable statements
const SIGNAL_WORDS: [&str; 8] = [
    "always", "never", "must", "important", "prefer", "remember", "critical", "decided",
];

/// Rule-based assessor: a per-context base score adjusted for length and
/// signal words.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAssessor;

impl HeuristicAssessor {
    fn base_score(context: MemoryContext) -> f64 {
        match context {
            MemoryContext::TaskCritical => 0.8,
            MemoryContext::UserPreference => 0.7,
            MemoryContext::Decision => 0.7,
            MemoryContext::ErrorPattern => 0.6,
            MemoryContext::ProjectKnowledge => 0.55,
            MemoryContext::CodeSymbol => 0.5,
            MemoryContext::General => 0.4,
            MemoryContext::Conversation => 0.3,
        }
    }

    pub fn score(&self, content: &str, context: MemoryContext) -> f64 {
        let mut score = Self::base_score(context);
        let trimmed = content.trim();

        if trimmed.chars().count() < 10 {
            score -= 0.2;
        } else {
            // Up to +0.1 for longer, more specific content
            let words = trimmed.split_whitespace().count() as f64;
            score += (words / 50.0).min(1.0) * 0.1;
        }

        let lowered = trimmed.to_lowercase();
        let signals = SIGNAL_WORDS
            .iter()
            .filter(|word| lowered.contains(*word))
            .count() as f64;
        score += (signals * 0.05).min(0.15);

        score.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl ImportanceAssessor for HeuristicAssessor {
    async fn assess(&self, content: &str, context: MemoryContext) -> SDKResult<f64> {
        Ok(self.score(content, context))
    }
}

/// Assessor returning the same score for everything.
#[derive(Debug, Clone, Copy)]
pub struct FixedAssessor(pub f64);

#[async_trait]
impl ImportanceAssessor for FixedAssessor {
    async fn assess(&self, _content: &str, _context: MemoryContext) -> SDKResult<f64> {
        Ok(self.0)
    }
}
