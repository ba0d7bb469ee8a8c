//! Model Router
//!
//! Selects which model tier backs each iteration of a conversation turn.
//! Tool-dispatch iterations always use the standard tier; the first iteration
//! of a turn classifies the user's message:
//!
//! - greetings, acknowledgements and very short messages go to the fast tier
//! - messages asking for scientific reasoning go to the deep-reasoning tier
//! - everything else goes to the standard tier
//!
//! Classification is pure and deterministic. Only the deep-reasoning tier
//! receives an extended-reasoning budget.

use super::ReasoningConfig;
use crate::config::LLMConfig;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Phrases that indicate the user wants interpretation or design reasoning
const COMPLEX_KEYWORDS: &[&str] = &[
    "explain",
    "interpret",
    "compare",
    "strategy",
    "analyze results",
    "evaluate",
    "design strategy",
    "binding mode",
    "interface quality",
    "next steps",
    "mechanism",
    "recommend",
    "trade-off",
    "trade off",
    "pros and cons",
    "which design",
    "summarize the results",
    "scientific",
];

/// Messages with at most this many words are trivial unless they carry a keyword
const SHORT_MESSAGE_WORDS: usize = 5;

/// Model tier backing one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    Fast,
    Standard,
    DeepReasoning,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Fast => write!(f, "fast"),
            ModelTier::Standard => write!(f, "standard"),
            ModelTier::DeepReasoning => write!(f, "deep-reasoning"),
        }
    }
}

fn trivial_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^(hi|hello|hey|thanks|thank you|ok|okay|yes|no|sure|got it|great)\b",
            r"(?i)^(can you|could you|please) (help|assist)\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn has_complex_keyword(msg_lower: &str) -> bool {
    COMPLEX_KEYWORDS.iter().any(|kw| msg_lower.contains(kw))
}

/// Classify a user message into a tier
pub fn classify_complexity(message: &str) -> ModelTier {
    let msg_lower = message.trim().to_lowercase();

    if trivial_patterns().iter().any(|p| p.is_match(&msg_lower)) {
        return ModelTier::Fast;
    }

    let complex = has_complex_keyword(&msg_lower);
    if msg_lower.split_whitespace().count() <= SHORT_MESSAGE_WORDS && !complex {
        return ModelTier::Fast;
    }
    if complex {
        return ModelTier::DeepReasoning;
    }
    ModelTier::Standard
}

/// Select the tier for one iteration of the agent loop
///
/// Iterations after the first that follow a tool call never need
/// classification: they are tool orchestration and use the standard tier.
pub fn select_model(message: &str, iteration: usize, prior_tool_use: bool) -> ModelTier {
    if iteration > 0 && prior_tool_use {
        return ModelTier::Standard;
    }
    classify_complexity(message)
}

/// Maps tiers to concrete model ids and per-call limits
#[derive(Debug, Clone)]
pub struct ModelRouter {
    config: Arc<LLMConfig>,
}

impl ModelRouter {
    pub fn new(config: Arc<LLMConfig>) -> Self {
        Self { config }
    }

    pub fn select(&self, message: &str, iteration: usize, prior_tool_use: bool) -> ModelTier {
        select_model(message, iteration, prior_tool_use)
    }

    /// Provider model id for a tier
    pub fn model_id(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.config.fast_model,
            ModelTier::Standard => &self.config.standard_model,
            ModelTier::DeepReasoning => &self.config.deep_model,
        }
    }

    pub fn max_output_tokens(&self, _tier: ModelTier) -> u32 {
        self.config.max_output_tokens
    }

    /// Extended-reasoning budget; `Some` only for the deep-reasoning tier
    pub fn reasoning_config(&self, tier: ModelTier) -> Option<ReasoningConfig> {
        match tier {
            ModelTier::DeepReasoning => {
                Some(ReasoningConfig::enabled(self.config.reasoning_budget_tokens))
            }
            ModelTier::Fast | ModelTier::Standard => None,
        }
    }
}
