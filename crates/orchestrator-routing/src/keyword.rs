//! Deterministic keyword oracle.
//!
//! Scores agents by two signals and keeps the stronger one:
//! - concept detection: the query is recognized as e.g. arithmetic or a
//!   greeting, and the agent advertises a matching term in its id, name,
//!   capabilities, description or tags
//! - lexical overlap between query tokens and the agent's vocabulary

use async_trait::async_trait;
use once_cell::sync::Lazy;
use orchestrator_core::OrchestratorResult;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use crate::oracle::{AgentProfile, CapabilityOracle, OracleRanking, RankedCandidate};

static MATH_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?\s*[-+*/^%×÷x]\s*\d+").expect("valid arithmetic pattern"));

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "does", "for", "how", "i", "is", "it", "me", "my", "of",
    "on", "or", "please", "the", "to", "what", "whats", "with", "you", "your",
];

const NAME_SCORE: f64 = 0.95;
const CAPABILITY_SCORE: f64 = 0.9;
const DESCRIPTION_SCORE: f64 = 0.85;
const LEXICAL_BASE: f64 = 0.4;
const LEXICAL_CAP: f64 = 0.8;

struct Concept {
    name: &'static str,
    /// Query tokens that signal the concept
    triggers: &'static [&'static str],
    /// Prefixes that mark an agent as serving it
    agent_terms: &'static [&'static str],
    /// Also triggered by an arithmetic expression in the query
    expression: bool,
}

const CONCEPTS: &[Concept] = &[
    Concept {
        name: "math",
        triggers: &[
            "add", "arithmetic", "calculate", "calculation", "compute", "divide", "divided",
            "equation", "math", "minus", "multiply", "percent", "plus", "product", "root", "solve",
            "sqrt", "square", "subtract", "sum", "times",
        ],
        agent_terms: &["arithmetic", "math", "calculat"],
        expression: true,
    },
    Concept {
        name: "greeting",
        triggers: &[
            "afternoon", "evening", "greet", "greeting", "greetings", "hello", "hey", "hi", "howdy",
            "morning", "welcome",
        ],
        agent_terms: &["greeting", "hello", "greet"],
        expression: false,
    },
];

/// Keyword and concept scorer
#[derive(Debug, Clone, Default)]
pub struct KeywordOracle;

impl KeywordOracle {
    /// Create a keyword oracle
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn detect_concepts(query: &str, tokens: &HashSet<String>) -> Vec<&'static Concept> {
        CONCEPTS
            .iter()
            .filter(|c| {
                (c.expression && MATH_EXPRESSION.is_match(query))
                    || c.triggers.iter().any(|t| tokens.contains(*t))
            })
            .collect()
    }

    /// Best concept score for an agent and what earned it
    fn concept_score(concepts: &[&Concept], agent: &AgentProfile) -> Option<(f64, String)> {
        let mut best: Option<(f64, String)> = None;
        let mut consider = |score: f64, why: String| {
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, why));
            }
        };

        for concept in concepts {
            let matches = |text: &str| {
                let text = text.to_lowercase();
                concept.agent_terms.iter().any(|term| text.contains(term))
            };

            if matches(&agent.agent_id) || matches(&agent.name) {
                consider(
                    NAME_SCORE,
                    format!("query looks like {}, and agent {} is named for it", concept.name, agent.agent_id),
                );
            }
            if let Some(cap) = agent.capabilities.iter().find(|c| matches(&c.name)) {
                consider(
                    CAPABILITY_SCORE,
                    format!("query looks like {}, matching capability '{}'", concept.name, cap.name),
                );
            }
            let described = agent.description.as_deref().is_some_and(matches)
                || agent.capabilities.iter().any(|c| {
                    matches(&c.description) || c.tags.iter().any(|t| matches(t))
                });
            if described {
                consider(
                    DESCRIPTION_SCORE,
                    format!("query looks like {}, mentioned in the description of {}", concept.name, agent.agent_id),
                );
            }
        }
        best
    }

    fn lexical_score(tokens: &HashSet<String>, agent: &AgentProfile) -> Option<(f64, String)> {
        if tokens.is_empty() {
            return None;
        }
        let mut vocabulary = tokenize(&agent.name);
        if let Some(description) = &agent.description {
            vocabulary.extend(tokenize(description));
        }
        for cap in &agent.capabilities {
            vocabulary.extend(tokenize(&cap.name));
            vocabulary.extend(tokenize(&cap.description));
            for tag in &cap.tags {
                vocabulary.extend(tokenize(tag));
            }
        }

        let mut shared: Vec<&String> = tokens.intersection(&vocabulary).collect();
        if shared.is_empty() {
            return None;
        }
        shared.sort();
        #[allow(clippy::cast_precision_loss)]
        let ratio = shared.len() as f64 / tokens.len() as f64;
        let score = (LEXICAL_BASE + 0.5 * ratio).min(LEXICAL_CAP);
        let words: Vec<&str> = shared.iter().map(|s| s.as_str()).collect();
        Some((score, format!("shares keywords [{}] with agent {}", words.join(", "), agent.agent_id)))
    }
}

/// Lowercase alphanumeric tokens without stopwords
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl CapabilityOracle for KeywordOracle {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn rank(
        &self,
        query: &str,
        _context: Option<&Value>,
        agents: &[AgentProfile],
    ) -> OrchestratorResult<OracleRanking> {
        let tokens = tokenize(query);
        let concepts = Self::detect_concepts(query, &tokens);

        let mut scored: Vec<(RankedCandidate, String)> = agents
            .iter()
            .filter_map(|agent| {
                let concept = Self::concept_score(&concepts, agent);
                let lexical = Self::lexical_score(&tokens, agent);
                let (score, why) = match (concept, lexical) {
                    (Some(c), Some(l)) => if l.0 > c.0 { l } else { c },
                    (Some(c), None) => c,
                    (None, Some(l)) => l,
                    (None, None) => return None,
                };
                Some((RankedCandidate::new(agent.agent_id.clone(), score), why))
            })
            .collect();

        scored.sort_by(|(a, _), (b, _)| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        let reasoning = scored.first().map_or_else(
            || "no agent capability matches the query".to_string(),
            |(candidate, why)| format!("Keyword match ({:.2}): {why}", candidate.confidence),
        );
        Ok(OracleRanking {
            candidates: scored.into_iter().map(|(c, _)| c).collect(),
            reasoning,
        })
    }
}
