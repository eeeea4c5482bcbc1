//! Token usage tracking
//!
//! [`Usage`] records the token counts of a single model call; [`UsageStats`]
//! aggregates them across a run, broken down by agent. The runner records
//! usage after every model round-trip and returns the totals in the
//! [`RunResult`](crate::result::RunResult).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Token usage for a single model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    /// Number of API requests folded into this record.
    pub request_count: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

/// Aggregated usage across one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total: Usage,
    pub by_agent: HashMap<String, Usage>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the usage of one model call attributed to `agent`.
    pub fn record(&mut self, agent: &str, usage: Usage) {
        self.total.add(&usage);
        self.by_agent
            .entry(agent.to_string())
            .or_default()
            .add(&usage);
    }

    /// One-line human summary, handy in logs.
    pub fn summary(&self) -> String {
        format!(
            "{} requests, {} tokens ({} prompt / {} completion)",
            self.total.request_count,
            self.total.total_tokens,
            self.total.prompt_tokens,
            self.total.completion_tokens
        )
    }
}
