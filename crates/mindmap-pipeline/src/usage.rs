use serde::{Deserialize, Serialize};

use mindmap_core::message::UsageMetadata;

use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUsage {
    pub stage: Stage,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Token accounting for one pipeline run, per stage and in aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub stages: Vec<StageUsage>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageReport {
    /// Record a stage's usage. Providers that report nothing count as zero.
    pub fn record(&mut self, stage: Stage, usage: Option<UsageMetadata>) {
        let usage = usage.unwrap_or_default();
        self.stages.push(StageUsage {
            stage,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        });
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.total_tokens += usage.total_tokens;
    }
}
