use crate::domain::model::{FixRecord, FixStatus, SuggestionSource};
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub collected: usize,
    pub analyzed: usize,
    pub ai_suggestions: usize,
    pub proposed: usize,
    pub auto_approved: usize,
    pub elapsed_ms: u128,
}

pub struct RemediationEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> RemediationEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<(RunReport, Vec<FixRecord>)> {
        let started = Instant::now();
        tracing::info!("🚀 Starting failure analysis run");

        // Collect
        let failures = self.pipeline.collect().await?;
        let collected = failures.len();
        tracing::info!("📥 Collected {} failure(s)", collected);

        // Analyze
        let analyzed = self.pipeline.analyze(failures).await?;
        let ai_suggestions = analyzed
            .iter()
            .filter(|(_, s)| s.source == SuggestionSource::Ai)
            .count();
        tracing::info!(
            "🔍 Analyzed {} failure(s), {} with AI",
            analyzed.len(),
            ai_suggestions
        );
        let analyzed_count = analyzed.len();

        // Publish
        let records = self.pipeline.publish(analyzed).await?;
        let auto_approved = records
            .iter()
            .filter(|r| r.status == FixStatus::Approved)
            .count();
        tracing::info!(
            "📝 Proposed {} fix(es), {} auto-approved",
            records.len(),
            auto_approved
        );

        let report = RunReport {
            collected,
            analyzed: analyzed_count,
            ai_suggestions,
            proposed: records.len(),
            auto_approved,
            elapsed_ms: started.elapsed().as_millis(),
        };
        Ok((report, records))
    }
}
