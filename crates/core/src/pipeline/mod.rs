//! Multi-stage summarization: segment, densify per section, deduplicate key points,
//! synthesize the executive block, then consolidate.
//!
//! Every stage except section summarization fails open: a failed completion call
//! degrades that stage's output instead of failing the run.

mod consolidate;
mod dedup;
mod executive;
mod section;
mod segmenter;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    completion::{CompletionClient, complete_within},
    config::SummarizerConfig,
    error::{DistillError, Result},
    types::{ConsolidatedSummary, SummaryMetadata, Transcript},
};

/// Recorded in summary metadata.
pub const METHOD: &str = "chain_of_density_consolidated";

/// Bumped whenever the summary format or prompts change so cached entries never mix.
pub const METHOD_VERSION: u32 = 4;

pub struct SummaryPipeline {
    client: Arc<dyn CompletionClient>,
    config: SummarizerConfig,
}

impl SummaryPipeline {
    pub fn new(client: Arc<dyn CompletionClient>, config: SummarizerConfig) -> Self {
        Self {
            client,
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn metadata_for(&self, transcript: &Transcript) -> SummaryMetadata {
        SummaryMetadata {
            model: self.model().to_string(),
            method: METHOD.to_string(),
            transcript_length: transcript.text.chars().count(),
            consolidated: false,
        }
    }

    async fn complete(&self, stage: &'static str, prompt: &str, temperature: f32) -> Result<Value> {
        complete_within(
            self.client.as_ref(),
            prompt,
            temperature,
            self.config.completion_timeout(),
        )
        .await
        .map_err(|e| DistillError::completion(stage, e))
    }

    /// Run every stage for one transcript.
    ///
    /// Fails only when no section at all could be summarized.
    #[instrument(skip_all, fields(title = %title, transcript_chars = transcript.text.len()))]
    pub async fn run(&self, transcript: &Transcript, title: &str) -> Result<ConsolidatedSummary> {
        let sections = self.segment(transcript).await;
        info!(sections = sections.len(), "transcript segmented");

        let (summaries, failed) = self.summarize_sections(&sections).await;
        if failed == summaries.len() {
            return Err(DistillError::NoSectionSummaries {
                failed,
                total: summaries.len(),
            });
        }
        info!(summarized = summaries.len() - failed, failed, "sections summarized");

        let all_points: Vec<String> = summaries
            .iter()
            .flat_map(|s| s.key_points.iter().cloned())
            .collect();
        let key_points = self.deduplicate_key_points(all_points).await;

        let executive = self.synthesize_executive(&summaries, title, &key_points).await;

        let draft =
            ConsolidatedSummary::assemble(executive, summaries, self.metadata_for(transcript));
        let summary = self.consolidate_summary(draft).await;
        info!(
            consolidated = summary.metadata.consolidated,
            takeaways = summary.key_takeaways.len(),
            "summary ready"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::ScriptedCompletion;
    use serde_json::json;

    fn long_transcript() -> Transcript {
        Transcript::from_plain_text("The quarterly numbers were reviewed in depth. ".repeat(40))
    }

    fn section_reply() -> Value {
        json!({
            "summary": "The team reviewed the quarter.",
            "key_points": ["Revenue grew", "Costs fell", "Hiring paused", "Churn steady"],
            "entities": ["Acme", "Q3", "CFO"]
        })
    }

    #[tokio::test]
    async fn full_run_produces_consolidated_summary() {
        let client = Arc::new(
            ScriptedCompletion::new()
                .reply("topic segmenter", json!({"sections": [{"title": "Quarter review"}]}))
                .reply("first draft", section_reply())
                .reply("densifying", section_reply())
                .reply(
                    "executive summary writer",
                    json!({
                        "executive_summary": "A review of the quarter.",
                        "key_takeaways": ["Revenue grew"],
                        "target_audience": "Managers"
                    }),
                )
                .on("consolidation editor", |prompt| {
                    let start = prompt.find("SUMMARY:\n").unwrap() + "SUMMARY:\n".len();
                    Ok(serde_json::from_str(&prompt[start..]).unwrap())
                }),
        );
        let pipeline = SummaryPipeline::new(client.clone(), SummarizerConfig::default());

        let summary = pipeline.run(&long_transcript(), "Q3 call").await.unwrap();

        assert!(summary.success);
        assert!(summary.metadata.consolidated);
        assert_eq!(summary.metadata.model, "scripted-model");
        assert_eq!(summary.metadata.method, METHOD);
        assert_eq!(summary.sections.len(), 1);
        assert_eq!(summary.sections[0].title, "Quarter review");
        assert_eq!(summary.executive_summary, "A review of the quarter.");
    }

    #[tokio::test]
    async fn every_section_failing_is_an_overall_failure() {
        let client = Arc::new(
            ScriptedCompletion::new()
                .fail("topic segmenter")
                .fail("first draft"),
        );
        let pipeline = SummaryPipeline::new(client.clone(), SummarizerConfig::default());

        let err = pipeline.run(&long_transcript(), "Q3 call").await.unwrap_err();
        assert!(matches!(
            err,
            DistillError::NoSectionSummaries { failed: 4, total: 4 }
        ));
        assert!(client.prompts_containing("executive summary writer").is_empty());
    }

    #[tokio::test]
    async fn stage_failures_after_sections_still_succeed() {
        let client = Arc::new(
            ScriptedCompletion::new()
                .reply("topic segmenter", json!({"sections": []}))
                .reply("first draft", section_reply())
                .fail("densifying")
                .fail("deduplicating key points")
                .fail("executive summary writer")
                .fail("consolidation editor"),
        );
        let pipeline = SummaryPipeline::new(client, SummarizerConfig::default());

        let summary = pipeline.run(&long_transcript(), "Q3 call").await.unwrap();

        assert!(summary.success);
        assert!(!summary.metadata.consolidated);
        assert!(summary.executive_summary.is_empty());
        assert_eq!(summary.key_takeaways.len(), 8);
        assert_eq!(summary.sections[0].summary_text, "The team reviewed the quarter.");
    }
}
