use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::SummaryPipeline;
use crate::{
    error::{DistillError, Result},
    types::{ConsolidatedSummary, SectionSummary},
};

const STAGE: &str = "consolidator";

static CONSOLIDATION_PROMPT: &str = r#"You are a consolidation editor doing the final redundancy pass over a finished summary.

TASK:
1. Find facts, figures and examples that are repeated across sections.
2. Keep the most detailed mention in exactly ONE section. In every other section replace it with a brief backward reference (e.g. "the loss covered earlier") or remove it.
3. Merge key_takeaways that overlap into a single takeaway.
4. Make sure executive_summary mentions each theme only once.

OUTPUT: Return ONLY the edited JSON with exactly the same structure:
- the same keys: executive_summary, key_takeaways, target_audience, sections
- the same number of sections, in the same order
- every section keeps its "title" and "timestamp" unchanged
Edit wording only. Do not add information that is not already in the summary."#;

/// Only the editable part of a summary travels through the model.
#[derive(Debug, Deserialize)]
struct ConsolidationReply {
    executive_summary: String,
    key_takeaways: Vec<String>,
    target_audience: String,
    sections: Vec<SectionSummary>,
}

impl SummaryPipeline {
    /// Final redundancy pass over an assembled summary.
    ///
    /// Any failure, including a reply whose shape differs from the input, returns `raw`
    /// unchanged with `metadata.consolidated` left false.
    pub async fn consolidate_summary(&self, raw: ConsolidatedSummary) -> ConsolidatedSummary {
        match self.try_consolidate(&raw).await {
            Ok(consolidated) => {
                info!(sections = consolidated.sections.len(), "summary consolidated");
                consolidated
            }
            Err(e) => {
                warn!(error = %e, "consolidation failed, keeping unconsolidated summary");
                raw
            }
        }
    }

    async fn try_consolidate(&self, raw: &ConsolidatedSummary) -> Result<ConsolidatedSummary> {
        let editable = serde_json::json!({
            "executive_summary": raw.executive_summary,
            "key_takeaways": raw.key_takeaways,
            "target_audience": raw.target_audience,
            "sections": raw.sections,
        });
        let prompt = format!(
            "{}\n\nSUMMARY:\n{}",
            CONSOLIDATION_PROMPT,
            serde_json::to_string_pretty(&editable)?
        );

        let response = self
            .complete(STAGE, &prompt, self.config.temperatures.consolidation)
            .await?;
        apply_consolidation(raw, response, self.config.max_takeaways)
    }
}

/// Check the reply keeps the input's shape and merge it over `raw`.
fn apply_consolidation(
    raw: &ConsolidatedSummary,
    response: Value,
    max_takeaways: usize,
) -> Result<ConsolidatedSummary> {
    let reply: ConsolidationReply = serde_json::from_value(response)
        .map_err(|e| DistillError::mismatch(STAGE, format!("unexpected shape: {e}")))?;

    if reply.sections.len() != raw.sections.len() {
        return Err(DistillError::mismatch(
            STAGE,
            format!(
                "expected {} sections, got {}",
                raw.sections.len(),
                reply.sections.len()
            ),
        ));
    }

    for (index, (before, after)) in raw.sections.iter().zip(&reply.sections).enumerate() {
        if before.title != after.title || before.timestamp_range != after.timestamp_range {
            return Err(DistillError::mismatch(
                STAGE,
                format!(
                    "section {index} changed identity: '{}' [{}] became '{}' [{}]",
                    before.title, before.timestamp_range, after.title, after.timestamp_range
                ),
            ));
        }
        if after.summary_text.trim().is_empty() {
            return Err(DistillError::mismatch(
                STAGE,
                format!("section {index} lost its summary"),
            ));
        }
    }

    if !raw.executive_summary.trim().is_empty() && reply.executive_summary.trim().is_empty() {
        return Err(DistillError::mismatch(STAGE, "executive_summary was emptied"));
    }

    let mut key_takeaways: Vec<String> = reply
        .key_takeaways
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    key_takeaways.truncate(max_takeaways);
    if !raw.key_takeaways.is_empty() && key_takeaways.is_empty() {
        return Err(DistillError::mismatch(STAGE, "key_takeaways were emptied"));
    }

    if !raw.target_audience.trim().is_empty() && reply.target_audience.trim().is_empty() {
        return Err(DistillError::mismatch(STAGE, "target_audience was emptied"));
    }

    let mut metadata = raw.metadata.clone();
    metadata.consolidated = true;

    Ok(ConsolidatedSummary {
        executive_summary: reply.executive_summary,
        key_takeaways,
        target_audience: reply.target_audience,
        sections: reply.sections,
        metadata,
        ..raw.clone()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        completion::testing::ScriptedCompletion, config::SummarizerConfig, types::SummaryMetadata,
    };

    fn raw() -> ConsolidatedSummary {
        ConsolidatedSummary {
            executive_summary: "The pilot lost $700K. The pilot lost $700K.".to_string(),
            key_takeaways: vec!["Cut losses".to_string(), "Cut the losses".to_string()],
            target_audience: "Executives".to_string(),
            sections: vec![
                SectionSummary {
                    title: "Losses".to_string(),
                    timestamp_range: "00:00 - 05:00".to_string(),
                    summary_text: "The pilot lost $700K due to churn.".to_string(),
                    key_points: vec!["$700K loss".to_string()],
                    entities: vec!["Pilot".to_string()],
                },
                SectionSummary {
                    title: "Plan".to_string(),
                    timestamp_range: "05:00 - 10:00".to_string(),
                    summary_text: "After the $700K loss due to churn, a plan was made.".to_string(),
                    key_points: vec!["Plan agreed".to_string()],
                    entities: vec!["Board".to_string()],
                },
            ],
            metadata: SummaryMetadata {
                model: "m".to_string(),
                method: "x".to_string(),
                transcript_length: 100,
                consolidated: false,
            },
            success: true,
            ..Default::default()
        }
    }

    fn edited() -> Value {
        json!({
            "executive_summary": "The pilot lost $700K and a plan followed.",
            "key_takeaways": ["Cut losses", " "],
            "target_audience": "Executives",
            "sections": [
                {"title": "Losses", "timestamp": "00:00 - 05:00",
                 "summary": "The pilot lost $700K due to churn.",
                 "key_points": ["$700K loss"], "entities": ["Pilot"]},
                {"title": "Plan", "timestamp": "05:00 - 10:00",
                 "summary": "After the loss covered earlier, a plan was made.",
                 "key_points": ["Plan agreed"], "entities": ["Board"]}
            ]
        })
    }

    fn pipeline(client: ScriptedCompletion) -> SummaryPipeline {
        SummaryPipeline::new(Arc::new(client), SummarizerConfig::default())
    }

    #[tokio::test]
    async fn applies_content_edits_and_marks_metadata() {
        let client = ScriptedCompletion::new().reply("consolidation editor", edited());

        let result = pipeline(client).consolidate_summary(raw()).await;

        assert!(result.metadata.consolidated);
        assert_eq!(result.key_takeaways, vec!["Cut losses".to_string()]);
        assert_eq!(
            result.sections[1].summary_text,
            "After the loss covered earlier, a plan was made."
        );
        assert_eq!(result.metadata.model, "m");
        assert!(result.success);
    }

    #[tokio::test]
    async fn completion_error_returns_raw_unchanged() {
        let client = ScriptedCompletion::new().fail("consolidation editor");
        let original = raw();

        let result = pipeline(client).consolidate_summary(original.clone()).await;

        assert_eq!(result, original);
        assert!(!result.metadata.consolidated);
    }

    #[tokio::test]
    async fn reordered_sections_are_rejected() {
        let mut reply = edited();
        let sections = reply["sections"].as_array_mut().unwrap();
        sections.swap(0, 1);
        let client = ScriptedCompletion::new().reply("consolidation editor", reply);

        let result = pipeline(client).consolidate_summary(raw()).await;

        assert_eq!(result, raw());
    }

    #[tokio::test]
    async fn dropped_section_is_rejected() {
        let mut reply = edited();
        reply["sections"].as_array_mut().unwrap().pop();
        let client = ScriptedCompletion::new().reply("consolidation editor", reply);

        let result = pipeline(client).consolidate_summary(raw()).await;

        assert_eq!(result, raw());
    }

    #[tokio::test]
    async fn missing_keys_are_rejected() {
        let client = ScriptedCompletion::new().reply(
            "consolidation editor",
            json!({"executive_summary": "Short.", "sections": []}),
        );

        let result = pipeline(client).consolidate_summary(raw()).await;

        assert_eq!(result, raw());
    }

    #[test]
    fn emptied_section_summary_is_a_mismatch() {
        let mut reply = edited();
        reply["sections"][0]["summary"] = json!("");

        let err = apply_consolidation(&raw(), reply, 8).unwrap_err();
        assert!(matches!(err, DistillError::StructuralMismatch { .. }));
    }

    #[test]
    fn emptied_takeaways_are_a_mismatch() {
        let mut original = raw();
        original.key_takeaways = (1..=5).map(|i| format!("Takeaway {i}")).collect();
        let mut reply = edited();
        reply["key_takeaways"] = json!([]);

        let err = apply_consolidation(&original, reply, 8).unwrap_err();
        assert!(matches!(err, DistillError::StructuralMismatch { .. }));

        let mut blanks = edited();
        blanks["key_takeaways"] = json!(["  ", ""]);
        assert!(apply_consolidation(&original, blanks, 8).is_err());
    }

    #[test]
    fn blanked_audience_is_a_mismatch() {
        let mut reply = edited();
        reply["target_audience"] = json!(" ");

        let err = apply_consolidation(&raw(), reply, 8).unwrap_err();
        assert!(matches!(err, DistillError::StructuralMismatch { .. }));
    }

    #[tokio::test]
    async fn emptied_takeaways_keep_the_raw_summary() {
        let mut reply = edited();
        reply["key_takeaways"] = json!([]);
        let client = ScriptedCompletion::new().reply("consolidation editor", reply);

        let result = pipeline(client).consolidate_summary(raw()).await;

        assert_eq!(result, raw());
        assert!(!result.metadata.consolidated);
    }

    #[tokio::test]
    async fn prompt_carries_the_editable_summary() {
        let client = Arc::new(ScriptedCompletion::new().fail("consolidation editor"));
        let pipeline = SummaryPipeline::new(client.clone(), SummarizerConfig::default());

        pipeline.consolidate_summary(raw()).await;

        let prompt = &client.prompts_containing("consolidation editor")[0];
        let body = prompt.split_once("SUMMARY:\n").unwrap().1;
        let value: Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["sections"][1]["title"], "Plan");
        assert!(value.get("metadata").is_none());
    }
}
