use serde_json::Value;
use tracing::{info, warn};

use super::SummaryPipeline;
use crate::{
    completion::string_list,
    error::{DistillError, Result},
    types::{ExecutiveSummary, KeyPointSet, SectionSummary},
};

const STAGE: &str = "executive_synthesizer";

static SYNTHESIS_RULES: &str = r#"OUTPUT: Return ONLY a JSON object:
{
  "executive_summary": "4-6 sentences",
  "key_takeaways": ["5-8 takeaways"],
  "target_audience": "Who benefits most from this content"
}

RULES:
- executive_summary is 4-6 sentences. A theme that recurs across sections is synthesized ONCE; never restate it section by section
- key_takeaways: 5-8 items that are mutually exclusive; no two may cover overlapping ground. Start from the CANDIDATE TAKEAWAYS and merge any that overlap
- target_audience: one sentence
- Use ONLY the section summaries below; do not add outside knowledge"#;

impl SummaryPipeline {
    /// Overall summary, takeaways and audience from all section summaries.
    ///
    /// On failure the block is degraded to empty text with the deduplicated key points
    /// as takeaways, so the section data still reaches the caller.
    pub async fn synthesize_executive(
        &self,
        summaries: &[SectionSummary],
        title: &str,
        key_points: &KeyPointSet,
    ) -> ExecutiveSummary {
        match self.try_synthesize(summaries, title, key_points).await {
            Ok(executive) => {
                info!(takeaways = executive.key_takeaways.len(), "executive summary synthesized");
                executive
            }
            Err(e) => {
                warn!(error = %e, "executive synthesis failed, returning degraded block");
                ExecutiveSummary::degraded(key_points)
            }
        }
    }

    async fn try_synthesize(
        &self,
        summaries: &[SectionSummary],
        title: &str,
        key_points: &KeyPointSet,
    ) -> Result<ExecutiveSummary> {
        let sections = summaries
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "### {}. {} [{}]\n{}\nKey points: {}",
                    i + 1,
                    s.title,
                    s.timestamp_range,
                    s.summary_text,
                    s.key_points.join("; ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let candidates = key_points
            .points
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are an executive summary writer. Synthesize the section summaries of \"{}\" \
             into one overview.\n\n{}\n\nSECTION SUMMARIES:\n{}\n\nCANDIDATE TAKEAWAYS:\n{}",
            title, SYNTHESIS_RULES, sections, candidates
        );

        let response = self
            .complete(STAGE, &prompt, self.config.temperatures.executive)
            .await?;
        parse_executive(&response, key_points, self.config.max_takeaways)
    }
}

fn parse_executive(
    response: &Value,
    key_points: &KeyPointSet,
    max_takeaways: usize,
) -> Result<ExecutiveSummary> {
    let executive_summary = response["executive_summary"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DistillError::mismatch(STAGE, "reply has no executive_summary"))?;

    let mut key_takeaways = string_list(&response["key_takeaways"]);
    if key_takeaways.is_empty() {
        key_takeaways = key_points.points.clone();
    }
    key_takeaways.truncate(max_takeaways);

    Ok(ExecutiveSummary {
        executive_summary: executive_summary.to_string(),
        key_takeaways,
        target_audience: response["target_audience"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{completion::testing::ScriptedCompletion, config::SummarizerConfig};

    fn summaries() -> Vec<SectionSummary> {
        vec![
            SectionSummary {
                title: "Losses".to_string(),
                timestamp_range: "00:00 - 05:00".to_string(),
                summary_text: "The pilot lost $700K.".to_string(),
                key_points: vec!["Pilot lost $700K".to_string()],
                entities: vec!["Pilot".to_string()],
            },
            SectionSummary {
                title: "Plan".to_string(),
                timestamp_range: "05:00 - 10:00".to_string(),
                summary_text: "A recovery plan was agreed.".to_string(),
                key_points: vec!["Recovery plan agreed".to_string()],
                entities: vec!["Board".to_string()],
            },
        ]
    }

    fn key_points() -> KeyPointSet {
        KeyPointSet {
            points: vec!["Pilot lost $700K".to_string(), "Recovery plan agreed".to_string()],
            merge_log: Vec::new(),
        }
    }

    #[tokio::test]
    async fn prompt_is_grounded_in_sections_and_candidates() {
        let client = Arc::new(ScriptedCompletion::new().reply(
            "executive summary writer",
            json!({
                "executive_summary": "The pilot lost money and a plan followed.",
                "key_takeaways": (1..=10).map(|i| format!("T{i}")).collect::<Vec<_>>(),
                "target_audience": " Finance leads "
            }),
        ));
        let pipeline = SummaryPipeline::new(client.clone(), SummarizerConfig::default());

        let executive = pipeline
            .synthesize_executive(&summaries(), "Board meeting", &key_points())
            .await;

        assert_eq!(executive.executive_summary, "The pilot lost money and a plan followed.");
        assert_eq!(executive.key_takeaways.len(), 8);
        assert_eq!(executive.target_audience, "Finance leads");

        let prompt = &client.prompts_containing("executive summary writer")[0];
        assert!(prompt.contains("\"Board meeting\""));
        assert!(prompt.contains("### 2. Plan [05:00 - 10:00]"));
        assert!(prompt.contains("CANDIDATE TAKEAWAYS:\n- Pilot lost $700K\n- Recovery plan agreed"));
    }

    #[tokio::test]
    async fn missing_takeaways_fall_back_to_key_points() {
        let client = ScriptedCompletion::new().reply(
            "executive summary writer",
            json!({"executive_summary": "Overview."}),
        );
        let pipeline = SummaryPipeline::new(Arc::new(client), SummarizerConfig::default());

        let executive = pipeline
            .synthesize_executive(&summaries(), "Board meeting", &key_points())
            .await;

        assert_eq!(executive.key_takeaways, key_points().points);
        assert_eq!(executive.target_audience, "");
    }

    #[tokio::test]
    async fn failure_degrades_to_key_points() {
        let client = ScriptedCompletion::new().reply(
            "executive summary writer",
            json!({"executive_summary": "   ", "key_takeaways": ["x"]}),
        );
        let pipeline = SummaryPipeline::new(Arc::new(client), SummarizerConfig::default());

        let executive = pipeline
            .synthesize_executive(&summaries(), "Board meeting", &key_points())
            .await;

        assert_eq!(executive, ExecutiveSummary::degraded(&key_points()));
        assert!(executive.executive_summary.is_empty());
    }
}
