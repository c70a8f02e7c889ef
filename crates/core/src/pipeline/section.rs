use serde_json::Value;
use tracing::{debug, info, warn};

use super::SummaryPipeline;
use crate::{
    completion::string_list,
    error::{DistillError, Result},
    types::{Section, SectionSummary},
};

const STAGE: &str = "section_summarizer";

static OUTPUT_RULES: &str = r#"OUTPUT: Return ONLY a JSON object:
{
  "summary": "5-7 sentences",
  "key_points": ["4-6 distinct, specific points"],
  "entities": ["people, organizations, products, figures or concepts named in the section"]
}

RULES:
- summary is 5-7 sentences and faithful to the SECTION CONTENT only
- key_points: 4-6 items, each a specific fact, decision or insight; no two say the same thing
- entities: at least 3
- Keep concrete numbers, names and examples"#;

/// Working state of one section between densification rounds.
#[derive(Debug, Clone, PartialEq)]
struct Draft {
    summary: String,
    key_points: Vec<String>,
    entities: Vec<String>,
}

impl SummaryPipeline {
    /// Summarize sections in chronological order, each seeing only earlier summaries.
    ///
    /// Returns the summaries (placeholders for failed sections) and the failure count.
    pub async fn summarize_sections(&self, sections: &[Section]) -> (Vec<SectionSummary>, usize) {
        let mut summaries: Vec<SectionSummary> = Vec::with_capacity(sections.len());
        let mut failed = 0;

        for (index, section) in sections.iter().enumerate() {
            let summary = match self.summarize_section(section, &summaries).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(index, title = %section.title, error = %e, "section summary failed");
                    failed += 1;
                    SectionSummary::placeholder(section)
                }
            };
            summaries.push(summary);
        }

        (summaries, failed)
    }

    /// Chain of Density for one section: an initial draft, then rewrites that fold in
    /// missing entities. A failed rewrite keeps the last good draft.
    pub async fn summarize_section(
        &self,
        section: &Section,
        previous: &[SectionSummary],
    ) -> Result<SectionSummary> {
        if section.content.trim().is_empty() {
            info!(title = %section.title, "section has no content");
            return Ok(SectionSummary {
                title: section.title.clone(),
                timestamp_range: section.timestamp_range(),
                summary_text: format!("No spoken content was captured for {}.", section.title),
                key_points: Vec::new(),
                entities: Vec::new(),
            });
        }

        let context = self.covered_context(previous);
        let temperature = self.config.temperatures.summary;

        let prompt = initial_prompt(section, &context);
        let mut draft = parse_draft(&self.complete(STAGE, &prompt, temperature).await?)?;

        let rounds = self.config.density_rounds;
        for round in 1..=rounds {
            let prompt = densify_prompt(section, &context, &draft, round, rounds);
            let densified = self
                .complete(STAGE, &prompt, temperature)
                .await
                .and_then(|response| parse_densified(&response, &draft));
            match densified {
                Ok(next) => draft = next,
                Err(e) => {
                    warn!(title = %section.title, round, error = %e, "densification round failed, keeping previous draft");
                    break;
                }
            }
        }
        debug!(title = %section.title, entities = draft.entities.len(), "section densified");

        Ok(SectionSummary {
            title: section.title.clone(),
            timestamp_range: section.timestamp_range(),
            summary_text: draft.summary,
            key_points: draft.key_points,
            entities: draft.entities,
        })
    }

    /// Top key points of earlier sections, listed as already covered.
    fn covered_context(&self, previous: &[SectionSummary]) -> String {
        let per_section = self.config.context_points_per_section;
        let lines: Vec<String> = previous
            .iter()
            .flat_map(|summary| {
                summary
                    .key_points
                    .iter()
                    .take(per_section)
                    .map(move |point| format!("- [{}] {}", summary.title, point))
            })
            .collect();

        if lines.is_empty() {
            return String::new();
        }

        format!(
            "ALREADY COVERED IN EARLIER SECTIONS (do not repeat these in detail; if this section \
             returns to them, refer back briefly, e.g. \"as discussed in <section title>\"):\n{}\n\n",
            lines.join("\n")
        )
    }
}

fn initial_prompt(section: &Section, context: &str) -> String {
    format!(
        "You are a section summarizer writing the first draft of a summary for one section \
         of a longer transcript.\n\nSECTION: {} [{}]\n\n{}{}\n\nSECTION CONTENT:\n{}",
        section.title,
        section.timestamp_range(),
        context,
        OUTPUT_RULES,
        section.content
    )
}

fn densify_prompt(
    section: &Section,
    context: &str,
    draft: &Draft,
    round: usize,
    rounds: usize,
) -> String {
    format!(
        "You are densifying an existing section summary (round {round} of {rounds}).\n\n\
         STEP 1: find 1-3 informative entities or facts in the SECTION CONTENT that are missing \
         from the CURRENT SUMMARY.\n\
         STEP 2: rewrite the summary so it includes them without growing past 7 sentences; \
         compress filler and vague phrasing to make room. Add \"missing_entities\" (the list \
         from step 1) to the JSON.\n\n\
         SECTION: {} [{}]\n\n{}{}\n\nCURRENT SUMMARY:\n{}\n\nCURRENT KEY POINTS:\n{}\n\n\
         SECTION CONTENT:\n{}",
        section.title,
        section.timestamp_range(),
        context,
        OUTPUT_RULES,
        draft.summary,
        draft
            .key_points
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n"),
        section.content
    )
}

fn parse_draft(response: &Value) -> Result<Draft> {
    let summary = response["summary"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DistillError::mismatch(STAGE, "reply has no summary"))?;

    Ok(Draft {
        summary: summary.to_string(),
        key_points: string_list(&response["key_points"]),
        entities: merge_unique(Vec::new(), string_list(&response["entities"])),
    })
}

/// A densified draft keeps earlier entities and earlier key points when the rewrite drops them.
fn parse_densified(response: &Value, previous: &Draft) -> Result<Draft> {
    let next = parse_draft(response)?;

    let key_points = if next.key_points.is_empty() {
        previous.key_points.clone()
    } else {
        next.key_points
    };
    let entities = merge_unique(previous.entities.clone(), next.entities);
    let entities = merge_unique(entities, string_list(&response["missing_entities"]));

    Ok(Draft {
        summary: next.summary,
        key_points,
        entities,
    })
}

fn merge_unique(mut into: Vec<String>, items: Vec<String>) -> Vec<String> {
    for item in items {
        if !into.iter().any(|e| e.eq_ignore_ascii_case(&item)) {
            into.push(item);
        }
    }
    into
}
