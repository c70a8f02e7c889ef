use serde_json::Value;
use tracing::{debug, info, warn};

use super::SummaryPipeline;
use crate::{
    completion::string_list,
    error::{DistillError, Result},
    types::{KeyPointSet, MergeRecord},
};

const STAGE: &str = "deduplicator";

impl SummaryPipeline {
    /// Reduce the key points of all sections to at most `max_key_points` distinct points.
    ///
    /// Lists already within the cap are returned untouched without a completion call.
    pub async fn deduplicate_key_points(&self, points: Vec<String>) -> KeyPointSet {
        let max = self.config.max_key_points;
        if points.len() <= max {
            debug!(count = points.len(), max, "key points within cap");
            return KeyPointSet {
                points,
                merge_log: Vec::new(),
            };
        }

        match self.select_key_points(&points, max).await {
            Ok(set) => {
                info!(
                    before = points.len(),
                    after = set.points.len(),
                    merges = set.merge_log.len(),
                    "key points deduplicated"
                );
                for record in &set.merge_log {
                    debug!(merged = ?record.merged, into = %record.into, "key points merged");
                }
                set
            }
            Err(e) => {
                warn!(error = %e, "key point deduplication failed, truncating");
                KeyPointSet {
                    points: points.into_iter().take(max).collect(),
                    merge_log: Vec::new(),
                }
            }
        }
    }

    async fn select_key_points(&self, points: &[String], max: usize) -> Result<KeyPointSet> {
        let numbered = points
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}", i + 1, p))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"You are deduplicating key points collected from every section of a transcript summary.

TASK:
1. Group points that state the same thing or overlap substantially.
2. Merge each group into ONE comprehensive statement that keeps every distinct nuance (numbers, names, conditions).
3. Select at most {max} final points greedily: start with the most central, actionable point; each next pick must add the most NEW information relative to the points already chosen. Drop points that only repeat chosen ones.

OUTPUT: Return ONLY a JSON object:
{{
  "key_points": ["final point"],
  "merge_log": [{{"merged": ["original point", "original point"], "into": "merged statement"}}]
}}

KEY POINTS:
{numbered}"#
        );

        let response = self
            .complete(STAGE, &prompt, self.config.temperatures.dedup)
            .await?;
        parse_selection(&response, max)
    }
}

fn parse_selection(response: &Value, max: usize) -> Result<KeyPointSet> {
    let mut points = string_list(&response["key_points"]);
    if points.is_empty() {
        return Err(DistillError::mismatch(STAGE, "no key points returned"));
    }
    points.truncate(max);

    let merge_log = response["merge_log"]
        .as_array()
        .map(|records| {
            records
                .iter()
                .filter_map(|record| {
                    let into = record["into"].as_str()?.trim();
                    (!into.is_empty()).then(|| MergeRecord {
                        merged: string_list(&record["merged"]),
                        into: into.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(KeyPointSet { points, merge_log })
}
