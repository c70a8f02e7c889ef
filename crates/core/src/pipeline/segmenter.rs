use serde_json::Value;
use tracing::{debug, info, warn};

use super::SummaryPipeline;
use crate::{
    error::{DistillError, Result},
    format::truncate_chars,
    types::{Section, Transcript},
};

const STAGE: &str = "segmenter";

static SEGMENTATION_PROMPT: &str = r#"You are a transcript topic segmenter.

TASK: split the transcript below into its major topics, in chronological order.

OUTPUT: Return ONLY a JSON object:
{
  "sections": [
    {"title": "Short specific title", "start_time": 0.0, "end_time": 125.5, "description": "One sentence on what this part covers"}
  ]
}

RULES:
- 3-8 sections for long content; a transcript about a single topic is ONE section
- start_time and end_time are seconds read from the [MM:SS] markers; use 0 when there are no markers
- Sections are sequential, do not overlap, and together cover the whole transcript
- Titles name the topic, not the speaker"#;

/// A topic boundary as reported by the model.
#[derive(Debug, Clone, PartialEq)]
struct TopicBoundary {
    title: String,
    start_time: f64,
    end_time: f64,
    description: String,
}

impl SummaryPipeline {
    /// Split the transcript into chronological sections. Always returns at least one.
    pub async fn segment(&self, transcript: &Transcript) -> Vec<Section> {
        let min_chars = self.config.min_section_chars;
        let total_chars = transcript.text.trim().chars().count();

        if total_chars < min_chars {
            info!(total_chars, min_chars, "transcript too short to segment");
            return vec![whole_transcript(transcript)];
        }

        let boundaries = match self.detect_boundaries(transcript).await {
            Ok(boundaries) => boundaries,
            Err(e) => {
                warn!(error = %e, "topic detection failed");
                Vec::new()
            }
        };

        match slice_by_boundaries(transcript, &boundaries, min_chars) {
            Ok(sections) => sections,
            Err(e) => {
                let titles: Vec<String> = boundaries.iter().map(|b| b.title.clone()).collect();
                let count = if titles.is_empty() {
                    self.config.default_section_count
                } else {
                    titles.len()
                };
                warn!(reason = %e, count, "falling back to equal chunks");
                equal_chunks(transcript, &titles, count, min_chars)
            }
        }
    }

    async fn detect_boundaries(&self, transcript: &Transcript) -> Result<Vec<TopicBoundary>> {
        let prompt_text = transcript.prompt_text();
        let budget = self.config.segmentation_char_budget;
        let visible = truncate_chars(&prompt_text, budget);
        if visible.len() < prompt_text.len() {
            debug!(budget, "transcript truncated for topic detection");
        }

        let prompt = format!(
            "{}\n\nTRANSCRIPT{}:\n{}",
            SEGMENTATION_PROMPT,
            if transcript.has_timestamps() {
                " (with [MM:SS] markers)"
            } else {
                " (no timestamps)"
            },
            visible
        );

        let response = self
            .complete(STAGE, &prompt, self.config.temperatures.segmentation)
            .await?;
        let boundaries = parse_boundaries(&response)?;
        debug!(boundaries = boundaries.len(), "topic boundaries detected");
        Ok(boundaries)
    }
}

fn parse_boundaries(response: &Value) -> Result<Vec<TopicBoundary>> {
    let items = response
        .get("sections")
        .or_else(|| response.get("topics"))
        .unwrap_or(response)
        .as_array()
        .ok_or_else(|| DistillError::mismatch(STAGE, "expected a list of sections"))?;

    let mut boundaries: Vec<TopicBoundary> = items
        .iter()
        .filter_map(|item| {
            let title = item["title"].as_str()?.trim();
            if title.is_empty() {
                return None;
            }
            Some(TopicBoundary {
                title: title.to_string(),
                start_time: seconds(&item["start_time"]),
                end_time: seconds(&item["end_time"]),
                description: item["description"].as_str().unwrap_or_default().to_string(),
            })
        })
        .collect();

    boundaries.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    Ok(boundaries)
}

/// Seconds from a number, a numeric string, or an `MM:SS` / `HH:MM:SS` string.
fn seconds(value: &Value) -> f64 {
    if let Some(n) = value.as_f64() {
        return n.max(0.0);
    }
    let Some(text) = value.as_str() else {
        return 0.0;
    };
    text.trim()
        .split(':')
        .try_fold(0.0, |acc, part| part.trim().parse::<f64>().map(|n| acc * 60.0 + n))
        .map(|n| n.max(0.0))
        .unwrap_or(0.0)
}

fn whole_transcript(transcript: &Transcript) -> Section {
    Section {
        title: "Full transcript".to_string(),
        start_time: 0.0,
        end_time: transcript.duration_seconds(),
        content: transcript.text.trim().to_string(),
        description: String::new(),
    }
}

/// Assign timestamped segments to boundaries by start time.
///
/// The first section also takes segments before its start, the last takes everything after.
fn slice_by_boundaries(
    transcript: &Transcript,
    boundaries: &[TopicBoundary],
    min_chars: usize,
) -> Result<Vec<Section>> {
    if boundaries.is_empty() {
        return Err(DistillError::mismatch(STAGE, "no titled sections"));
    }
    if !transcript.has_timestamps() {
        return Err(DistillError::mismatch(
            STAGE,
            "transcript has no timestamp index to slice by",
        ));
    }

    let first_start = transcript.segments.first().map(|s| s.start).unwrap_or(0.0);
    let last = boundaries.len() - 1;
    let mut sections = Vec::with_capacity(boundaries.len());

    for (i, boundary) in boundaries.iter().enumerate() {
        let lower = if i == 0 { f64::NEG_INFINITY } else { boundary.start_time };
        let upper = if i == last {
            f64::INFINITY
        } else {
            boundaries[i + 1].start_time
        };

        let content = transcript
            .segments
            .iter()
            .filter(|seg| seg.start >= lower && seg.start < upper)
            .map(|seg| seg.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let chars = content.chars().count();
        if chars < min_chars {
            return Err(DistillError::InputTooSmall {
                title: boundary.title.clone(),
                chars,
                min: min_chars,
            });
        }

        sections.push(Section {
            title: boundary.title.clone(),
            start_time: if i == 0 {
                boundary.start_time.min(first_start)
            } else {
                boundary.start_time
            },
            end_time: if i == last {
                boundary.end_time.max(transcript.duration_seconds())
            } else {
                upper
            },
            content,
            description: boundary.description.clone(),
        });
    }

    Ok(sections)
}

/// Split the full transcript into `count` chunks of roughly equal length.
///
/// `count` is capped so every chunk holds at least `min_chars`, and cuts prefer nearby
/// whitespace.
fn equal_chunks(
    transcript: &Transcript,
    titles: &[String],
    count: usize,
    min_chars: usize,
) -> Vec<Section> {
    let text = transcript.text.trim();
    let total_chars = text.chars().count();
    let count = count.clamp(1, (total_chars / min_chars.max(1)).max(1));

    let mut pieces: Vec<(usize, usize, &str)> = Vec::with_capacity(count);
    let mut rest = text;
    for remaining in (1..=count).rev() {
        if rest.is_empty() {
            break;
        }
        let offset = total_chars - rest.chars().count();
        let cut = if remaining == 1 {
            rest.len()
        } else {
            cut_point(rest, rest.chars().count().div_ceil(remaining))
        };
        let (head, tail) = rest.split_at(cut);
        pieces.push((offset, offset + head.chars().count(), head.trim()));
        rest = tail.trim_start();
    }
    if pieces.is_empty() {
        pieces.push((0, total_chars, text));
    }

    let duration = transcript.duration_seconds();
    let at = |chars: usize| {
        if total_chars == 0 {
            0.0
        } else {
            duration * chars as f64 / total_chars as f64
        }
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (start, end, content))| Section {
            title: titles
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Part {}", i + 1)),
            start_time: at(start),
            end_time: at(end),
            content: content.to_string(),
            description: String::new(),
        })
        .collect()
}

/// Byte index where a chunk of `want_chars` characters should end.
///
/// The cut moves forward to whitespace only within a tenth of the chunk length, so text
/// without spaces is still split at the character boundary.
fn cut_point(text: &str, want_chars: usize) -> usize {
    let Some((idx, _)) = text.char_indices().nth(want_chars) else {
        return text.len();
    };
    let window = (want_chars / 10).max(1);
    text[idx..]
        .char_indices()
        .take(window)
        .find(|(_, c)| c.is_whitespace())
        .map(|(offset, _)| idx + offset)
        .unwrap_or(idx)
}
