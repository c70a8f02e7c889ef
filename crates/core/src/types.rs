use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    format::{format_timestamp_range, format_transcript_with_timestamps},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Transcript {
    pub fn from_plain_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: Vec::new(),
            language: default_language(),
        }
    }

    /// Load a transcript from disk. Whisper-style JSON is used when it parses,
    /// anything else is treated as plain text.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str::<Transcript>(&content) {
            Ok(transcript) => Ok(transcript),
            Err(_) => Ok(Self::from_plain_text(content)),
        }
    }

    pub fn has_timestamps(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }

    /// Text shown to the model: timestamped lines when segments exist.
    pub fn prompt_text(&self) -> String {
        if self.has_timestamps() {
            format_transcript_with_timestamps(self)
        } else {
            self.text.clone()
        }
    }
}

/// A contiguous, titled slice of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
    pub content: String,
    #[serde(default)]
    pub description: String,
}

impl Section {
    pub fn timestamp_range(&self) -> String {
        format_timestamp_range(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub title: String,
    #[serde(rename = "timestamp")]
    pub timestamp_range: String,
    #[serde(rename = "summary")]
    pub summary_text: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl SectionSummary {
    /// Stand-in used when a section could not be summarized at all.
    pub fn placeholder(section: &Section) -> Self {
        Self {
            title: section.title.clone(),
            timestamp_range: section.timestamp_range(),
            summary_text: format!("Summary for {} could not be generated.", section.title),
            key_points: Vec::new(),
            entities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub merged: Vec<String>,
    pub into: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyPointSet {
    pub points: Vec<String>,
    #[serde(default)]
    pub merge_log: Vec<MergeRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub executive_summary: String,
    pub key_takeaways: Vec<String>,
    pub target_audience: String,
}

impl ExecutiveSummary {
    /// Section data stays usable even when synthesis fails.
    pub fn degraded(key_points: &KeyPointSet) -> Self {
        Self {
            executive_summary: String::new(),
            key_takeaways: key_points.points.clone(),
            target_audience: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub model: String,
    pub method: String,
    pub transcript_length: usize,
    #[serde(default)]
    pub consolidated: bool,
}

/// The externally visible summary. This is what gets cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedSummary {
    pub executive_summary: String,
    pub key_takeaways: Vec<String>,
    pub target_audience: String,
    pub sections: Vec<SectionSummary>,
    pub metadata: SummaryMetadata,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ConsolidatedSummary {
    pub fn assemble(
        executive: ExecutiveSummary,
        sections: Vec<SectionSummary>,
        metadata: SummaryMetadata,
    ) -> Self {
        Self {
            executive_summary: executive.executive_summary,
            key_takeaways: executive.key_takeaways,
            target_audience: executive.target_audience,
            sections,
            metadata,
            cached: false,
            cached_at: None,
            success: true,
            error: None,
        }
    }

    pub fn failure(reason: impl Into<String>, metadata: SummaryMetadata) -> Self {
        Self {
            metadata,
            success: false,
            error: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub payload: ConsolidatedSummary,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Payload as served from cache.
    pub fn into_cached_payload(self) -> ConsolidatedSummary {
        ConsolidatedSummary {
            cached: true,
            cached_at: Some(self.cached_at),
            ..self.payload
        }
    }
}
