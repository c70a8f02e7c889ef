//! Distill Core Library
//!
//! Multi-stage transcript summarization: topic segmentation, Chain of Density section
//! summaries with cross-section context, key-point deduplication, executive synthesis
//! and a final consolidation pass, served through a fingerprinted cache.

pub mod cache;
pub mod completion;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod provider;
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{
    CacheStore, FileCacheStore, Fingerprint, MemoryCacheStore, get_root_cache_dir,
    get_summary_cache_dir,
};
pub use completion::{CompletionClient, complete_within, parse_json_content};
pub use config::{StageTemperatures, SummarizerConfig};
pub use coordinator::{SummaryCoordinator, SummaryRequest};
pub use error::{CompletionError, DistillError, Result};
pub use format::{
    format_summary_readable, format_timestamp, format_timestamp_range,
    format_transcript_with_timestamps,
};
pub use pipeline::{METHOD, METHOD_VERSION, SummaryPipeline};
pub use provider::{ChatCompletionClient, Provider, ProviderConfig, ProviderError};
pub use types::{
    CacheEntry, ConsolidatedSummary, ExecutiveSummary, KeyPointSet, MergeRecord, Section,
    SectionSummary, Segment, SummaryMetadata, Transcript,
};
