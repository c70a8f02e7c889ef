use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::provider::ProviderError;

/// Failure of a single call to the completion capability.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API response: {0}")]
    InvalidApiResponse(serde_json::Value),

    #[error("Completion returned unparseable output: {reason}")]
    Unparseable { reason: String },

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum DistillError {
    #[error("Completion failed in {stage}: {source}")]
    CompletionFailed {
        stage: &'static str,
        #[source]
        source: CompletionError,
    },

    #[error("Section '{title}' is too small to summarize ({chars} chars, need {min})")]
    InputTooSmall {
        title: String,
        chars: usize,
        min: usize,
    },

    #[error("{stage} returned a structurally invalid result: {reason}")]
    StructuralMismatch { stage: &'static str, reason: String },

    #[error("No section summary could be generated ({failed} of {total} sections failed)")]
    NoSectionSummaries { failed: usize, total: usize },

    #[error("Cache I/O failed for {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Summary generation aborted: {reason}")]
    GenerationAborted { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

impl DistillError {
    pub fn completion(stage: &'static str, source: CompletionError) -> Self {
        DistillError::CompletionFailed { stage, source }
    }

    pub fn mismatch(stage: &'static str, reason: impl Into<String>) -> Self {
        DistillError::StructuralMismatch {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DistillError>;
