use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{DistillError, Result};

/// Tunables for every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Characters of transcript shown to the segmenter; the rest is not inspected.
    pub segmentation_char_budget: usize,
    pub min_section_chars: usize,
    /// Chunk count for the equal-split fallback when no titles came back.
    pub default_section_count: usize,
    /// Densification rewrites after the initial draft of each section.
    pub density_rounds: usize,
    pub context_points_per_section: usize,
    pub max_key_points: usize,
    pub max_takeaways: usize,
    pub completion_timeout_secs: u64,
    pub temperatures: StageTemperatures,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageTemperatures {
    pub segmentation: f32,
    pub summary: f32,
    pub dedup: f32,
    pub executive: f32,
    pub consolidation: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            segmentation_char_budget: 20_000,
            min_section_chars: 200,
            default_section_count: 4,
            density_rounds: 3,
            context_points_per_section: 3,
            max_key_points: 8,
            max_takeaways: 8,
            completion_timeout_secs: 120,
            temperatures: StageTemperatures::default(),
        }
    }
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self {
            segmentation: 0.3,
            summary: 0.3,
            dedup: 0.2,
            executive: 0.4,
            consolidation: 0.2,
        }
    }
}

impl SummarizerConfig {
    /// Load configuration from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SummarizerConfig = toml::from_str(&contents)?;
        Ok(config.normalized())
    }

    /// Defaults when the file does not exist; other errors still surface.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(DistillError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DISTILL_MAX_KEY_POINTS → max_key_points
    /// - DISTILL_DENSITY_ROUNDS → density_rounds
    /// - DISTILL_TIMEOUT_SECS → completion_timeout_secs
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_number("DISTILL_MAX_KEY_POINTS") {
            self.max_key_points = value as usize;
        }
        if let Some(value) = env_number("DISTILL_DENSITY_ROUNDS") {
            self.density_rounds = value as usize;
        }
        if let Some(value) = env_number("DISTILL_TIMEOUT_SECS") {
            self.completion_timeout_secs = value;
        }
        self.normalized()
    }

    /// Clamp values into the ranges the pipeline relies on.
    pub fn normalized(mut self) -> Self {
        self.max_key_points = self.max_key_points.clamp(5, 8);
        self.max_takeaways = self.max_takeaways.clamp(5, 8);
        self.default_section_count = self.default_section_count.max(1);
        self.min_section_chars = self.min_section_chars.max(1);
        self.segmentation_char_budget = self.segmentation_char_budget.max(self.min_section_chars);
        self.completion_timeout_secs = self.completion_timeout_secs.max(1);
        self
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// Returns ~/.config/distill/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("distill").join("config.toml"))
    }
}

fn env_number(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}
