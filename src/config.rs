//! Runtime configuration loaded from config.json at startup.
//!
//! The parsed [`QuizConfig`] is constructed once in `main` and handed down to
//! each component by value or reference. There is no global settings object;
//! components receive exactly the fields they need at construction time.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A rectangle of the screen in absolute pixel coordinates.
///
/// Owned by the watcher (capture bounds) and the clicker (answer layout).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    /// Creates a region, rejecting empty or negative dimensions.
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            bail!("region dimensions must be positive, got {}x{}", width, height);
        }
        Ok(Self { left, top, width, height })
    }
}

/// Complete runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizConfig {
    /// API credential for the model endpoint. Empty = model client refuses to start.
    #[serde(default)]
    pub api_key: String,
    /// Completion endpoint URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Model name sent with each completion request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature sent with each completion request.
    #[serde(default)]
    pub temperature: f32,
    /// Delay between watcher polls (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Price per 1000 input tokens.
    #[serde(default = "default_input_cost")]
    pub input_cost_per_1k: f64,
    /// Price per 1000 output tokens.
    #[serde(default = "default_output_cost")]
    pub output_cost_per_1k: f64,
    /// Screen rectangle to watch for question text.
    #[serde(default = "default_region")]
    pub region: Region,
    /// Number of answer options laid out vertically inside the region.
    #[serde(default = "default_option_count")]
    pub option_count: u8,
    /// Directory for captured frames. None disables screenshot persistence.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
    /// Path of the CSV event log.
    #[serde(default = "crate::paths::get_default_events_csv")]
    pub events_csv: PathBuf,
    /// OCR binarization threshold (pixels darker than this are treated as text).
    #[serde(default = "default_ocr_threshold")]
    pub ocr_threshold: u8,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/responses".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_input_cost() -> f64 {
    0.00015
}

fn default_output_cost() -> f64 {
    0.0006
}

fn default_region() -> Region {
    Region { left: 0, top: 0, width: 800, height: 600 }
}

fn default_option_count() -> u8 {
    4
}

fn default_ocr_threshold() -> u8 {
    128
}

impl Default for QuizConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default config must deserialize")
    }
}

impl QuizConfig {
    /// Loads configuration from the given path.
    ///
    /// A missing file falls back to defaults (logged). A file that exists but
    /// cannot be read or parsed, or that describes an invalid region, is a
    /// startup error rather than a silent fallback: watching or clicking the
    /// wrong part of the screen is worse than not starting.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            crate::log(&format!(
                "{} not found, using default config",
                path.display()
            ));
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        crate::log(&format!("Config loaded from {}", path.display()));
        Ok(config)
    }

    /// Checks the cross-field invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let r = self.region;
        Region::new(r.left, r.top, r.width, r.height).context("invalid capture region")?;
        if self.option_count == 0 {
            bail!("option_count must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be at least 1");
        }
        Ok(())
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
