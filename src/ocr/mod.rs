//! Text extraction from captured frames.
//!
//! Pipeline: binarize the frame so dark question text stands out, hand the
//! result to the Tesseract binary, then normalize whitespace so the watcher's
//! de-dup filter is not defeated by OCR jitter between frames.

pub mod engine;
pub mod preprocess;
pub mod setup;

pub use setup::TesseractPaths;

use anyhow::Result;
use image::RgbaImage;
use regex::Regex;

/// Strategy for converting a captured frame into text.
pub trait TextRecognizer: Send {
    /// Returns the recognized text, whitespace-trimmed; empty string when the
    /// frame contains no text.
    fn recognize(&mut self, image: &RgbaImage) -> Result<String>;
}

/// Production recognizer driving the Tesseract executable.
pub struct TesseractOcr {
    paths: TesseractPaths,
    threshold: u8,
    whitespace: Regex,
}

impl TesseractOcr {
    /// Locates Tesseract and prepares the recognizer.
    ///
    /// `threshold` is the binarization cutoff: pixels darker than this are
    /// treated as text.
    pub fn new(threshold: u8) -> Result<Self> {
        let paths = setup::ensure_tessdata()?;
        Ok(Self {
            paths,
            threshold,
            whitespace: Regex::new(r"\s+").expect("static regex"),
        })
    }

    fn normalize(&self, raw: &str) -> String {
        self.whitespace.replace_all(raw.trim(), " ").into_owned()
    }
}

impl TextRecognizer for TesseractOcr {
    fn recognize(&mut self, image: &RgbaImage) -> Result<String> {
        let binarized = preprocess::binarize_dark_text(image, self.threshold);
        let raw = engine::recognize_text(&binarized, &self.paths)?;
        Ok(self.normalize(&raw))
    }
}
