use anyhow::{anyhow, Result};
use image::GrayImage;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::TesseractPaths;

/// Runs Tesseract on a preprocessed grayscale image and returns the raw text.
///
/// The image is written to a temporary PNG; Tesseract prints to stdout with
/// `--psm 6` (assume a single uniform block of text).
pub fn recognize_text(img: &GrayImage, paths: &TesseractPaths) -> Result<String> {
    let temp_input = NamedTempFile::with_suffix(".png")?;
    img.save(temp_input.path())?;

    let mut command = Command::new(&paths.executable);
    command
        .arg(temp_input.path())
        .arg("stdout")
        .arg("-l")
        .arg("eng")
        .arg("--psm")
        .arg("6");
    if let Some(tessdata) = &paths.tessdata {
        command.arg("--tessdata-dir").arg(tessdata);
    }

    let output = command
        .output()
        .map_err(|e| anyhow!("failed to launch {}: {}", paths.executable.display(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Tesseract failed: {}", stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
