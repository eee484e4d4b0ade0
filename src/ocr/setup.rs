//! Tesseract discovery and tessdata provisioning.
//!
//! Finds a usable `tesseract` executable (PATH first, then the standard
//! Windows install locations) and makes sure an English traineddata file is
//! available, downloading one into the local data directory if the system has
//! none.

use anyhow::{anyhow, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Resolved locations the OCR engine needs.
#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// Explicit tessdata directory; None means Tesseract's built-in default.
    pub tessdata: Option<PathBuf>,
}

/// Returns the local directory for downloaded tessdata.
fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quiz-watcher")
        .join("tessdata")
}

/// Finds the Tesseract executable.
fn find_tesseract_executable() -> Result<PathBuf> {
    // PATH first
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    ];
    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR and make sure it is on PATH."
    ))
}

/// Locates the executable and ensures English traineddata is available.
///
/// A system installation usually ships its own tessdata, in which case no
/// explicit directory is needed. Otherwise `eng.traineddata` is downloaded
/// once into the local data directory.
pub fn ensure_tessdata() -> Result<TesseractPaths> {
    let executable = find_tesseract_executable()?;

    // A system install resolves its own tessdata.
    if system_has_eng_traineddata() {
        return Ok(TesseractPaths { executable, tessdata: None });
    }

    let data_dir = get_data_dir();
    let eng_path = data_dir.join("eng.traineddata");
    if !eng_path.exists() {
        crate::log("eng.traineddata not found, downloading...");
        fs::create_dir_all(&data_dir)?;
        download_eng_traineddata(&eng_path)?;
    }

    Ok(TesseractPaths { executable, tessdata: Some(data_dir) })
}

/// Checks whether a TESSDATA_PREFIX or standard install provides eng data.
fn system_has_eng_traineddata() -> bool {
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        if PathBuf::from(&prefix).join("eng.traineddata").exists() {
            return true;
        }
    }

    let system_paths = [
        r"C:\Program Files\Tesseract-OCR\tessdata",
        r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
    ];
    system_paths
        .iter()
        .any(|p| PathBuf::from(p).join("eng.traineddata").exists())
}

/// Downloads `eng.traineddata` from the tessdata repository.
fn download_eng_traineddata(eng_path: &PathBuf) -> Result<()> {
    let eng_url = format!("{}/eng.traineddata", TESSDATA_REPO);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&eng_url)
        .header("User-Agent", "quiz-watcher")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download eng.traineddata: HTTP {}",
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(eng_path)?;
    file.write_all(&bytes)?;

    crate::log(&format!("eng.traineddata saved to {}", eng_path.display()));
    Ok(())
}
