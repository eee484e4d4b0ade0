//! Quiz Watcher
//!
//! Watches a fixed screen region for quiz questions, extracts the text with
//! OCR, asks a completion endpoint for the single-letter answer, clicks the
//! matching on-screen option, and appends the interaction to a CSV event log.

mod cache;
mod capture;
mod clicker;
mod client;
mod config;
mod events;
mod hash;
mod ocr;
mod paths;
mod pipeline;
mod watcher;

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

use cache::AnswerCache;
use capture::ScreenCapture;
use client::{ModelClient, ModelSettings};
use config::QuizConfig;
use events::CsvEventLog;
use ocr::TesseractOcr;
use pipeline::QuizPipeline;
use watcher::Watcher;

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("quiz_watcher.log");
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

fn main() -> Result<()> {
    // Log panics before the process dies; a background-thread panic would
    // otherwise vanish with the console window.
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        eprintln!("[PANIC]{} {}", location, msg);
        log(&format!("[PANIC]{} {}", location, msg));
    }));

    paths::ensure_directories()?;

    let config = QuizConfig::load(&paths::get_config_path())?;

    let settings = ModelSettings::from_config(&config);
    let client = ModelClient::new(settings, AnswerCache::new())
        .context("could not start model client")?;

    let event_log = CsvEventLog::new(&config.events_csv)
        .with_context(|| format!("could not open {}", config.events_csv.display()))?;

    let mut quiz = QuizPipeline::new(
        client,
        config.region,
        config.option_count,
        Box::new(event_log),
    );

    let ocr = TesseractOcr::new(config.ocr_threshold).context("could not set up OCR")?;

    let mut watcher = Watcher::new(
        config.region,
        config.poll_interval(),
        Box::new(ScreenCapture::new()),
        Box::new(ocr),
        Box::new(move |question| quiz.handle_question(question)),
    )
    .with_error_callback(Box::new(|e| {
        log(&format!("Watcher error (continuing): {:#}", e));
    }));

    if let Some(dir) = &config.screenshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        watcher = watcher.with_screenshot_dir(dir.clone());
    }

    log(&format!(
        "Watching region ({}, {}) {}x{} every {}ms",
        config.region.left,
        config.region.top,
        config.region.width,
        config.region.height,
        config.poll_interval_ms
    ));
    log(&format!("Event log: {}", config.events_csv.display()));

    let handle = watcher.start();

    log("Press Enter to stop.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    log("Stopping watcher...");
    handle.stop();
    handle.join()?;
    log("Done");

    Ok(())
}
