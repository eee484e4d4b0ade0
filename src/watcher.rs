//! Background polling loop that turns screen frames into question callbacks.
//!
//! One dedicated thread repeats capture → optional screenshot persist → OCR →
//! de-dup → callback. Every stage is error-isolated: a failing capture, save,
//! OCR pass, or callback is reported through the optional error callback and
//! the loop moves on to the next tick. The question callback runs on the
//! watcher thread itself, so a slow model call stalls the polling cadence.
//! That is intentional: it keeps one question in flight at a time.
//!
//! Shutdown is cooperative: a shared atomic flag, checked before each
//! iteration and during the (sliced) poll wait, then a join. A capture or
//! callback already in progress finishes before the flag is observed.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::capture::CaptureSource;
use crate::config::Region;
use crate::ocr::TextRecognizer;

/// How often the poll wait re-checks the stop flag.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

pub type QuestionCallback = Box<dyn FnMut(&str) -> Result<()> + Send>;
pub type ErrorCallback = Box<dyn FnMut(&anyhow::Error) + Send>;

/// One-step de-duplication of OCR output.
///
/// A new-question signal fires only for non-empty text that differs from the
/// text of the previous signal. Empty frames neither fire nor clear the
/// suppression state, so a question that stays on screen through a failed
/// frame is still suppressed afterwards.
#[derive(Debug, Default)]
pub struct QuestionFilter {
    last_text: Option<String>,
}

impl QuestionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes one OCR result; true means a new question.
    pub fn observe(&mut self, text: &str) -> bool {
        if text.is_empty() || self.last_text.as_deref() == Some(text) {
            return false;
        }
        self.last_text = Some(text.to_string());
        true
    }
}

/// Screen watcher: polls a region and reports newly appeared question text.
pub struct Watcher {
    region: Region,
    poll_interval: Duration,
    capture: Box<dyn CaptureSource>,
    ocr: Box<dyn TextRecognizer>,
    on_question: QuestionCallback,
    on_error: Option<ErrorCallback>,
    screenshot_dir: Option<PathBuf>,
    stop_flag: Arc<AtomicBool>,
    filter: QuestionFilter,
}

impl Watcher {
    pub fn new(
        region: Region,
        poll_interval: Duration,
        capture: Box<dyn CaptureSource>,
        ocr: Box<dyn TextRecognizer>,
        on_question: QuestionCallback,
    ) -> Self {
        Self {
            region,
            poll_interval,
            capture,
            ocr,
            on_question,
            on_error: None,
            screenshot_dir: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            filter: QuestionFilter::new(),
        }
    }

    /// Registers a callback for per-stage failures.
    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Enables persisting each captured frame as a PNG into `dir`.
    pub fn with_screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = Some(dir);
        self
    }

    /// Starts the polling loop on a dedicated thread.
    pub fn start(self) -> WatcherHandle {
        let stop_flag = self.stop_flag.clone();
        let handle = thread::spawn(move || {
            let mut watcher = self;
            watcher.run();
        });
        WatcherHandle { stop_flag, handle }
    }

    fn run(&mut self) {
        crate::log("Watcher started");
        while !self.stop_flag.load(Ordering::SeqCst) {
            self.tick();
            self.wait_for_next_poll();
        }
        crate::log("Watcher stopped");
    }

    /// One full poll cycle. Each stage failure is reported and ends the tick
    /// (except screenshot persistence, which never blocks OCR).
    fn tick(&mut self) {
        let image = match self.capture.capture(&self.region) {
            Ok(image) => image,
            Err(e) => {
                self.report_error(e.context("screen capture failed"));
                return;
            }
        };

        if let Some(dir) = self.screenshot_dir.clone() {
            if let Err(e) = save_screenshot(&dir, &image) {
                self.report_error(e.context("screenshot save failed"));
            }
        }

        let text = match self.ocr.recognize(&image) {
            Ok(text) => text,
            Err(e) => {
                self.report_error(e.context("OCR failed"));
                return;
            }
        };

        if self.filter.observe(&text) {
            crate::log(&format!("New question detected: {}", text));
            if let Err(e) = (self.on_question)(&text) {
                self.report_error(e.context("question callback failed"));
            }
        }
    }

    /// Sleeps for the poll interval in short slices so a stop request takes
    /// effect within one slice, not one full interval.
    fn wait_for_next_poll(&self) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }

    /// Routes a stage failure to the error callback, if one is registered.
    /// Unreported errors are dropped; the loop continues either way.
    fn report_error(&mut self, error: anyhow::Error) {
        if let Some(on_error) = &mut self.on_error {
            on_error(&error);
        }
    }
}

/// Handle for stopping and joining a running watcher.
///
/// The documented shutdown sequence is `stop()` then `join()`; the thread
/// exits within one stop-check slice of the wait. There is no forced
/// termination and a stopped watcher cannot be restarted.
pub struct WatcherHandle {
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl WatcherHandle {
    /// Requests cancellation. Safe to call from any thread, idempotent.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Waits for the watcher thread to exit.
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("watcher thread panicked"))
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Writes the frame as a timestamp-named PNG.
///
/// Timestamps (with milliseconds) rather than question hashes: persistence
/// happens between capture and OCR, before any text exists to hash.
fn save_screenshot(dir: &Path, image: &image::RgbaImage) -> Result<()> {
    let filename = format!("{}.png", Local::now().format("%Y%m%d_%H%M%S%.3f"));
    let path = dir.join(filename);
    image
        .save(&path)
        .with_context(|| format!("could not write {}", path.display()))
}
