//! Question handling: model answer → pointer click → event log.
//!
//! This is the callback the watcher invokes for each newly detected question.
//! It runs on the watcher thread, so exactly one question is in flight at a
//! time and a slow completion call pauses polling until it resolves.

use anyhow::{Context, Result};
use chrono::Local;

use crate::clicker::resolve_click;
use crate::client::{ModelClient, QuizAnswer};
use crate::config::Region;
use crate::events::{EventLog, QuizEvent};

type ClickFn = Box<dyn FnMut(i32, i32) -> Result<()> + Send>;

/// Drives one question from OCR text to a clicked and logged answer.
pub struct QuizPipeline {
    client: ModelClient,
    region: Region,
    option_count: u8,
    event_log: Box<dyn EventLog>,
    click: ClickFn,
}

impl QuizPipeline {
    pub fn new(
        client: ModelClient,
        region: Region,
        option_count: u8,
        event_log: Box<dyn EventLog>,
    ) -> Self {
        Self {
            client,
            region,
            option_count,
            event_log,
            click: Box::new(crate::clicker::click),
        }
    }

    /// Replaces the click action. Test seam.
    pub fn with_click(mut self, click: ClickFn) -> Self {
        self.click = click;
        self
    }

    /// Handles one detected question.
    ///
    /// Sentinel answers (API failure, malformed response) are logged with
    /// coordinates (0, 0) and never reach the clicker; clicking a random
    /// option band on a failure would be worse than doing nothing.
    pub fn handle_question(&mut self, question: &str) -> Result<()> {
        let record = self.client.ask(question);
        crate::log(&format!("{} -> {}", question, record.answer));

        let (x, y) = match record.answer {
            QuizAnswer::Letter(letter) => {
                let point = resolve_click(letter, &self.region, self.option_count)
                    .context("model answered outside the option range")?;
                (self.click)(point.0, point.1).context("pointer click failed")?;
                point
            }
            QuizAnswer::ApiFailure | QuizAnswer::MalformedResponse => (0, 0),
        };

        let (input_tokens, output_tokens) =
            record.usage.map_or((0, 0), |u| (u.input_tokens, u.output_tokens));
        self.event_log.append(&QuizEvent {
            timestamp: Local::now(),
            question: question.to_string(),
            answer: record.answer.to_string(),
            x,
            y,
            input_tokens,
            output_tokens,
            cost: record.cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AnswerCache;
    use crate::client::{
        CompletionApi, CompletionRequest, CompletionResponse, ContentItem, ModelSettings,
        OutputItem, UsageCounters,
    };
    use std::sync::{Arc, Mutex};

    struct FixedApi {
        text: String,
        fail: bool,
    }

    impl CompletionApi for FixedApi {
        fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
            if self.fail {
                anyhow::bail!("network down");
            }
            Ok(CompletionResponse {
                output: vec![OutputItem {
                    content: vec![ContentItem { text: self.text.clone() }],
                }],
                usage: Some(UsageCounters { input_tokens: 10, output_tokens: 2 }),
            })
        }
    }

    #[derive(Default)]
    struct MemoryEventLog {
        events: Arc<Mutex<Vec<QuizEvent>>>,
    }

    impl EventLog for MemoryEventLog {
        fn append(&mut self, event: &QuizEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            api_key: "test-key".to_string(),
            api_url: "http://localhost".to_string(),
            model: "test-model".to_string(),
            temperature: 0.0,
            input_cost_per_1k: 1.0,
            output_cost_per_1k: 1.0,
        }
    }

    fn pipeline(
        api: FixedApi,
        clicks: Arc<Mutex<Vec<(i32, i32)>>>,
        events: Arc<Mutex<Vec<QuizEvent>>>,
    ) -> QuizPipeline {
        let client = ModelClient::with_api(Box::new(api), settings(), AnswerCache::new())
            .with_sleep(Box::new(|_| {}));
        let region = Region { left: 0, top: 0, width: 100, height: 400 };
        QuizPipeline::new(client, region, 4, Box::new(MemoryEventLog { events }))
            .with_click(Box::new(move |x, y| {
                clicks.lock().unwrap().push((x, y));
                Ok(())
            }))
    }

    #[test]
    fn test_answered_question_is_clicked_and_logged() {
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(
            FixedApi { text: r#"{"answer": "C"}"#.to_string(), fail: false },
            clicks.clone(),
            events.clone(),
        );

        pipeline.handle_question("What is 2+2?").unwrap();

        assert_eq!(*clicks.lock().unwrap(), vec![(50, 250)]);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].question, "What is 2+2?");
        assert_eq!(events[0].answer, "C");
        assert_eq!((events[0].x, events[0].y), (50, 250));
        assert_eq!(events[0].input_tokens, 10);
        assert_eq!(events[0].output_tokens, 2);
        assert!((events[0].cost - 0.012).abs() < 1e-12);
    }

    #[test]
    fn test_api_failure_is_logged_but_not_clicked() {
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(
            FixedApi { text: String::new(), fail: true },
            clicks.clone(),
            events.clone(),
        );

        pipeline.handle_question("Q?").unwrap();

        assert!(clicks.lock().unwrap().is_empty(), "failures must not click");
        let events = events.lock().unwrap();
        assert_eq!(events[0].answer, "Error: API request failed");
        assert_eq!((events[0].x, events[0].y), (0, 0));
        assert_eq!(events[0].cost, 0.0);
    }

    #[test]
    fn test_out_of_range_answer_is_a_handler_error() {
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(
            FixedApi { text: r#"{"answer": "F"}"#.to_string(), fail: false },
            clicks.clone(),
            events.clone(),
        );

        assert!(pipeline.handle_question("Q?").is_err());
        assert!(clicks.lock().unwrap().is_empty());
    }
}
