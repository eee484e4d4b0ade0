//! Client for the remote completion endpoint.
//!
//! Translates a quiz question into a single-letter answer, tracks token
//! usage, and estimates cost. Transport failures are retried with exponential
//! backoff; a malformed response is not retried (it indicates a response-shape
//! problem, not a transient one). Both failure modes degrade to sentinel
//! answers instead of propagating errors, so one flaky request never takes
//! down the watcher loop.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::AnswerCache;
use crate::hash::question_hash;

/// Maximum completion attempts per question.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry; doubles on each subsequent retry.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Per-request transport timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings the client needs, extracted from [`crate::config::QuizConfig`].
#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl ModelSettings {
    pub fn from_config(config: &crate::config::QuizConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            input_cost_per_1k: config.input_cost_per_1k,
            output_cost_per_1k: config.output_cost_per_1k,
        }
    }
}

/// Token usage reported by the endpoint for one completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Outcome of asking the model one question.
///
/// Failure variants render as sentinel strings and flow through the same
/// downstream path as real letters; callers match on the variant to decide
/// whether a click makes sense.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuizAnswer {
    Letter(char),
    ApiFailure,
    MalformedResponse,
}

impl std::fmt::Display for QuizAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuizAnswer::Letter(c) => write!(f, "{}", c),
            QuizAnswer::ApiFailure => write!(f, "Error: API request failed"),
            QuizAnswer::MalformedResponse => write!(f, "Error: malformed response"),
        }
    }
}

/// One answered question: the answer plus what it cost to obtain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnswerRecord {
    pub answer: QuizAnswer,
    pub usage: Option<Usage>,
    pub cost: f64,
}

impl AnswerRecord {
    /// A cache hit: the letter is known, nothing was spent.
    fn cached(letter: char) -> Self {
        Self { answer: QuizAnswer::Letter(letter), usage: None, cost: 0.0 }
    }

    /// A degraded outcome with no usage and zero cost.
    fn sentinel(answer: QuizAnswer) -> Self {
        Self { answer, usage: None, cost: 0.0 }
    }
}

/// Request body for the completion endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub input: String,
}

/// Response body from the completion endpoint.
///
/// Only the fields the quiz pipeline reads are modeled; everything else in
/// the payload is ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<UsageCounters>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct UsageCounters {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Transport seam for the completion endpoint.
///
/// The production implementation is [`HttpCompletionApi`]; tests substitute
/// scripted implementations to exercise retry and parse behavior without a
/// network.
pub trait CompletionApi: Send {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

/// Blocking HTTP transport carrying bearer-authenticated JSON requests.
pub struct HttpCompletionApi {
    http: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
}

impl HttpCompletionApi {
    pub fn new(api_url: String, api_key: String) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, api_url, api_key })
    }
}

impl CompletionApi for HttpCompletionApi {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }
}

type SleepFn = Box<dyn FnMut(Duration) + Send>;

/// Synchronous client answering quiz questions through a completion endpoint.
pub struct ModelClient {
    api: Box<dyn CompletionApi>,
    cache: AnswerCache,
    settings: ModelSettings,
    sleep: SleepFn,
}

impl ModelClient {
    /// Creates a client backed by the real HTTP transport.
    ///
    /// Fails immediately when no API credential is configured: a missing key
    /// is a setup problem, not something to discover on the first question.
    pub fn new(settings: ModelSettings, cache: AnswerCache) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("API key is required");
        }
        let api = HttpCompletionApi::new(settings.api_url.clone(), settings.api_key.clone())?;
        Ok(Self::with_api(Box::new(api), settings, cache))
    }

    /// Creates a client over an arbitrary transport. Test seam.
    pub fn with_api(
        api: Box<dyn CompletionApi>,
        settings: ModelSettings,
        cache: AnswerCache,
    ) -> Self {
        Self {
            api,
            cache,
            settings,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replaces the backoff sleep function. Test seam.
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn cache(&self) -> &AnswerCache {
        &self.cache
    }

    /// Asks the model for the answer to a quiz question.
    ///
    /// Consults the cache first; a hit costs nothing. Otherwise submits the
    /// instruction prompt, retrying transport failures up to [`MAX_ATTEMPTS`]
    /// times with doubling backoff. Never returns an error: exhausted retries
    /// and unparseable responses come back as sentinel records.
    pub fn ask(&mut self, question: &str) -> AnswerRecord {
        let hash = question_hash(question);
        if let Some(letter) = self.cache.get(&hash) {
            crate::log(&format!("Cache hit for question {}", &hash[..12]));
            return AnswerRecord::cached(letter);
        }

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            input: format!(
                "Answer the quiz question with a single letter in JSON: {}",
                question
            ),
        };

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            let response = match self.api.complete(&request) {
                Ok(response) => response,
                Err(e) => {
                    crate::log(&format!(
                        "Completion request failed (attempt {}/{}): {}",
                        attempt, MAX_ATTEMPTS, e
                    ));
                    if attempt == MAX_ATTEMPTS {
                        return AnswerRecord::sentinel(QuizAnswer::ApiFailure);
                    }
                    (self.sleep)(backoff);
                    backoff *= 2;
                    continue;
                }
            };

            let Some(letter) = extract_answer(&response) else {
                crate::log("Completion response did not contain a parseable answer");
                return AnswerRecord::sentinel(QuizAnswer::MalformedResponse);
            };

            let usage = response.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            });
            let cost = usage.map_or(0.0, |u| self.compute_cost(u));
            self.cache.put(hash, letter);
            return AnswerRecord { answer: QuizAnswer::Letter(letter), usage, cost };
        }

        AnswerRecord::sentinel(QuizAnswer::ApiFailure)
    }

    /// Cost of one completion given the endpoint's reported token counts and
    /// the configured per-1000-token unit prices.
    fn compute_cost(&self, usage: Usage) -> f64 {
        (usage.input_tokens as f64 * self.settings.input_cost_per_1k
            + usage.output_tokens as f64 * self.settings.output_cost_per_1k)
            / 1000.0
    }
}

/// Pulls the answer letter out of a completion response.
///
/// The text payload must be a JSON object with an `"answer"` field holding a
/// single letter. Missing output items, invalid JSON, a missing field, or a
/// multi-character answer all yield None.
fn extract_answer(response: &CompletionResponse) -> Option<char> {
    let text = &response.output.first()?.content.first()?.text;
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let answer = value.get("answer")?.as_str()?.trim();
    let mut chars = answer.chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_alphabetic() {
        return None;
    }
    Some(letter.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn settings() -> ModelSettings {
        ModelSettings {
            api_key: "test-key".to_string(),
            api_url: "http://localhost/v1/responses".to_string(),
            model: "test-model".to_string(),
            temperature: 0.0,
            input_cost_per_1k: 0.005,
            output_cost_per_1k: 0.015,
        }
    }

    fn answer_response(text: &str, usage: Option<(u32, u32)>) -> CompletionResponse {
        CompletionResponse {
            output: vec![OutputItem {
                content: vec![ContentItem { text: text.to_string() }],
            }],
            usage: usage.map(|(input_tokens, output_tokens)| UsageCounters {
                input_tokens,
                output_tokens,
            }),
        }
    }

    /// Scripted transport: pops one outcome per call and counts calls.
    struct ScriptedApi {
        outcomes: Mutex<VecDeque<Result<CompletionResponse>>>,
        calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(outcomes: Vec<Result<CompletionResponse>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CompletionApi for ScriptedApi {
        fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn recording_sleep(sleeps: Arc<Mutex<Vec<Duration>>>) -> SleepFn {
        Box::new(move |d| sleeps.lock().unwrap().push(d))
    }

    fn client_with_script(
        outcomes: Vec<Result<CompletionResponse>>,
        sleeps: Arc<Mutex<Vec<Duration>>>,
    ) -> (ModelClient, Arc<ScriptedApi>) {
        let api = Arc::new(ScriptedApi::new(outcomes));
        let client = ModelClient::with_api(
            Box::new(SharedApi(api.clone())),
            settings(),
            AnswerCache::new(),
        )
        .with_sleep(recording_sleep(sleeps));
        (client, api)
    }

    /// Lets the test keep a handle on the scripted transport after it is boxed.
    struct SharedApi(Arc<ScriptedApi>);

    impl CompletionApi for SharedApi {
        fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            self.0.complete(request)
        }
    }

    #[test]
    fn test_missing_api_key_is_a_construction_error() {
        let mut s = settings();
        s.api_key = "  ".to_string();
        assert!(ModelClient::new(s, AnswerCache::new()).is_err());
    }

    #[test]
    fn test_parses_answer_letter() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, api) = client_with_script(
            vec![Ok(answer_response(r#"{"answer": "c"}"#, Some((5, 2))))],
            sleeps.clone(),
        );

        let record = client.ask("Q?");
        assert_eq!(record.answer, QuizAnswer::Letter('C'));
        assert_eq!(record.usage, Some(Usage { input_tokens: 5, output_tokens: 2 }));
        assert_eq!(api.calls(), 1);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_second_ask_hits_cache_with_zero_cost() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, api) = client_with_script(
            vec![Ok(answer_response(r#"{"answer": "B"}"#, Some((100, 10))))],
            sleeps,
        );

        let first = client.ask("Q?");
        assert_eq!(first.answer, QuizAnswer::Letter('B'));
        assert!(first.cost > 0.0);

        let second = client.ask("Q?");
        assert_eq!(second.answer, QuizAnswer::Letter('B'));
        assert_eq!(second.usage, None);
        assert_eq!(second.cost, 0.0);
        assert_eq!(api.calls(), 1, "cache hit must not issue a network call");
    }

    #[test]
    fn test_retry_sleeps_once_then_succeeds() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, api) = client_with_script(
            vec![
                Err(anyhow::anyhow!("connection reset")),
                Ok(answer_response(r#"{"answer": "A"}"#, Some((1, 1)))),
            ],
            sleeps.clone(),
        );

        let record = client.ask("Q?");
        assert_eq!(record.answer, QuizAnswer::Letter('A'));
        assert_eq!(api.calls(), 2);
        assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_exhausted_retries_degrade_to_sentinel() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, api) = client_with_script(
            vec![
                Err(anyhow::anyhow!("fail 1")),
                Err(anyhow::anyhow!("fail 2")),
                Err(anyhow::anyhow!("fail 3")),
            ],
            sleeps.clone(),
        );

        let record = client.ask("Q?");
        assert_eq!(record.answer, QuizAnswer::ApiFailure);
        assert_eq!(record.usage, None);
        assert_eq!(record.cost, 0.0);
        assert_eq!(record.answer.to_string(), "Error: API request failed");
        assert_eq!(api.calls(), 3);
        assert_eq!(
            *sleeps.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert!(client.cache().is_empty(), "failures must not be cached");
    }

    #[test]
    fn test_malformed_json_is_not_retried() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, api) =
            client_with_script(vec![Ok(answer_response("not json at all", Some((1, 1))))], sleeps.clone());

        let record = client.ask("Q?");
        assert_eq!(record.answer, QuizAnswer::MalformedResponse);
        assert_eq!(record.answer.to_string(), "Error: malformed response");
        assert_eq!(api.calls(), 1, "response-shape problems are not transient");
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_answer_field_is_malformed() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, _) =
            client_with_script(vec![Ok(answer_response(r#"{"verdict": "A"}"#, None))], sleeps);
        assert_eq!(client.ask("Q?").answer, QuizAnswer::MalformedResponse);
    }

    #[test]
    fn test_empty_output_is_malformed() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, _) =
            client_with_script(vec![Ok(CompletionResponse::default())], sleeps);
        assert_eq!(client.ask("Q?").answer, QuizAnswer::MalformedResponse);
    }

    #[test]
    fn test_multi_letter_answer_is_malformed() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, _) = client_with_script(
            vec![Ok(answer_response(r#"{"answer": "AB"}"#, None))],
            sleeps,
        );
        assert_eq!(client.ask("Q?").answer, QuizAnswer::MalformedResponse);
    }

    #[test]
    fn test_cost_computation() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, _) = client_with_script(
            vec![Ok(answer_response(r#"{"answer": "D"}"#, Some((1000, 2000))))],
            sleeps,
        );

        let record = client.ask("Q?");
        // (1000 * 0.005 + 2000 * 0.015) / 1000
        assert!((record.cost - 0.035).abs() < 1e-12);
    }

    #[test]
    fn test_missing_usage_means_zero_cost() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let (mut client, _) = client_with_script(
            vec![Ok(answer_response(r#"{"answer": "D"}"#, None))],
            sleeps,
        );

        let record = client.ask("Q?");
        assert_eq!(record.answer, QuizAnswer::Letter('D'));
        assert_eq!(record.usage, None);
        assert_eq!(record.cost, 0.0);
    }
}
