use crate::error::{GatewayError, ParseFailure};
use crate::gemini::repair::{clean_text, parse_model_json};
use crate::gemini::transport::{HttpReply, Transport};
use crate::journal::config::GenerationProfile;
use crate::journal::schedule::{Sleeper, ThreadSleeper};
use crate::journal::util::truncate_with_ellipsis;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const BACKOFF_STEP_MS: u64 = 1000;
const MAX_ERROR_BODY_CHARS: usize = 400;
const EMPTY_OBJECT_PLACEHOLDER: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub json_mode: bool,
    pub retries: u32,
}

impl GenerateOptions {
    pub fn json(profile: GenerationProfile, retries: u32) -> Self {
        Self {
            max_output_tokens: profile.max_output_tokens,
            temperature: profile.temperature,
            json_mode: true,
            retries,
        }
    }

    pub fn text(profile: GenerationProfile, retries: u32) -> Self {
        Self {
            json_mode: false,
            ..Self::json(profile, retries)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Json(Value),
    Text(String),
}

impl ModelOutput {
    pub fn into_json(self) -> Value {
        match self {
            ModelOutput::Json(value) => value,
            ModelOutput::Text(text) => Value::String(text),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ModelOutput::Json(value) => value.to_string(),
            ModelOutput::Text(text) => text,
        }
    }
}

/// Anything that can answer a prompt. Analyzers depend on this rather than
/// on the HTTP gateway so they can be exercised without a network.
pub trait ModelClient {
    fn call(&self, prompt: &str, options: &GenerateOptions) -> Result<ModelOutput, GatewayError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
}

/// Pick the user-facing segment of a multi-part reply: the first part not
/// flagged as a thought, else the first part with text, else `{}`.
pub fn select_answer_text(parts: &[ResponsePart]) -> String {
    parts
        .iter()
        .find(|part| !part.thought && part.text.is_some())
        .or_else(|| parts.iter().find(|part| part.text.is_some()))
        .and_then(|part| part.text.clone())
        .unwrap_or_else(|| EMPTY_OBJECT_PLACEHOLDER.to_string())
}

pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_STEP_MS * u64::from(attempt))
}

pub fn build_payload(prompt: &str, options: &GenerateOptions) -> Value {
    let mut generation_config = json!({
        "maxOutputTokens": options.max_output_tokens,
        "temperature": options.temperature,
    });
    if options.json_mode {
        generation_config["responseMimeType"] = json!("application/json");
    }
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [{"text": prompt}]
            }
        ],
        "generationConfig": generation_config,
    })
}

pub struct ModelGateway<T, S = ThreadSleeper> {
    transport: T,
    sleeper: S,
}

impl<T: Transport> ModelGateway<T> {
    pub fn new(transport: T) -> Self {
        Self::with_sleeper(transport, ThreadSleeper)
    }
}

impl<T: Transport, S: Sleeper> ModelGateway<T, S> {
    pub fn with_sleeper(transport: T, sleeper: S) -> Self {
        Self { transport, sleeper }
    }

    pub fn transport_label(&self) -> &'static str {
        self.transport.label()
    }

    fn attempt(&self, payload: &Value) -> Result<String, GatewayError> {
        let HttpReply { status, body } =
            self.transport
                .send(payload)
                .map_err(|failure| GatewayError::Retryable {
                    status: None,
                    message: failure.0,
                })?;

        if status == 429 || status >= 500 {
            return Err(GatewayError::Retryable {
                status: Some(status),
                message: truncate_with_ellipsis(&body, MAX_ERROR_BODY_CHARS),
            });
        }
        if !(200..300).contains(&status) {
            return Err(GatewayError::Rejected {
                status,
                body: truncate_with_ellipsis(&body, MAX_ERROR_BODY_CHARS),
            });
        }
        Ok(body)
    }

    fn finish(&self, body: &str, options: &GenerateOptions) -> Result<ModelOutput, GatewayError> {
        let response: GenerateResponse = serde_json::from_str(body).map_err(|err| {
            GatewayError::Parse(ParseFailure {
                tail: format!("provider envelope unreadable: {err}"),
            })
        })?;

        let candidate = response.candidates.into_iter().next();
        let finish_reason = candidate
            .as_ref()
            .and_then(|c| c.finish_reason.clone())
            .unwrap_or_default();
        if finish_reason == "MAX_TOKENS" {
            warn!(
                max_output_tokens = options.max_output_tokens,
                "model output hit the token ceiling; attempting repair"
            );
        }

        let parts = candidate
            .and_then(|c| c.content)
            .map(|content| content.parts)
            .unwrap_or_default();
        if parts.len() > 1 {
            debug!(parts = parts.len(), "multi-part model reply");
        }
        let text = select_answer_text(&parts);

        if options.json_mode {
            Ok(ModelOutput::Json(parse_model_json(&text)?))
        } else {
            Ok(ModelOutput::Text(clean_text(&text)))
        }
    }
}

impl<T: Transport, S: Sleeper> ModelClient for ModelGateway<T, S> {
    fn call(&self, prompt: &str, options: &GenerateOptions) -> Result<ModelOutput, GatewayError> {
        let payload = build_payload(prompt, options);
        let attempts = options.retries + 1;
        let mut last_err: Option<GatewayError> = None;

        for attempt in 1..=attempts {
            match self.attempt(&payload) {
                Ok(body) => return self.finish(&body, options),
                Err(err) if err.is_retryable() => {
                    warn!(
                        attempt,
                        attempts,
                        transport = self.transport.label(),
                        error = %err,
                        "retryable model failure"
                    );
                    last_err = Some(err);
                    if attempt < attempts {
                        self.sleeper.sleep(backoff_delay(attempt));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| GatewayError::Config("no model attempts were made".into())))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::transport::TransportFailure;
    use crate::journal::schedule::testing::RecordingSleeper;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct ScriptedTransport {
        replies: RefCell<VecDeque<Result<HttpReply, TransportFailure>>>,
        fallback: Result<HttpReply, TransportFailure>,
        calls: Cell<u32>,
        payloads: RefCell<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn always(reply: Result<HttpReply, TransportFailure>) -> Self {
            Self {
                replies: RefCell::new(VecDeque::new()),
                fallback: reply,
                calls: Cell::new(0),
                payloads: RefCell::new(Vec::new()),
            }
        }

        fn sequence(replies: Vec<Result<HttpReply, TransportFailure>>) -> Self {
            let mut out = Self::always(Err(TransportFailure("script exhausted".into())));
            out.replies = RefCell::new(replies.into());
            out
        }
    }

    impl Transport for ScriptedTransport {
        fn label(&self) -> &'static str {
            "scripted"
        }

        fn send(&self, payload: &Value) -> Result<HttpReply, TransportFailure> {
            self.calls.set(self.calls.get() + 1);
            self.payloads.borrow_mut().push(payload.clone());
            match self.replies.borrow_mut().pop_front() {
                Some(reply) => reply,
                None => self.fallback.clone(),
            }
        }
    }

    fn status(code: u16) -> Result<HttpReply, TransportFailure> {
        Ok(HttpReply {
            status: code,
            body: format!("{{\"error\":{{\"code\":{code}}}}}"),
        })
    }

    fn ok_parts(parts: Value, finish_reason: &str) -> Result<HttpReply, TransportFailure> {
        Ok(HttpReply {
            status: 200,
            body: json!({
                "candidates": [{
                    "content": {"parts": parts},
                    "finishReason": finish_reason
                }]
            })
            .to_string(),
        })
    }

    fn opts(retries: u32, json_mode: bool) -> GenerateOptions {
        GenerateOptions {
            max_output_tokens: 1024,
            temperature: 0.2,
            json_mode,
            retries,
        }
    }

    #[test]
    fn always_rate_limited_makes_retries_plus_one_attempts_with_linear_backoff() {
        let transport = ScriptedTransport::always(status(429));
        let sleeper = RecordingSleeper::default();
        let gateway = ModelGateway::with_sleeper(&transport, sleeper.clone());

        let err = gateway.call("p", &opts(3, true)).expect_err("exhausted");
        assert_eq!(transport.calls.get(), 4);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
        match err {
            GatewayError::Retryable { status, .. } => assert_eq!(status, Some(429)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_retries_means_single_attempt_without_sleep() {
        let transport = ScriptedTransport::always(status(503));
        let sleeper = RecordingSleeper::default();
        let gateway = ModelGateway::with_sleeper(&transport, sleeper.clone());

        assert!(gateway.call("p", &opts(0, true)).is_err());
        assert_eq!(transport.calls.get(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn client_errors_propagate_immediately() {
        let transport = ScriptedTransport::sequence(vec![status(400), status(200)]);
        let sleeper = RecordingSleeper::default();
        let gateway = ModelGateway::with_sleeper(&transport, sleeper.clone());

        let err = gateway.call("p", &opts(5, true)).expect_err("rejected");
        assert!(matches!(err, GatewayError::Rejected { status: 400, .. }));
        assert_eq!(transport.calls.get(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn network_failure_and_server_error_are_retried_then_succeed() {
        let transport = ScriptedTransport::sequence(vec![
            Err(TransportFailure("connection refused".into())),
            status(502),
            ok_parts(json!([{"text": "{\"summary\":\"fine\"}"}]), "STOP"),
        ]);
        let sleeper = RecordingSleeper::default();
        let gateway = ModelGateway::with_sleeper(&transport, sleeper.clone());

        let out = gateway.call("p", &opts(2, true)).expect("success");
        assert_eq!(out, ModelOutput::Json(json!({"summary": "fine"})));
        assert_eq!(transport.calls.get(), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn thought_parts_are_never_returned() {
        let transport = ScriptedTransport::always(ok_parts(
            json!([
                {"text": "reasoning...", "thought": true},
                {"text": "{\"summary\":\"x\"}"}
            ]),
            "STOP",
        ));
        let gateway = ModelGateway::with_sleeper(&transport, RecordingSleeper::default());
        let out = gateway.call("p", &opts(0, true)).expect("success");
        assert_eq!(out.into_json(), json!({"summary": "x"}));
    }

    #[test]
    fn part_selection_fallbacks() {
        let only_thoughts = vec![
            ResponsePart {
                text: None,
                thought: true,
            },
            ResponsePart {
                text: Some("late thought".into()),
                thought: true,
            },
        ];
        assert_eq!(select_answer_text(&only_thoughts), "late thought");
        assert_eq!(select_answer_text(&[]), "{}");
    }

    #[test]
    fn truncated_reply_is_still_repaired() {
        let transport = ScriptedTransport::always(ok_parts(
            json!([{"text": "{\"summary\":\"ok\",\"insight\":\"fi"}]),
            "MAX_TOKENS",
        ));
        let gateway = ModelGateway::with_sleeper(&transport, RecordingSleeper::default());
        let out = gateway.call("p", &opts(0, true)).expect("repaired");
        assert_eq!(out.into_json(), json!({"summary": "ok", "insight": "fi"}));
    }

    #[test]
    fn text_mode_bypasses_repair() {
        let transport = ScriptedTransport::always(ok_parts(
            json!([{"text": "  I walked {to the lake\n"}]),
            "STOP",
        ));
        let gateway = ModelGateway::with_sleeper(&transport, RecordingSleeper::default());
        let out = gateway.call("p", &opts(0, false)).expect("text");
        assert_eq!(out, ModelOutput::Text("I walked {to the lake".into()));

        let payload = &transport.payloads.borrow()[0];
        assert!(payload["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn json_mode_requests_json_mime_type() {
        let payload = build_payload("hello", &opts(0, true));
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert_eq!(payload["contents"][0]["parts"][0]["text"], json!("hello"));
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], json!(1024));
    }

    #[test]
    fn unparseable_model_text_raises_parse_error_without_retry() {
        let transport =
            ScriptedTransport::always(ok_parts(json!([{"text": "sorry, no"}]), "STOP"));
        let gateway = ModelGateway::with_sleeper(&transport, RecordingSleeper::default());
        let err = gateway.call("p", &opts(3, true)).expect_err("parse");
        assert!(matches!(err, GatewayError::Parse(_)));
        assert_eq!(transport.calls.get(), 1);
    }
}
