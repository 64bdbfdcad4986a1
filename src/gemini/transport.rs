use crate::error::GatewayError;
use crate::journal::config::{Credentials, ModelConfig};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// The host could not be reached or the connection broke mid-request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure(pub String);

/// One POST of a `generateContent` payload. Implementations differ only in
/// where the request goes and how it is authenticated.
pub trait Transport {
    fn label(&self) -> &'static str;
    fn send(&self, payload: &Value) -> Result<HttpReply, TransportFailure>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn send(&self, payload: &Value) -> Result<HttpReply, TransportFailure> {
        (**self).send(payload)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn send(&self, payload: &Value) -> Result<HttpReply, TransportFailure> {
        (**self).send(payload)
    }
}

fn build_client(timeout_secs: u64) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|err| GatewayError::Config(format!("failed to build HTTP client: {err}")))
}

fn post_json(
    request: reqwest::blocking::RequestBuilder,
    payload: &Value,
) -> Result<HttpReply, TransportFailure> {
    let response = request
        .json(payload)
        .send()
        .map_err(|err| TransportFailure(err.without_url().to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| TransportFailure(err.without_url().to_string()))?;
    Ok(HttpReply { status, body })
}

/// Calls the provider with a locally held API key. The key travels in a
/// header so it never shows up in URLs or error messages.
pub struct DirectTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl DirectTransport {
    pub fn new(cfg: &ModelConfig, api_key: &str) -> Result<Self, GatewayError> {
        let base = cfg.base_url.trim_end_matches('/');
        Ok(Self {
            client: build_client(cfg.request_timeout_secs)?,
            endpoint: format!("{base}/v1beta/models/{}:generateContent", cfg.model),
            api_key: api_key.to_string(),
        })
    }
}

impl Transport for DirectTransport {
    fn label(&self) -> &'static str {
        "direct"
    }

    fn send(&self, payload: &Value) -> Result<HttpReply, TransportFailure> {
        post_json(
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key),
            payload,
        )
    }
}

/// Same-origin relay that holds the credential server-side and forwards the
/// identical request/response shape. The model name rides in the body.
pub struct ProxyTransport {
    client: Client,
    url: String,
    model: String,
}

impl ProxyTransport {
    pub fn new(cfg: &ModelConfig, url: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_client(cfg.request_timeout_secs)?,
            url: url.to_string(),
            model: cfg.model.clone(),
        })
    }
}

impl Transport for ProxyTransport {
    fn label(&self) -> &'static str {
        "proxy"
    }

    fn send(&self, payload: &Value) -> Result<HttpReply, TransportFailure> {
        let mut body = payload.clone();
        body["model"] = Value::String(self.model.clone());
        post_json(self.client.post(&self.url), &body)
    }
}

/// Direct mode when a client-side key is configured, relay mode otherwise.
pub fn select_transport(
    cfg: &ModelConfig,
    creds: &Credentials,
) -> Result<Box<dyn Transport>, GatewayError> {
    if let Some(key) = creds.gemini_api_key.as_deref() {
        return Ok(Box::new(DirectTransport::new(cfg, key)?));
    }
    if let Some(url) = creds.proxy_url.as_deref() {
        return Ok(Box::new(ProxyTransport::new(cfg, url)?));
    }
    Err(GatewayError::Config(
        "no model credential: set GEMINI_API_KEY for direct calls or DAYLENS_PROXY_URL for the relay"
            .to_string(),
    ))
}
