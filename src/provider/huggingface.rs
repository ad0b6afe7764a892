use super::{ChatMessage, Provider, Role};
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PUBLIC_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";

/// Cold-start retries against the inference endpoint.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(1500);

/// Pause before the one-off chat-completions fallback probe.
const FALLBACK_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointMode {
    /// Raw `inputs` + `parameters` body at the endpoint root.
    #[default]
    Default,
    /// OpenAI-compatible chat body at `/v1/chat/completions`.
    OpenAiChat,
    /// OpenAI-compatible prompt body at `/v1/completions`.
    OpenAiCompletions,
}

impl EndpointMode {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "openai-chat" => Ok(Self::OpenAiChat),
            "openai-completions" => Ok(Self::OpenAiCompletions),
            other => Err(anyhow!("unknown endpoint mode: {other}")),
        }
    }
}

/// Client-direct endpoint from local settings; tried before anything else.
#[derive(Debug, Clone)]
pub struct DirectEndpoint {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    http: reqwest::Client,
    /// Bearer token; only required when the call reaches the provider
    /// itself (the direct-endpoint and proxy paths carry their own auth).
    token: Option<String>,
    model: String,
    endpoint_url: Option<String>,
    endpoint_mode: EndpointMode,
    proxy_base_url: Option<String>,
    direct: Option<DirectEndpoint>,
}

impl HuggingFaceProvider {
    pub fn new(
        http: reqwest::Client,
        token: Option<String>,
        model: String,
        endpoint_url: Option<String>,
        endpoint_mode: EndpointMode,
        proxy_base_url: Option<String>,
        direct: Option<DirectEndpoint>,
    ) -> Self {
        Self {
            http,
            token,
            model,
            endpoint_url: endpoint_url.map(|u| u.trim_end_matches('/').to_string()),
            endpoint_mode,
            proxy_base_url: proxy_base_url.map(|u| u.trim_end_matches('/').to_string()),
            direct,
        }
    }

    /// Transports in preference order; first success wins. Failures of the
    /// optional paths are logged and fall through, never surfaced.
    async fn chat(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        let prompt = flatten_prompt(&messages);

        if let Some(direct) = &self.direct {
            match self.via_client_direct(direct, &prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => tracing::debug!("client-direct call failed, falling through: {e:#}"),
            }
        }

        if let Some(base) = &self.proxy_base_url {
            match self.via_proxy(base, &prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => tracing::debug!("proxy call failed, falling through: {e:#}"),
            }
        }

        self.via_provider(&prompt).await
    }

    async fn via_client_direct(
        &self,
        direct: &DirectEndpoint,
        prompt: &str,
    ) -> anyhow::Result<String> {
        let url = direct.url.trim_end_matches('/');
        let resp = self
            .http
            .post(url)
            .headers(bearer_headers(&direct.token)?)
            .json(&inference_body(prompt))
            .send()
            .await
            .context("failed to reach direct endpoint")?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("direct endpoint error: HTTP {status}: {text}"));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(data) => Ok(extract_inference_text(&data)),
            // Endpoint returned plain text; pass it through.
            Err(_) => Ok(text.trim().to_string()),
        }
    }

    async fn via_proxy(&self, base: &str, prompt: &str) -> anyhow::Result<String> {
        let body = ProxyRequest {
            prompt: prompt.to_string(),
            parameters: InferenceParameters::default(),
        };

        let resp = self
            .http
            .post(format!("{base}/api/v1/ai/hf"))
            .json(&body)
            .send()
            .await
            .context("failed to reach proxy")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("proxy error: HTTP {status}"));
        }

        let reply: ProxyResponse = resp.json().await.context("failed to parse proxy JSON")?;
        if reply.ok && !reply.text.trim().is_empty() {
            Ok(reply.text.trim().to_string())
        } else {
            Err(anyhow!("proxy returned no text"))
        }
    }

    async fn via_provider(&self, prompt: &str) -> anyhow::Result<String> {
        let token = self
            .token
            .as_deref()
            .context("missing Hugging Face API token (set HF_API_TOKEN, the settings file, or config.toml)")?;
        let headers = bearer_headers(token)?;

        let base_url = match &self.endpoint_url {
            Some(url) => url.clone(),
            None => public_inference_url(&self.model),
        };

        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let (path, body) = match self.endpoint_mode {
                EndpointMode::OpenAiChat => (
                    "/v1/chat/completions",
                    serde_json::to_value(chat_body(&self.model, prompt))?,
                ),
                EndpointMode::OpenAiCompletions => (
                    "/v1/completions",
                    serde_json::to_value(CompletionsBody {
                        model: self.model.clone(),
                        prompt: prompt.to_string(),
                        max_tokens: 512,
                        temperature: 0.3,
                        stream: false,
                    })?,
                ),
                EndpointMode::Default => ("", serde_json::to_value(inference_body(prompt))?),
            };

            let resp = self
                .http
                .post(format!("{base_url}{path}"))
                .headers(headers.clone())
                .json(&body)
                .send()
                .await
                .context("failed to reach Hugging Face")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();

                // A dedicated endpoint that rejects the raw-inputs path may
                // still speak the OpenAI dialect; probe it once.
                if self.endpoint_mode == EndpointMode::Default
                    && self.endpoint_url.is_some()
                    && (status.as_u16() == 404 || status.as_u16() == 405)
                {
                    tokio::time::sleep(FALLBACK_PAUSE).await;
                    if let Some(out) = self.chat_fallback(&base_url, &headers, prompt).await {
                        return Ok(out);
                    }
                }

                if is_transient(status.as_u16(), &text) {
                    tracing::debug!(attempt, %status, "model loading, backing off");
                    last_err = Some(anyhow!("Hugging Face loading: HTTP {status}: {text}"));
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }

                return Err(anyhow!("Hugging Face error: HTTP {status}: {text}"));
            }

            let data: Value = resp.json().await.context("failed to parse Hugging Face JSON")?;
            return Ok(extract_inference_text(&data));
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Hugging Face request failed")))
    }

    /// One extra attempt against the chat-completions path. Returns None on
    /// any failure so the caller keeps its original error handling.
    async fn chat_fallback(
        &self,
        base_url: &str,
        headers: &HeaderMap,
        prompt: &str,
    ) -> Option<String> {
        let resp = self
            .http
            .post(format!("{base_url}/v1/chat/completions"))
            .headers(headers.clone())
            .json(&chat_body(&self.model, prompt))
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            return None;
        }

        let data: Value = resp.json().await.ok()?;
        let out = extract_chat_text(&data)?;
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

impl Provider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>,
    > {
        let this = self.clone();
        Box::pin(async move { this.chat(messages).await })
    }
}

/// Model ids contain `/`; the public inference API takes them
/// percent-encoded as a single path segment.
fn public_inference_url(model: &str) -> String {
    format!("{PUBLIC_INFERENCE_BASE}/{}", urlencoding::encode(model))
}

fn bearer_headers(token: &str) -> anyhow::Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let v = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| anyhow!(e))?;
    h.insert(AUTHORIZATION, v);
    Ok(h)
}

/// Flatten a conversation into one instruction-style prompt: system lines
/// first under a "System:" prefix, then each remaining turn prefixed with
/// its upper-cased role, ending with an "Assistant:" cue.
pub fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let sys = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let rest = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => unreachable!(),
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = String::new();
    if !sys.is_empty() {
        prompt.push_str(&format!("System: {sys}\n\n"));
    }
    prompt.push_str(&rest);
    prompt.push_str("\n\nAssistant:");
    prompt
}

#[derive(Debug, Clone, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.3,
            return_full_text: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

#[derive(Debug, Clone, Serialize)]
struct InferenceBody {
    inputs: String,
    parameters: InferenceParameters,
    options: InferenceOptions,
}

fn inference_body(prompt: &str) -> InferenceBody {
    InferenceBody {
        inputs: prompt.to_string(),
        parameters: InferenceParameters::default(),
        options: InferenceOptions { wait_for_model: true },
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<ChatBodyMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ChatBodyMessage {
    role: String,
    content: String,
}

fn chat_body(model: &str, prompt: &str) -> ChatBody {
    ChatBody {
        model: model.to_string(),
        messages: vec![ChatBodyMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        max_tokens: 512,
        temperature: 0.3,
        stream: false,
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompletionsBody {
    model: String,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ProxyRequest {
    prompt: String,
    parameters: InferenceParameters,
}

#[derive(Debug, Clone, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    text: String,
}

pub fn is_transient(status: u16, body: &str) -> bool {
    status == 503 || body.to_ascii_lowercase().contains("loading")
}

pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_STEP * attempt
}

/// Pull response text out of the known inference response shapes; falls
/// back to a truncated rendering of the raw body so callers always get a
/// string to show.
fn extract_inference_text(data: &Value) -> String {
    if let Some(s) = data
        .get(0)
        .and_then(|v| v.get("generated_text"))
        .and_then(Value::as_str)
    {
        return s.trim().to_string();
    }
    if let Some(s) = data.get("generated_text").and_then(Value::as_str) {
        return s.trim().to_string();
    }
    // Alternate keys appear both as a bare object and as a one-element array.
    for holder in [data.get(0), Some(data)].into_iter().flatten() {
        for key in ["output_text", "summary_text", "answer"] {
            if let Some(s) = holder.get(key).and_then(Value::as_str) {
                let s = s.trim();
                if !s.is_empty() {
                    return s.to_string();
                }
            }
        }
    }

    let raw = match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.chars().take(2000).collect::<String>().trim().to_string()
}

/// `choices[0].message.content` or `choices[0].text` from an
/// OpenAI-compatible response.
fn extract_chat_text(data: &Value) -> Option<String> {
    let first = data.get("choices")?.get(0)?;
    let out = first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| first.get("text").and_then(Value::as_str))?;
    Some(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_orders_system_first() {
        let messages = vec![
            ChatMessage::system("Be terse."),
            ChatMessage::user("hello"),
            ChatMessage {
                role: Role::Assistant,
                content: "hi".to_string(),
            },
            ChatMessage::user("bye"),
        ];
        let prompt = flatten_prompt(&messages);
        assert_eq!(
            prompt,
            "System: Be terse.\n\nUSER: hello\nASSISTANT: hi\nUSER: bye\n\nAssistant:"
        );
    }

    #[test]
    fn flatten_without_system_has_no_prefix() {
        let prompt = flatten_prompt(&[ChatMessage::user("hello")]);
        assert_eq!(prompt, "USER: hello\n\nAssistant:");
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient(503, ""));
        assert!(is_transient(500, "Model is currently Loading"));
        assert!(!is_transient(500, "boom"));
        assert!(!is_transient(404, ""));
    }

    #[test]
    fn backoff_is_linear() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1500));
        assert_eq!(backoff_delay(2), Duration::from_millis(3000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4500));
    }

    #[test]
    fn endpoint_mode_parsing() {
        assert_eq!(EndpointMode::parse("").unwrap(), EndpointMode::Default);
        assert_eq!(EndpointMode::parse("default").unwrap(), EndpointMode::Default);
        assert_eq!(
            EndpointMode::parse("OpenAI-Chat").unwrap(),
            EndpointMode::OpenAiChat
        );
        assert_eq!(
            EndpointMode::parse("openai-completions").unwrap(),
            EndpointMode::OpenAiCompletions
        );
        assert!(EndpointMode::parse("grpc").is_err());
    }

    #[test]
    fn extracts_generated_text_array() {
        let data: Value = serde_json::from_str(r#"[{"generated_text": " hi "}]"#).unwrap();
        assert_eq!(extract_inference_text(&data), "hi");
    }

    #[test]
    fn extracts_generated_text_object() {
        let data: Value = serde_json::from_str(r#"{"generated_text": "hi"}"#).unwrap();
        assert_eq!(extract_inference_text(&data), "hi");
    }

    #[test]
    fn extracts_alternate_keys() {
        let data: Value = serde_json::from_str(r#"[{"summary_text": "short"}]"#).unwrap();
        assert_eq!(extract_inference_text(&data), "short");
        let data: Value = serde_json::from_str(r#"[{"answer": "42"}]"#).unwrap();
        assert_eq!(extract_inference_text(&data), "42");
    }

    #[test]
    fn extracts_alternate_keys_from_bare_objects() {
        let data: Value = serde_json::from_str(r#"{"output_text": "hello"}"#).unwrap();
        assert_eq!(extract_inference_text(&data), "hello");
        let data: Value = serde_json::from_str(r#"{"summary_text": " short "}"#).unwrap();
        assert_eq!(extract_inference_text(&data), "short");
        let data: Value = serde_json::from_str(r#"{"answer": "42"}"#).unwrap();
        assert_eq!(extract_inference_text(&data), "42");
    }

    #[test]
    fn public_url_percent_encodes_model_ids() {
        assert_eq!(
            public_inference_url("HuggingFaceH4/zephyr-7b-beta"),
            "https://api-inference.huggingface.co/models/HuggingFaceH4%2Fzephyr-7b-beta"
        );
        assert_eq!(
            public_inference_url("org/model v2"),
            "https://api-inference.huggingface.co/models/org%2Fmodel%20v2"
        );
    }

    #[test]
    fn unknown_shape_is_stringified_and_truncated() {
        let data = Value::String("x".repeat(5000));
        assert_eq!(extract_inference_text(&data).len(), 2000);

        let data: Value = serde_json::from_str(r#"{"weird": 1}"#).unwrap();
        assert_eq!(extract_inference_text(&data), r#"{"weird":1}"#);
    }

    #[test]
    fn chat_text_from_message_or_text() {
        let data: Value =
            serde_json::from_str(r#"{"choices":[{"message":{"content":" out "}}]}"#).unwrap();
        assert_eq!(extract_chat_text(&data).as_deref(), Some("out"));

        let data: Value = serde_json::from_str(r#"{"choices":[{"text":"raw"}]}"#).unwrap();
        assert_eq!(extract_chat_text(&data).as_deref(), Some("raw"));

        let data: Value = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_chat_text(&data).is_none());
    }

    use crate::provider::testutil::TestServer;

    fn endpoint_provider(server: &TestServer, mode: EndpointMode) -> HuggingFaceProvider {
        HuggingFaceProvider::new(
            reqwest::Client::new(),
            Some("hf-test".to_string()),
            "org/test-model".to_string(),
            Some(server.url("")),
            mode,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn three_loading_responses_reject_after_backoff() {
        let loading = r#"{"error":"Model org/test-model is currently loading"}"#;
        let server = TestServer::spawn(vec![
            (503, loading.to_string()),
            (503, loading.to_string()),
            (503, loading.to_string()),
        ])
        .await;

        let p = endpoint_provider(&server, EndpointMode::Default);
        let started = std::time::Instant::now();
        let err = p
            .send_chat(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("loading"));
        assert_eq!(server.requests().len(), 3);
        // Backoff between attempts: 1500ms + 3000ms.
        assert!(started.elapsed() >= Duration::from_millis(4500));
    }

    #[tokio::test]
    async fn default_mode_endpoint_falls_back_to_chat_completions() {
        let server = TestServer::spawn(vec![
            (404, r#"{"error":"Not Found"}"#.to_string()),
            (
                200,
                r#"{"choices":[{"message":{"content":"via chat path"}}]}"#.to_string(),
            ),
        ])
        .await;

        let p = endpoint_provider(&server, EndpointMode::Default);
        let reply = p.send_chat(vec![ChatMessage::user("hi")]).await.unwrap();

        assert_eq!(reply, "via chat path");
        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("POST /v1/chat/completions"));
    }
}
