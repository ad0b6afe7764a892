use super::{ChatMessage, Provider};
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One request may take this long end to end before being aborted.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MODELS: &[&str] = &["gpt-4", "gpt-4-0613", "gpt-3.5-turbo"];

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    /// Ordered candidates; a missing-model response advances to the next.
    models: Vec<String>,
    endpoint: Url,
}

impl OpenAiProvider {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        models: Vec<String>,
        endpoint_override: Option<Url>,
    ) -> anyhow::Result<Self> {
        if models.is_empty() {
            anyhow::bail!("OpenAI provider needs at least one model candidate");
        }
        let endpoint = match endpoint_override {
            Some(url) => url,
            None => Url::parse(DEFAULT_ENDPOINT)?,
        };
        Ok(Self {
            http,
            api_key,
            models,
            endpoint,
        })
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let v = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| anyhow!(e))?;
        h.insert(AUTHORIZATION, v);
        Ok(h)
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        let headers = self.headers()?;
        let mut last_err: Option<anyhow::Error> = None;

        for model in &self.models {
            let body = ChatCompletionRequest {
                model: model.clone(),
                messages: messages.clone(),
                temperature: 0.3,
                max_tokens: 2000,
            };

            let resp = self
                .http
                .post(self.endpoint.clone())
                .headers(headers.clone())
                .timeout(REQUEST_TIMEOUT)
                .json(&body)
                .send()
                .await
                .context("failed to reach OpenAI")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                match classify_failure(status.as_u16(), &text) {
                    FailureKind::Quota => {
                        return Err(anyhow!("OpenAI quota exceeded: HTTP {status}: {text}"));
                    }
                    FailureKind::MissingModel => {
                        tracing::debug!(%model, "model unavailable, trying next candidate");
                        last_err = Some(anyhow!("OpenAI error: HTTP {status}: {text}"));
                        continue;
                    }
                    FailureKind::Other => {
                        return Err(anyhow!("OpenAI error: HTTP {status}: {text}"));
                    }
                }
            }

            let parsed: ChatCompletionResponse =
                resp.json().await.context("failed to parse OpenAI JSON")?;
            return Ok(extract_content(&parsed));
        }

        Err(last_err.unwrap_or_else(|| anyhow!("OpenAI request failed")))
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_content(r: &ChatCompletionResponse) -> String {
    r.choices
        .first()
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Hard limit reached; retrying any candidate would be pointless.
    Quota,
    /// This account cannot see the model; the next candidate may work.
    MissingModel,
    Other,
}

pub fn classify_failure(status: u16, body: &str) -> FailureKind {
    if status == 429 || mentions_quota(body) {
        return FailureKind::Quota;
    }
    if status == 404 || mentions_missing_model(body) {
        return FailureKind::MissingModel;
    }
    FailureKind::Other
}

fn mentions_quota(text: &str) -> bool {
    text.to_ascii_lowercase().contains("quota")
}

/// Matches "model ... not ... found" in order, plus the API's own
/// "model_not_found" error code.
fn mentions_missing_model(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    if lower.contains("model_not_found") {
        return true;
    }
    let Some(after_model) = lower.find("model").map(|i| &lower[i..]) else {
        return false;
    };
    let Some(after_not) = after_model.find("not").map(|i| &after_model[i..]) else {
        return false;
    };
    after_not.contains("found")
}
