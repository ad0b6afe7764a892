use crate::provider::huggingface::{DirectEndpoint, EndpointMode, HuggingFaceProvider};
use crate::provider::openai::{OpenAiProvider, DEFAULT_MODELS};
use crate::provider::stub::StubProvider;
use crate::provider::{ChatMessage, Provider};
use crate::questionnaire::{Question, QuestionnaireGenerator};
use crate::{config, paths, report, settings};
use anyhow::Context;
use reqwest::Url;
use serde_json::Value;
use std::path::Path;

const DEFAULT_HF_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";

/// Resolve configuration once and construct the selected provider.
///
/// Precedence for every value: CLI flag > environment variable > persisted
/// local settings > config file > built-in default. Nothing is re-read
/// after this point.
pub fn build_provider(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    local: Option<&settings::LocalSettings>,
    provider_name: &str,
    model_flag: Option<&str>,
) -> anyhow::Result<Box<dyn Provider + Send + Sync>> {
    match provider_name {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .or_else(|| local.and_then(|s| s.openai_api_key.clone()))
                .or_else(|| cfg.and_then(|c| c.openai.api_key.clone()))
                .context(
                    "missing OpenAI API key (set OPENAI_API_KEY, `intake set-token openai ...`, or config.toml openai.api_key)",
                )?;

            let models = match model_flag {
                Some(m) => vec![m.to_string()],
                None => cfg
                    .and_then(|c| c.openai.models.clone())
                    .unwrap_or_else(|| DEFAULT_MODELS.iter().map(|s| s.to_string()).collect()),
            };

            let endpoint = std::env::var("OPENAI_ENDPOINT_URL")
                .ok()
                .or_else(|| cfg.and_then(|c| c.openai.endpoint_url.clone()))
                .filter(|u| !u.trim().is_empty())
                .map(|u| Url::parse(&u))
                .transpose()
                .context("invalid OpenAI endpoint URL")?;

            let p = OpenAiProvider::new(http.clone(), api_key, models, endpoint)?;
            Ok(Box::new(p))
        }
        "huggingface" => {
            let token = std::env::var("HF_API_TOKEN")
                .ok()
                .or_else(|| local.and_then(|s| s.hf_token.clone()))
                .or_else(|| cfg.and_then(|c| c.huggingface.token.clone()));

            let model = model_flag
                .map(str::to_string)
                .or_else(|| std::env::var("HF_CHAT_MODEL").ok())
                .or_else(|| cfg.and_then(|c| c.huggingface.model.clone()))
                .unwrap_or_else(|| DEFAULT_HF_MODEL.to_string());

            let endpoint_url = std::env::var("HF_ENDPOINT_URL")
                .ok()
                .or_else(|| cfg.and_then(|c| c.huggingface.endpoint_url.clone()))
                .filter(|u| !u.trim().is_empty());

            let endpoint_mode = std::env::var("HF_ENDPOINT_MODE")
                .ok()
                .or_else(|| cfg.and_then(|c| c.huggingface.endpoint_mode.clone()))
                .map(|m| EndpointMode::parse(&m))
                .transpose()?
                .unwrap_or_default();

            let proxy_base_url = std::env::var("INTAKE_PROXY_BASE")
                .ok()
                .or_else(|| cfg.and_then(|c| c.huggingface.proxy_base_url.clone()))
                .filter(|u| !u.trim().is_empty());

            let direct = local.and_then(|s| s.direct_endpoint()).map(|(url, tok)| {
                DirectEndpoint {
                    url: url.to_string(),
                    token: tok.to_string(),
                }
            });

            let p = HuggingFaceProvider::new(
                http.clone(),
                token,
                model,
                endpoint_url,
                endpoint_mode,
                proxy_base_url,
                direct,
            );
            Ok(Box::new(p))
        }
        "stub" => Ok(Box::new(StubProvider::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

pub async fn cmd_chat(
    provider: &(dyn Provider + Send + Sync),
    prompt: String,
) -> anyhow::Result<()> {
    let reply = provider.send_chat(vec![ChatMessage::user(prompt)]).await?;
    println!("{reply}");
    Ok(())
}

pub async fn cmd_generate(
    provider: Box<dyn Provider + Send + Sync>,
    context_path: Option<&Path>,
) -> anyhow::Result<()> {
    let context = match context_path {
        Some(path) => read_json(path)?,
        None => Value::Object(Default::default()),
    };

    let generator = QuestionnaireGenerator::new(provider);
    let questions = generator.generate(&context).await?;

    tracing::debug!(count = questions.len(), "questionnaire generated");
    println!("{}", serde_json::to_string_pretty(&questions)?);
    Ok(())
}

pub async fn cmd_report(
    provider: &(dyn Provider + Send + Sync),
    questions_path: &Path,
    answers_path: &Path,
) -> anyhow::Result<()> {
    let questions: Vec<Question> = serde_json::from_value(read_json(questions_path)?)
        .with_context(|| format!("invalid questionnaire file: {}", questions_path.display()))?;

    let answers = read_json(answers_path)?
        .as_object()
        .cloned()
        .with_context(|| format!("answers must be a JSON object: {}", answers_path.display()))?;

    let text = report::generate_report(provider, &questions, &answers).await?;
    let severity = report::severity_of(&text);

    tracing::info!(severity = severity.as_str(), "report generated");
    println!("{text}");
    Ok(())
}

pub async fn cmd_analyze(
    provider: &(dyn Provider + Send + Sync),
    case_path: &Path,
) -> anyhow::Result<()> {
    let case: report::PatientCase = serde_json::from_value(read_json(case_path)?)
        .with_context(|| format!("invalid case file: {}", case_path.display()))?;

    let text = report::analyze_case(provider, &case).await?;
    let severity = report::severity_of(&text);

    tracing::info!(severity = severity.as_str(), "case analysis generated");
    println!("{text}");
    Ok(())
}

pub fn cmd_set_token(provider: &str, token: String) -> anyhow::Result<()> {
    let path = paths::settings_path()?;
    let mut local = settings::load_settings(&path)?.unwrap_or_default();

    match provider {
        "openai" => local.openai_api_key = Some(token),
        "huggingface" => local.hf_token = Some(token),
        other => anyhow::bail!("unknown provider: {other}"),
    }

    settings::save_settings_atomic(&path, &local)?;
    println!("Saved token to: {}", path.display());
    Ok(())
}

pub fn cmd_direct(
    url: Option<String>,
    token: Option<String>,
    disable: bool,
) -> anyhow::Result<()> {
    let path = paths::settings_path()?;
    let mut local = settings::load_settings(&path)?.unwrap_or_default();

    if disable {
        local.direct_enabled = false;
    } else {
        if let Some(url) = url {
            local.direct_endpoint_url = Some(url);
        }
        if let Some(token) = token {
            local.direct_token = Some(token);
        }
        if local.direct_endpoint_url.is_none() || local.direct_token.is_none() {
            anyhow::bail!("client-direct mode needs both --url and --token before it can be enabled");
        }
        local.direct_enabled = true;
    }

    settings::save_settings_atomic(&path, &local)?;
    println!(
        "Client-direct mode {}: {}",
        if local.direct_enabled { "enabled" } else { "disabled" },
        path.display()
    );
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse JSON: {}", path.display()))
}
