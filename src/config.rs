use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Provider identifier ("openai" or "huggingface")
    pub provider: Option<String>,

    /// Default model (optional)
    pub model: Option<String>,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub huggingface: HuggingFaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,

    /// Ordered model candidates; earlier entries are preferred.
    pub models: Option<Vec<String>>,

    /// Alternative chat-completions URL (gateways, self-hosted
    /// compatible servers).
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HuggingFaceConfig {
    pub token: Option<String>,

    pub model: Option<String>,

    /// Dedicated inference endpoint; when unset the public
    /// model-derived inference URL is used.
    pub endpoint_url: Option<String>,

    /// "default", "openai-chat" or "openai-completions"
    pub endpoint_mode: Option<String>,

    /// Server-side proxy base URL (tried before calling the
    /// provider directly).
    pub proxy_base_url: Option<String>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }
}
