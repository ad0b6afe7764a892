use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-user settings persisted on disk under the state dir.
///
/// These sit between environment variables and the config file in the
/// resolution order: an explicit env var wins, then this file, then
/// config.toml. The core never writes this file mid-request; it is read
/// once at startup and updated only by the `set-token` command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalSettings {
    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default)]
    pub hf_token: Option<String>,

    /// Client-direct mode: call a dedicated inference endpoint without
    /// going through the proxy. Requires both URL and token below.
    #[serde(default)]
    pub direct_enabled: bool,

    #[serde(default)]
    pub direct_endpoint_url: Option<String>,

    #[serde(default)]
    pub direct_token: Option<String>,
}

impl LocalSettings {
    /// URL/token pair for client-direct mode, only when fully configured.
    pub fn direct_endpoint(&self) -> Option<(&str, &str)> {
        if !self.direct_enabled {
            return None;
        }
        match (self.direct_endpoint_url.as_deref(), self.direct_token.as_deref()) {
            (Some(url), Some(tok)) if !url.trim().is_empty() && !tok.trim().is_empty() => {
                Some((url, tok))
            }
            _ => None,
        }
    }
}

pub fn load_settings(path: impl AsRef<Path>) -> anyhow::Result<Option<LocalSettings>> {
    let path = path.as_ref();
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow!(e))
                .with_context(|| format!("failed to read settings: {}", path.display()))
        }
    };
    let settings: LocalSettings =
        serde_json::from_slice(&bytes).context("failed to parse settings JSON")?;
    Ok(Some(settings))
}

pub fn save_settings_atomic(path: impl AsRef<Path>, settings: &LocalSettings) -> anyhow::Result<()> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create settings directory: {}", dir.display()))?;

    let tmp = tmp_path(path);
    let bytes = serde_json::to_vec_pretty(settings).context("failed to serialize settings")?;
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("failed to write temp settings: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move settings into place: {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "settings.json".to_string());
    p.set_file_name(format!("{file}.tmp"));
    p
}
