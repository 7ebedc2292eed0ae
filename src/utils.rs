use std::{env, path::Path, path::PathBuf};

use anyhow::{bail, Context};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_BODY_LIMIT_MB: usize = 10;
const DEFAULT_MODEL_PATH: &str = "model/best_model.pt";

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub github_token: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let body_limit_bytes = {
            let mb = match lookup("BODY_LIMIT_MB") {
                Some(mb) => mb
                    .parse::<usize>()
                    .context("BODY_LIMIT_MB must be a valid integer")?,
                None => DEFAULT_BODY_LIMIT_MB,
            };
            mb * 1024 * 1024
        };

        let port = match lookup("PORT") {
            Some(port) => port
                .parse::<u16>()
                .context("PORT must be a valid number between 0 and 65535")?,
            None => DEFAULT_PORT,
        };

        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        Ok(Config {
            port,
            body_limit_bytes,
            model_path,
            model_url: lookup("MODEL_URL").filter(|url| !url.is_empty()),
            github_token: lookup("GITHUB_TOKEN").filter(|token| !token.is_empty()),
        })
    }
}

async fn download_file(url: &str, path: &Path, token: Option<&str>) -> anyhow::Result<()> {
    tracing::info!("Downloading {} from {}", path.display(), url);

    let mut header_map = HeaderMap::new();
    if let Some(token) = token {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Invalid GITHUB_TOKEN format")?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .headers(header_map)
        .send()
        .await
        .context("Failed to send request")?;

    if !response.status().is_success() {
        bail!("Failed to download {}: {}", url, response.status());
    }

    let bytes = response.bytes().await.context("Failed to read bytes")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Makes sure the checkpoint is on disk, fetching it from `MODEL_URL` when
/// it is missing.
pub async fn ensure_checkpoint(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Checking model...");
    if config.model_path.exists() {
        return Ok(());
    }

    match &config.model_url {
        Some(url) => {
            download_file(url, &config.model_path, config.github_token.as_deref()).await
        }
        None => bail!(
            "checkpoint {} not found and MODEL_URL is not set",
            config.model_path.display()
        ),
    }
}
