mod types;

pub use types::*;

use crate::net::base_url_from_manifest;
use crate::stream::VariantSource;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./hdsflow.toml",
        "~/.config/hdsflow/config.toml",
        "/etc/hdsflow/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("Fetch timeout cannot be 0");
    }
    if config.fetch.max_response_bytes == 0 {
        anyhow::bail!("Maximum response size cannot be 0");
    }
    if config.stream.lookahead_secs == 0 {
        anyhow::bail!("Stream lookahead cannot be 0");
    }

    let source = &config.source;
    if let Some(url) = non_empty(&source.manifest_url) {
        if base_url_from_manifest(url).is_none() {
            anyhow::bail!("Manifest URL has no path to resolve against: {}", url);
        }
    }
    if let Some(bootstrap) = non_empty(&source.bootstrap) {
        decode_base64(bootstrap).context("Invalid base64 in source.bootstrap")?;
    }
    if let Some(metadata) = non_empty(&source.metadata) {
        decode_base64(metadata).context("Invalid base64 in source.metadata")?;
    }
    let live = source.duration_secs.unwrap_or(0) == 0;
    if live && non_empty(&source.bootstrap).is_some() && non_empty(&source.bootstrap_url).is_none() {
        tracing::warn!("Live source has no bootstrap_url, its live edge will not advance");
    }

    Ok(())
}

impl SourceConfig {
    /// Build the variant description the stream pipeline opens.
    pub fn variant(&self) -> Result<VariantSource> {
        let manifest_url = non_empty(&self.manifest_url)
            .context("source.manifest_url is required to resolve fragment URLs")?;
        let base_url = base_url_from_manifest(manifest_url)
            .with_context(|| format!("Cannot derive a base URL from {}", manifest_url))?;

        let bootstrap = non_empty(&self.bootstrap)
            .map(decode_base64)
            .transpose()
            .context("Invalid base64 in source.bootstrap")?;
        let bootstrap_url = non_empty(&self.bootstrap_url).map(str::to_string);
        if bootstrap.is_none() && bootstrap_url.is_none() {
            anyhow::bail!("source needs either an inline bootstrap or a bootstrap_url");
        }

        let metadata = non_empty(&self.metadata)
            .map(decode_base64)
            .transpose()
            .context("Invalid base64 in source.metadata")?;

        Ok(VariantSource {
            base_url,
            media_url: non_empty(&self.media_url).map(str::to_string),
            bootstrap,
            bootstrap_url,
            quality: non_empty(&self.quality).map(str::to_string),
            bitrate_kbps: self.bitrate_kbps,
            duration_secs: self.duration_secs,
            metadata,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Manifest base64 blobs are often wrapped across lines.
fn decode_base64(value: &str) -> Result<Bytes> {
    let compact: String = value.split_whitespace().collect();
    Ok(Bytes::from(STANDARD.decode(compact)?))
}
