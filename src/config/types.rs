use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Largest accepted response body (default: 50 MiB)
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_response_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("hdsflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Seconds of media kept scheduled ahead of the reader (default: 15)
    #[serde(default = "default_lookahead")]
    pub lookahead_secs: u64,

    /// Shortest live refresh period in milliseconds (default: 500)
    #[serde(default = "default_min_refresh_interval")]
    pub min_refresh_interval_ms: u64,

    /// Back-off between empty reads while buffering (default: 50)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_lookahead() -> u64 {
    15
}

fn default_min_refresh_interval() -> u64 {
    500
}

fn default_poll_interval() -> u64 {
    50
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: default_lookahead(),
            min_refresh_interval_ms: default_min_refresh_interval(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// The stream variant to play, as extracted from its manifest.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Manifest URL; fragments and relative bootstraps resolve against it
    #[serde(default)]
    pub manifest_url: Option<String>,

    /// Media `url` attribute
    #[serde(default)]
    pub media_url: Option<String>,

    /// Inline bootstrap, base64
    #[serde(default)]
    pub bootstrap: Option<String>,

    /// Bootstrap location (absolute or relative to the manifest)
    #[serde(default)]
    pub bootstrap_url: Option<String>,

    /// Quality modifier selecting bootstrap sub-tables
    #[serde(default)]
    pub quality: Option<String>,

    #[serde(default)]
    pub bitrate_kbps: Option<u32>,

    /// Presentation length; absent or 0 for live streams
    #[serde(default)]
    pub duration_secs: Option<u64>,

    /// AMF `onMetaData` payload, base64
    #[serde(default)]
    pub metadata: Option<String>,
}
