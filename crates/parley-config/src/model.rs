// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley session engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so that a misspelt key is
//! reported at startup instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Every section is optional and defaults to values suitable for a local
/// backend on `localhost:8000`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Streaming chat endpoint settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Subscription backend and access gating.
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Embedding bridge trust settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Local persisted state.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session identity and background polling.
    #[serde(default)]
    pub session: SessionConfig,

    /// Floating window geometry.
    #[serde(default)]
    pub widget: WidgetConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Streaming chat endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Full URL of the streaming completion endpoint.
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,

    /// Tenant sent as `X-Tenant-ID`. The host page may override it.
    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default = "default_true")]
    pub use_rag: bool,

    #[serde(default = "default_rag_top_k")]
    pub rag_top_k: u32,

    /// Connect timeout in seconds. No overall deadline is applied to a stream.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Log malformed stream lines at `warn` instead of `trace`.
    #[serde(default)]
    pub debug_protocol: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            tenant_id: None,
            use_rag: true,
            rag_top_k: default_rag_top_k(),
            connect_timeout_secs: None,
            debug_protocol: false,
        }
    }
}

fn default_chat_endpoint() -> String {
    "http://localhost:8000/api/chat/stream".to_string()
}

fn default_rag_top_k() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

/// Subscription backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Gate chat turns on an active subscription.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the subscription REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// How long a cached status stays fresh.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Per-request timeout for REST calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Customer to check when none is cached yet.
    #[serde(default)]
    pub customer_id: Option<String>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base_url: default_api_base_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            customer_id: None,
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Embedding bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Origin of the embedded document itself.
    #[serde(default)]
    pub own_origin: Option<String>,

    /// Host origins allowed to become trusted. Empty trusts the first sender.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Post to `*` until a host origin is trusted.
    #[serde(default = "default_true")]
    pub allow_wildcard_fallback: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            own_origin: None,
            allowed_origins: Vec::new(),
            allow_wildcard_fallback: true,
        }
    }
}

/// Where persisted session state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// A JSON file on disk.
    #[default]
    File,
    /// Process memory; nothing survives a restart.
    Memory,
}

/// Local storage configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// File used by the `file` backend. Defaults to `<data_dir>/parley/state.json`.
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageConfig {
    /// The file the `file` backend should use.
    pub fn resolved_path(&self) -> Option<std::path::PathBuf> {
        match &self.path {
            Some(path) => Some(path.into()),
            None => dirs::data_dir().map(|d| d.join("parley").join("state.json")),
        }
    }
}

/// Session identity and job polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// `persistent` shares the session id through storage; `tab` keeps it in memory.
    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive failed polls before giving up.
    #[serde(default = "default_poll_max_errors")]
    pub poll_max_errors: u32,

    /// Job status lives at `<jobs_url>/<job_id>`.
    #[serde(default = "default_jobs_url")]
    pub jobs_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_errors: default_poll_max_errors(),
            jobs_url: default_jobs_url(),
        }
    }
}

fn default_scope() -> String {
    "persistent".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_poll_max_errors() -> u32 {
    5
}

fn default_jobs_url() -> String {
    "http://localhost:8000/api/v1/jobs".to_string()
}

/// Window geometry limits, in pixels.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetConfig {
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_width")]
    pub default_width: u32,
    #[serde(default = "default_height")]
    pub default_height: u32,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            min_height: default_min_height(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            default_width: default_width(),
            default_height: default_height(),
        }
    }
}

fn default_min_width() -> u32 {
    300
}

fn default_min_height() -> u32 {
    400
}

fn default_max_width() -> u32 {
    800
}

fn default_max_height() -> u32 {
    900
}

fn default_width() -> u32 {
    380
}

fn default_height() -> u32 {
    600
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
