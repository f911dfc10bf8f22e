//! Configuration management for NavalQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Knowledge source (encyclopedia) configuration
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Answer composer configuration
    #[serde(default)]
    pub composer: ComposerConfig,

    /// Citation finder configuration
    #[serde(default)]
    pub citation: CitationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Inbound rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Conversation history limits
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeConfig {
    /// Knowledge provider: wikipedia, mock
    #[serde(default = "default_knowledge_provider")]
    pub provider: String,

    /// MediaWiki Action API endpoint
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Prefix used to synthesize article URLs from titles
    #[serde(default = "default_article_base")]
    pub article_base: String,

    /// Identifying User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_knowledge_timeout")]
    pub timeout_secs: u64,

    /// Minimum spacing between two calls to the same host, in milliseconds
    #[serde(default = "default_politeness_ms")]
    pub politeness_ms: u64,

    /// Maximum titles requested from full-text search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// A fuzzy match must score strictly above this to be fetched
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// A disambiguation link must score strictly above this to be offered
    #[serde(default = "default_disambiguation_threshold")]
    pub disambiguation_threshold: f64,

    /// Sentences kept in summaries of fuzzy-matched pages
    #[serde(default = "default_summary_sentences")]
    pub summary_sentences: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComposerConfig {
    /// Composer provider: openai, mock
    #[serde(default = "default_composer_provider")]
    pub provider: String,

    /// Chat completion endpoint
    #[serde(default = "default_composer_endpoint")]
    pub endpoint: String,

    /// API key for the completion endpoint
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_composer_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_composer_timeout")]
    pub timeout_secs: u64,

    /// Maximum generated tokens per answer
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,

    /// Topic the assistant is an expert on
    #[serde(default = "default_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CitationConfig {
    /// Candidate URL templates, probed in order; `{subject}` is substituted
    #[serde(default = "default_citation_candidates")]
    pub candidates: Vec<String>,

    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (whole gateway)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Sessions kept in memory; the least recently used one is evicted first
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Turns kept per session; older turns are dropped first
    #[serde(default = "default_max_turns")]
    pub max_turns_per_session: usize,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_knowledge_provider() -> String { "wikipedia".to_string() }
fn default_api_base() -> String { "https://en.wikipedia.org/w/api.php".to_string() }
fn default_article_base() -> String { "https://en.wikipedia.org/wiki/".to_string() }
fn default_user_agent() -> String { "WW2-AI-Agent/1.0 (contact: percievalwritings@gmail.com)".to_string() }
fn default_knowledge_timeout() -> u64 { 10 }
fn default_politeness_ms() -> u64 { 1000 }
fn default_search_limit() -> usize { 10 }
fn default_fuzzy_threshold() -> f64 { 0.7 }
fn default_disambiguation_threshold() -> f64 { 0.5 }
fn default_summary_sentences() -> usize { 3 }
fn default_composer_provider() -> String { "mock".to_string() }
fn default_composer_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_composer_model() -> String { "gpt-4o-mini".to_string() }
fn default_composer_timeout() -> u64 { 60 }
fn default_max_output_tokens() -> usize { 768 }
fn default_topic() -> String { "World War 2 naval history".to_string() }
fn default_citation_candidates() -> Vec<String> {
    vec![
        "https://en.wikipedia.org/wiki/{subject}".to_string(),
        "https://www.navweaps.com/Weapons/index.html".to_string(),
        "https://www.naval-history.net/WW2CampaignsOtherNavies.htm".to_string(),
    ]
}
fn default_probe_timeout() -> u64 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "navalqa".to_string() }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }
fn default_max_sessions() -> usize { 1000 }
fn default_max_turns() -> usize { 200 }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__KNOWLEDGE__POLITENESS_MS=500
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl KnowledgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn politeness(&self) -> Duration {
        Duration::from_millis(self.politeness_ms)
    }
}

impl CitationConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            provider: default_knowledge_provider(),
            api_base: default_api_base(),
            article_base: default_article_base(),
            user_agent: default_user_agent(),
            timeout_secs: default_knowledge_timeout(),
            politeness_ms: default_politeness_ms(),
            search_limit: default_search_limit(),
            fuzzy_threshold: default_fuzzy_threshold(),
            disambiguation_threshold: default_disambiguation_threshold(),
            summary_sentences: default_summary_sentences(),
        }
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            provider: default_composer_provider(),
            endpoint: default_composer_endpoint(),
            api_key: None,
            model: default_composer_model(),
            timeout_secs: default_composer_timeout(),
            max_output_tokens: default_max_output_tokens(),
            topic: default_topic(),
        }
    }
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            candidates: default_citation_candidates(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_turns_per_session: default_max_turns(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            knowledge: KnowledgeConfig::default(),
            composer: ComposerConfig::default(),
            citation: CitationConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}
