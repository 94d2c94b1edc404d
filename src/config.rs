use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::{SOURCE_SAMPLE_RATE, TARGET_SAMPLE_RATE};
use crate::upstream::Modality;

/// Prefix for environment overrides, e.g. `VOICE_RELAY__SERVICE__HTTP__PORT=9000`.
pub const ENV_PREFIX: &str = "VOICE_RELAY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Directory served at `/` (the browser recorder page)
    pub static_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Realtime speech backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// WebSocket endpoint; the model is appended as `?model=`
    pub url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub connect_timeout_ms: u64,
    pub modalities: Vec<Modality>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Sample rate of PCM sent by the browser (wire contract: 48kHz)
    pub source_sample_rate: u32,
    /// Sample rate expected by the upstream model (wire contract: 24kHz)
    pub target_sample_rate: u32,
    /// Upper bound on waiting for in-flight audio sends before commit
    pub flush_timeout_ms: u64,
    /// Upper bound on waiting for `response.done` after commit
    pub response_timeout_ms: u64,
    /// Capacity of the per-connection outbound event channel
    pub client_channel_capacity: usize,
    /// Queued audio frames above which a slow upstream is reported
    pub audio_backlog_warn_frames: usize,
    /// Key into the prompt table used for `response.create`
    pub transcription_prompt: String,
}

/// Settings for the request/response text endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub readability_model: String,
    pub correctness_model: String,
    pub ask_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "voice-relay".to_string(),
                http: HttpConfig {
                    bind: "0.0.0.0".to_string(),
                    port: 3005,
                },
                static_dir: "static".to_string(),
            },
            upstream: UpstreamConfig {
                url: "wss://api.openai.com/v1/realtime".to_string(),
                model: "gpt-4o-realtime-preview".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                connect_timeout_ms: 10_000,
                modalities: vec![Modality::Text],
            },
            relay: RelayConfig {
                source_sample_rate: SOURCE_SAMPLE_RATE,
                target_sample_rate: TARGET_SAMPLE_RATE,
                flush_timeout_ms: 5_000,
                response_timeout_ms: 60_000,
                client_channel_capacity: 256,
                audio_backlog_warn_frames: 500,
                transcription_prompt: "paraphrase-gpt-realtime".to_string(),
            },
            completion: CompletionConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                readability_model: "gpt-4o".to_string(),
                correctness_model: "gpt-4o".to_string(),
                ask_model: "o1-mini".to_string(),
            },
        }
    }
}

impl Config {
    /// Load defaults, then the optional TOML file at `path`, then environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_env(path, ENV_PREFIX)
    }

    pub fn load_with_env(path: &str, env_prefix: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Config::try_from(&Config::default())
                    .context("Failed to seed default configuration")?,
            )
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.http.port == 0 {
            bail!("service.http.port cannot be 0");
        }
        if self.upstream.modalities.is_empty() {
            bail!("upstream.modalities must name at least one modality");
        }
        if self.upstream.connect_timeout_ms == 0 {
            bail!("upstream.connect_timeout_ms must be greater than 0");
        }
        if self.relay.flush_timeout_ms == 0 || self.relay.response_timeout_ms == 0 {
            bail!("relay timeouts must be greater than 0");
        }
        if self.relay.client_channel_capacity == 0 {
            bail!("relay.client_channel_capacity must be greater than 0");
        }
        if self.relay.audio_backlog_warn_frames == 0 {
            bail!("relay.audio_backlog_warn_frames must be greater than 0");
        }
        // The browser recorder and the upstream model both hard-code these.
        if self.relay.source_sample_rate != SOURCE_SAMPLE_RATE
            || self.relay.target_sample_rate != TARGET_SAMPLE_RATE
        {
            bail!(
                "relay sample rates are part of the wire contract ({} -> {}), got {} -> {}",
                SOURCE_SAMPLE_RATE,
                TARGET_SAMPLE_RATE,
                self.relay.source_sample_rate,
                self.relay.target_sample_rate
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}
