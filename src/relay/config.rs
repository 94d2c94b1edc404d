use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::completion::prompts;
use crate::config::{Config, RelayConfig};
use crate::upstream::Modality;

/// Settings shared by every relay session of one server
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Upper bound on waiting for queued audio sends before commit
    pub flush_timeout: Duration,

    /// Upper bound on waiting for `response.done` after `response.create`
    pub response_timeout: Duration,

    /// Modalities declared in `session.update`
    pub modalities: Vec<Modality>,

    /// Instructions sent with `response.create`
    pub instructions: String,

    /// Client PCM rate (48kHz)
    pub source_rate: u32,

    /// Upstream PCM rate (24kHz)
    pub target_rate: u32,

    /// Capacity of the outbound client event channel
    pub client_channel_capacity: usize,

    /// Forwarder backlog (frames) that triggers a slow-upstream warning
    pub audio_backlog_warn: usize,
}

impl RelaySettings {
    /// Resolve the prompt key and durations from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let relay: &RelayConfig = &config.relay;
        let instructions = prompts::prompt(&relay.transcription_prompt).ok_or_else(|| {
            anyhow!(
                "relay.transcription_prompt names unknown prompt '{}'",
                relay.transcription_prompt
            )
        })?;

        Ok(Self {
            flush_timeout: Duration::from_millis(relay.flush_timeout_ms),
            response_timeout: Duration::from_millis(relay.response_timeout_ms),
            modalities: config.upstream.modalities.clone(),
            instructions: instructions.to_string(),
            source_rate: relay.source_sample_rate,
            target_rate: relay.target_sample_rate,
            client_channel_capacity: relay.client_channel_capacity,
            audio_backlog_warn: relay.audio_backlog_warn_frames,
        })
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            flush_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(60),
            modalities: vec![Modality::Text],
            instructions: prompts::PARAPHRASE_REALTIME.to_string(),
            source_rate: crate::audio::SOURCE_SAMPLE_RATE,
            target_rate: crate::audio::TARGET_SAMPLE_RATE,
            client_channel_capacity: 256,
            audio_backlog_warn: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let settings = RelaySettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings.flush_timeout, Duration::from_secs(5));
        assert_eq!(settings.modalities, vec![Modality::Text]);
        assert_eq!(settings.instructions, prompts::PARAPHRASE_REALTIME);
        assert_eq!(settings.audio_backlog_warn, 500);
    }

    #[test]
    fn test_backlog_warning_from_config() {
        let mut config = Config::default();
        config.relay.audio_backlog_warn_frames = 40;
        let settings = RelaySettings::from_config(&config).unwrap();
        assert_eq!(settings.audio_backlog_warn, 40);
    }

    #[test]
    fn test_unknown_prompt_rejected() {
        let mut config = Config::default();
        config.relay.transcription_prompt = "no-such-prompt".to_string();
        assert!(RelaySettings::from_config(&config).is_err());
    }
}
