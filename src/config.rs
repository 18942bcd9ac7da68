//! Engine configuration.
//!
//! `Config` is the plain, programmatically-constructed settings struct the engine
//! is built from (loading it from a file or CLI flags is an external collaborator's
//! job, not this crate's). `ApiConfig` layers the one secret the engine needs — the
//! remote AI service's bearer token — on top, read from the environment the way
//! the rest of this crate's ambient services are configured.

use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretBox};
use std::env;

/// Settings the engine is constructed from. Has no `Default`: every field matters
/// and callers should supply them explicitly rather than silently inherit stale
/// defaults for a microphone or remote model they never looked at.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_device_name: Option<String>,
    pub output_device_name: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_samples: usize,
    pub vad_aggressiveness: u8,
    pub silence_threshold_frames: u32,
    pub hotword_threshold: f32,
    pub hotword_cooldown_seconds: f32,
    pub remote_model_name: String,
}

impl Config {
    /// Defaults matching the values named throughout the design (16 kHz capture,
    /// 80 ms frames, moderate VAD aggressiveness, 2 s hotword cooldown).
    pub fn with_defaults(remote_model_name: impl Into<String>) -> Self {
        Self {
            input_device_name: None,
            output_device_name: None,
            sample_rate: 16_000,
            channels: 1,
            frame_samples: 1_280,
            vad_aggressiveness: 2,
            silence_threshold_frames: 15,
            hotword_threshold: 0.5,
            hotword_cooldown_seconds: 2.0,
            remote_model_name: remote_model_name.into(),
        }
    }
}

/// The one secret this crate needs: a bearer token for the remote conversational
/// AI endpoint. Wrapped in `SecretBox` so it never ends up in a `Debug` dump of a
/// larger struct by accident.
#[derive(Debug)]
pub struct ApiConfig {
    remote_api_key: SecretBox<String>,
}

impl ApiConfig {
    /// Load from the environment (`.env` first, if present, then process env).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let remote_api_key = Self::load_api_key("REMOTE_AI_API_KEY")?;
        Ok(Self { remote_api_key })
    }

    fn load_api_key(env_var: &str) -> Result<SecretBox<String>, ConfigError> {
        let key =
            env::var(env_var).map_err(|_| ConfigError::MissingEnvVar(env_var.to_string()))?;
        if key.trim().is_empty() {
            return Err(ConfigError::InvalidKeyFormat {
                service: "remote AI".to_string(),
                reason: "API key cannot be empty".to_string(),
            });
        }
        Ok(SecretBox::new(Box::new(key)))
    }

    /// The bearer token, exposed only at the call site that needs it (the remote
    /// client's connect handshake).
    pub fn remote_api_key(&self) -> &str {
        self.remote_api_key.expose_secret()
    }
}

/// Load with friendlier log output on failure, mirroring how the rest of the
/// engine prefers actionable log lines over bare error propagation at startup.
pub fn load_api_config() -> Result<ApiConfig, ConfigError> {
    match ApiConfig::load() {
        Ok(cfg) => {
            log::info!("loaded remote AI API configuration");
            Ok(cfg)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("missing required environment variable: {}", var);
            log::error!("set it in the environment or in a .env file: {}=...", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("configuration error: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_frame_contract() {
        let cfg = Config::with_defaults("test-model");
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.frame_samples, 1_280);
        assert_eq!(cfg.channels, 1);
        assert_eq!(cfg.silence_threshold_frames, 15);
    }

    #[test]
    fn rejects_empty_api_key() {
        std::env::set_var("VOXCORE_TEST_EMPTY_KEY", "");
        let err = ApiConfig::load_api_key("VOXCORE_TEST_EMPTY_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKeyFormat { .. }));
        std::env::remove_var("VOXCORE_TEST_EMPTY_KEY");
    }

    #[test]
    fn missing_key_reports_its_name() {
        std::env::remove_var("VOXCORE_TEST_MISSING_KEY");
        let err = ApiConfig::load_api_key("VOXCORE_TEST_MISSING_KEY").unwrap_err();
        match err {
            ConfigError::MissingEnvVar(name) => assert_eq!(name, "VOXCORE_TEST_MISSING_KEY"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
