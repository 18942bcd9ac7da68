//! Crate-wide error type.
//!
//! Each subsystem gets its own `thiserror` enum; `CoreError` composes them via
//! `#[from]` so callers crossing subsystem boundaries can use `?` freely. Only
//! `main.rs` collapses everything down to `anyhow::Result`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio devices found")]
    NoDevices,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("audio configuration error: {0}")]
    Config(String),
    #[error("resampling error: {0}")]
    Resampling(String),
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model load error: {0}")]
    ModelLoadError(String),
    #[error("detector input error: {0}")]
    InvalidInput(String),
    #[error("processing error: {0}")]
    ProcessingError(String),
}

/// The wakeword/embedding model stack (`models/`, `detection/pipeline.rs`) was
/// authored against this name; kept as an alias rather than renaming every
/// call site across that ML pipeline.
pub type EdgeError = DetectorError;

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("event bus worker pool is shut down")]
    ShutDown,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid remote endpoint url: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("remote API error: {0}")]
    Api(String),
    #[error("malformed message: {0}")]
    Protocol(String),
    #[error("not connected")]
    NotConnected,
    #[error("connect failed after {attempts} attempts: {reason}")]
    ConnectFailed { attempts: u32, reason: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("remote session error: {0}")]
    Remote(#[from] RemoteError),
    #[error("speaker error: {0}")]
    Speaker(#[from] SpeakerError),
}

#[derive(Error, Debug)]
pub enum SpeakerError {
    #[error("no output device available")]
    NoDevice,
    #[error("output stream error: {0}")]
    Stream(String),
    #[error("service is not started")]
    NotStarted,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid key format for {service}: {reason}")]
    InvalidKeyFormat { service: String, reason: String },
    #[error("environment error: {0}")]
    Env(#[from] std::env::VarError),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("event bus error: {0}")]
    EventBus(#[from] EventBusError),
    #[error("remote AI client error: {0}")]
    Remote(#[from] RemoteError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("speaker error: {0}")]
    Speaker(#[from] SpeakerError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
