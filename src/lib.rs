//! Core event-driven voice interaction engine: microphone capture, wake-word
//! detection, voice-activity tracking, a realtime AI session, and queued
//! speaker playback, wired together through an in-process event bus.
//!
//! The CLI surface, config-file loading, model downloads, and LED-ring
//! rendering are external collaborators and live outside this crate; `main.rs`
//! assembles the pipeline from the pieces exported here.

pub mod audio;
pub mod audio_broadcaster;
pub mod config;
pub mod detection;
pub mod detection_loop;
pub mod error;
pub mod event_bus;
pub mod hotword;
pub mod model;
pub mod models;
pub mod session;
pub mod speaker;
pub mod vad;

pub use error::{CoreError, Result};
