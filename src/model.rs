//! Shared data model: the audio `Frame` unit, conversation `Session` state, and
//! the event payloads carried on the `EventBus`.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// An immutable buffer of exactly `frame_samples` signed 16-bit little-endian PCM
/// mono samples at the capture sample rate. `Arc` makes it cheap to hand the same
/// frame to several consumer queues without copying the bytes.
pub type Frame = Arc<[u8]>;

/// Wrap raw interleaved i16 samples (native endianness) into a `Frame`'s on-wire
/// little-endian byte layout.
pub fn frame_from_i16(samples: &[i16]) -> Frame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    Arc::from(bytes.into_boxed_slice())
}

/// Inverse of `frame_from_i16`: decode a frame's little-endian bytes back into
/// i16 samples. Odd trailing bytes (should never happen for a well-formed
/// Frame) are silently dropped.
pub fn frame_to_i16(frame: &[u8]) -> Vec<i16> {
    frame
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// The state of a single logical conversation turn. Created lazily on the first
/// hotword after a cold start, reused across turns as long as the remote
/// connection stays open.
#[derive(Debug, Default)]
pub struct Session {
    pub in_conversation: bool,
    pub streaming: bool,
    pub collected: Vec<u8>,
    pub response_active: bool,
    pub response_id: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_for_new_turn(&mut self) {
        self.collected.clear();
        self.streaming = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotwordEvent {
    pub timestamp: Instant,
    pub hotword_name: String,
    pub score: f32,
    pub utterance_queue_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceActivityKind {
    Started,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceActivityEvent {
    pub timestamp: Instant,
    pub kind: VoiceActivityKind,
    /// Populated only when `kind == Stopped`.
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeakingFinishedEvent {
    pub timestamp: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_from_i16_round_trips_bytes() {
        let samples = [1i16, -1, 32767, -32768];
        let frame = frame_from_i16(&samples);
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[0..2], &1i16.to_le_bytes());
        assert_eq!(&frame[6..8], &(-32768i16).to_le_bytes());
    }

    #[test]
    fn frame_to_i16_inverts_frame_from_i16() {
        let samples = [100i16, -100, 0, 12345];
        let frame = frame_from_i16(&samples);
        assert_eq!(frame_to_i16(&frame), samples);
    }

    #[test]
    fn session_reset_clears_collected_and_sets_streaming() {
        let mut session = Session::new();
        session.collected.extend_from_slice(&[1, 2, 3]);
        session.streaming = false;
        session.reset_for_new_turn();
        assert!(session.collected.is_empty());
        assert!(session.streaming);
    }
}
