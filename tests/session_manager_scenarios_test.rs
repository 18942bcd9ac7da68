//! Drives the literal end-to-end scenarios from the design's scenario catalog
//! (cold start / warm reuse / interruption) against a fake `RemoteSession`,
//! the same substitution `session_manager.rs`'s own `FakeRemote` makes for
//! its unit tests, just exercised from outside the crate so the cold-start →
//! interruption → second-submission sequence is visible as one flow instead
//! of three separate unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use voxcore::audio_broadcaster::AudioBroadcaster;
use voxcore::error::RemoteError;
use voxcore::event_bus::{Event, EventBus, TOPIC_HOTWORD_DETECTED, TOPIC_VOICE_ACTIVITY_STOPPED};
use voxcore::model::{HotwordEvent, VoiceActivityEvent, VoiceActivityKind};
use voxcore::session::{RemoteAICallbacks, RemoteSession, SessionManager};
use voxcore::speaker::SpeakerService;

struct FakeRemote {
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    clear_buffer_calls: AtomicUsize,
    has_active_response: AtomicBool,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            clear_buffer_calls: AtomicUsize::new(0),
            has_active_response: AtomicBool::new(false),
        }
    }
}

impl RemoteSession for FakeRemote {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
    fn connect(&self, _callbacks: Arc<dyn RemoteAICallbacks>) -> Result<(), RemoteError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn cancel_response(&self) -> Result<bool, RemoteError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_active_response.swap(false, Ordering::SeqCst))
    }
    fn send_complete_audio(&self, _audio: Vec<u8>) -> Result<(), RemoteError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn clear_audio_buffer(&self) -> Result<(), RemoteError> {
        self.clear_buffer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

fn hotword_event(name: &str, score: f32) -> Event {
    Event::Hotword(HotwordEvent {
        timestamp: Instant::now(),
        hotword_name: name.to_string(),
        score,
        utterance_queue_depth: 0,
    })
}

fn voice_stopped_event() -> Event {
    Event::VoiceActivity(VoiceActivityEvent {
        timestamp: Instant::now(),
        kind: VoiceActivityKind::Stopped,
        duration: Some(Duration::from_secs(2)),
    })
}

/// S1 (cold start, single turn) followed by S2 (warm turn reuses the
/// connection): a second hotword_detected/voice_stopped cycle must not
/// reconnect and must submit a second, independent utterance.
#[test]
#[cfg_attr(
    not(feature = "test-audio"),
    ignore = "requires an audio output device - run with --features test-audio"
)]
fn cold_start_then_warm_turn_reuses_connection() {
    let bus = EventBus::new(2);
    let (broadcaster, _hotword_rx, utterance_rx) = AudioBroadcaster::new();
    let remote = Arc::new(FakeRemote::new());
    let speaker_bus = EventBus::new(1);
    let speaker = match SpeakerService::start(None, 24_000, speaker_bus) {
        Ok(s) => Arc::new(s),
        Err(_) => return,
    };
    let manager = SessionManager::new(
        bus.clone(),
        broadcaster,
        utterance_rx,
        remote.clone(),
        speaker,
    );

    // S1: cold start.
    bus.publish(TOPIC_HOTWORD_DETECTED, hotword_event("alexa", 0.82));
    assert!(wait_until(
        || manager.is_in_conversation(),
        Duration::from_secs(1)
    ));
    assert_eq!(remote.connect_calls.load(Ordering::SeqCst), 1);

    bus.publish(TOPIC_VOICE_ACTIVITY_STOPPED, voice_stopped_event());
    assert!(wait_until(
        || remote.submit_calls.load(Ordering::SeqCst) == 1,
        Duration::from_secs(1)
    ));

    manager.on_response_done();
    assert!(wait_until(
        || !manager.is_in_conversation(),
        Duration::from_secs(1)
    ));
    assert_eq!(remote.clear_buffer_calls.load(Ordering::SeqCst), 1);

    // S2: warm turn, same stimulus, no reconnect.
    bus.publish(TOPIC_HOTWORD_DETECTED, hotword_event("alexa", 0.91));
    assert!(wait_until(
        || manager.is_in_conversation(),
        Duration::from_secs(1)
    ));
    assert_eq!(
        remote.connect_calls.load(Ordering::SeqCst),
        1,
        "warm turn must not reconnect"
    );

    bus.publish(TOPIC_VOICE_ACTIVITY_STOPPED, voice_stopped_event());
    assert!(wait_until(
        || remote.submit_calls.load(Ordering::SeqCst) == 2,
        Duration::from_secs(1)
    ));
}

/// S3: a hotword arriving mid-conversation is an interruption — it cancels
/// the active response and starts a fresh collector, and the subsequent
/// voice_stopped submits a second, independent utterance.
#[test]
#[cfg_attr(
    not(feature = "test-audio"),
    ignore = "requires an audio output device - run with --features test-audio"
)]
fn hotword_mid_conversation_is_treated_as_interruption() {
    let bus = EventBus::new(2);
    let (broadcaster, _hotword_rx, utterance_rx) = AudioBroadcaster::new();
    let remote = Arc::new(FakeRemote::new());
    remote.has_active_response.store(true, Ordering::SeqCst);
    let speaker_bus = EventBus::new(1);
    let speaker = match SpeakerService::start(None, 24_000, speaker_bus) {
        Ok(s) => Arc::new(s),
        Err(_) => return,
    };
    let manager = SessionManager::new(
        bus.clone(),
        broadcaster,
        utterance_rx,
        remote.clone(),
        speaker,
    );

    bus.publish(TOPIC_HOTWORD_DETECTED, hotword_event("alexa", 0.9));
    assert!(wait_until(
        || manager.is_in_conversation(),
        Duration::from_secs(1)
    ));

    // Interruption: a second hotword while still in conversation.
    bus.publish(TOPIC_HOTWORD_DETECTED, hotword_event("alexa", 0.9));
    assert!(wait_until(
        || remote.cancel_calls.load(Ordering::SeqCst) == 1,
        Duration::from_secs(1)
    ));
    assert!(manager.is_in_conversation());

    bus.publish(TOPIC_VOICE_ACTIVITY_STOPPED, voice_stopped_event());
    assert!(wait_until(
        || remote.submit_calls.load(Ordering::SeqCst) == 1,
        Duration::from_secs(1)
    ));
}
