//! End-to-end wiring test for the hotword → event bus path, using a fake
//! detector in place of the real TensorFlow Lite models (which require model
//! files this test suite doesn't ship). Mirrors the cross-module intent of
//! `integration_tests.rs` without needing a live API key or recorded audio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use voxcore::detection_loop::DetectionLoop;
use voxcore::error::DetectorError;
use voxcore::event_bus::{Event, EventBus, TOPIC_HOTWORD_DETECTED};
use voxcore::hotword::HotwordDetector;
use voxcore::model::frame_from_i16;

/// Always reports a fixed score for a single word, so the test only
/// exercises the detection loop's threshold/cooldown/publish wiring.
struct FixedScoreDetector {
    word: String,
    score: f32,
}

impl HotwordDetector for FixedScoreDetector {
    fn get_scores(&mut self, _frame: &[i16]) -> Result<HashMap<String, f32>, DetectorError> {
        let mut scores = HashMap::with_capacity(1);
        scores.insert(self.word.clone(), self.score);
        Ok(scores)
    }

    fn reset(&mut self) {}
}

#[test]
fn hotword_above_threshold_reaches_event_bus() {
    let (tx, rx) = crossbeam_channel::bounded(8);
    for _ in 0..10 {
        tx.try_send(frame_from_i16(&[0i16; 1280])).ok();
    }

    let bus = EventBus::new(1);
    let received = Arc::new(AtomicUsize::new(0));
    let received_clone = received.clone();
    bus.subscribe(TOPIC_HOTWORD_DETECTED, move |event| {
        if let Event::Hotword(e) = event {
            assert_eq!(e.hotword_name, "hey_mycroft");
            assert!(e.score >= 0.8);
            received_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    let detector = FixedScoreDetector {
        word: "hey_mycroft".to_string(),
        score: 0.92,
    };

    let mut detection_loop = DetectionLoop::start(
        rx,
        Box::new(detector),
        0.5,
        Duration::from_secs(30),
        bus,
        || 0,
    );

    std::thread::sleep(Duration::from_millis(350));
    detection_loop.stop();

    assert_eq!(received.load(Ordering::SeqCst), 1);
}
