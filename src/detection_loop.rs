//! Drives the hotword detector off the broadcaster's skip-ahead queue, applying
//! per-word cooldown debouncing before publishing `hotword_detected`.
//!
//! Grounded 1:1 on `original_source/core/detection_service.py`
//! (`VoiceDetectionService.start`): read-latest-frame-with-timeout, call the
//! detector, per-word threshold + `last_detection_time` cooldown map, publish,
//! sleep 100 ms, honor a stop flag.

use crate::audio_broadcaster::recv_latest;
use crate::event_bus::{Event, EventBus, TOPIC_HOTWORD_DETECTED};
use crate::hotword::HotwordDetector;
use crate::model::{frame_to_i16, Frame, HotwordEvent};
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const QUEUE_READ_TIMEOUT: Duration = Duration::from_millis(200);
const LOOP_DELAY: Duration = Duration::from_millis(100);

pub struct DetectionLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionLoop {
    pub fn start(
        hotword_rx: Receiver<Frame>,
        mut detector: Box<dyn HotwordDetector>,
        threshold: f32,
        cooldown: Duration,
        event_bus: Arc<EventBus>,
        utterance_queue_depth: impl Fn() -> usize + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();

        let handle = std::thread::Builder::new()
            .name("detection-loop".to_string())
            .spawn(move || {
                let mut last_fire: HashMap<String, Instant> = HashMap::new();
                while !stop_clone.load(Ordering::Relaxed) {
                    let Some(frame) = recv_latest(&hotword_rx, QUEUE_READ_TIMEOUT) else {
                        continue;
                    };
                    let samples = frame_to_i16(&frame);
                    match detector.get_scores(&samples) {
                        Ok(scores) => {
                            for (word, score) in scores {
                                if score < threshold {
                                    continue;
                                }
                                let now = Instant::now();
                                if let Some(last) = last_fire.get(&word) {
                                    if now.duration_since(*last) < cooldown {
                                        log::debug!(
                                            "hotword '{}' still cooling down, skipping",
                                            word
                                        );
                                        continue;
                                    }
                                }
                                last_fire.insert(word.clone(), now);
                                event_bus.publish(
                                    TOPIC_HOTWORD_DETECTED,
                                    Event::Hotword(HotwordEvent {
                                        timestamp: now,
                                        hotword_name: word,
                                        score,
                                        utterance_queue_depth: utterance_queue_depth(),
                                    }),
                                );
                            }
                        }
                        Err(e) => {
                            log::error!("hotword detector error: {}; continuing", e);
                        }
                    }
                    std::thread::sleep(LOOP_DELAY);
                }
                log::info!("detection loop stopped");
            })
            .expect("failed to spawn detection loop thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotword::ScriptedDetector;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn score_map(word: &str, score: f32) -> HashMap<String, f32> {
        let mut m = HashMap::new();
        m.insert(word.to_string(), score);
        m
    }

    #[test]
    fn cooldown_suppresses_repeated_firing() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        for _ in 0..20 {
            tx.try_send(crate::model::frame_from_i16(&[0i16; 16])).ok();
        }
        let detector = ScriptedDetector::new(vec![score_map("alexa", 0.9)]);
        let bus = EventBus::new(1);
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fire_count_clone = fire_count.clone();
        bus.subscribe(TOPIC_HOTWORD_DETECTED, move |_| {
            fire_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut loop_handle = DetectionLoop::start(
            rx,
            Box::new(detector),
            0.5,
            Duration::from_secs(60),
            bus,
            || 0,
        );
        std::thread::sleep(Duration::from_millis(350));
        loop_handle.stop();
        // Multiple frames were available but cooldown (60s) must keep this at one fire.
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn below_threshold_never_fires() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        tx.try_send(crate::model::frame_from_i16(&[0i16; 16])).ok();
        let detector = ScriptedDetector::new(vec![score_map("alexa", 0.2)]);
        let bus = EventBus::new(1);
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fire_count_clone = fire_count.clone();
        bus.subscribe(TOPIC_HOTWORD_DETECTED, move |_| {
            fire_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        let mut loop_handle = DetectionLoop::start(
            rx,
            Box::new(detector),
            0.5,
            Duration::from_secs(2),
            bus,
            || 0,
        );
        std::thread::sleep(Duration::from_millis(250));
        loop_handle.stop();
        assert_eq!(fire_count.load(Ordering::SeqCst), 0);
    }
}
