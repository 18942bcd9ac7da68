//! In-process topic-keyed pub/sub, decoupling producers (VAD tracker, detection
//! loop, speaker service) from consumers (session manager, and any external
//! logging/LED/telemetry subscriber).
//!
//! Grounded on `original_source/core/event_bus.py`'s `EventBus`: a mutex-guarded
//! subscriber map, `publish()` taking a snapshot under the lock before
//! dispatching (so unsubscription mid-dispatch is safe), and per-handler
//! exception isolation. The one deliberate departure, per the design's REDESIGN
//! FLAGS, is dispatch: the original spawns a fresh `threading.Thread` per
//! delivery; here a small fixed worker pool drains a shared job queue instead,
//! keeping the same contract (publisher never blocks, one slow/panicking
//! handler can't affect another) without the cost of a thread per event.

use crate::model::{HotwordEvent, SpeakingFinishedEvent, VoiceActivityEvent};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub const DEFAULT_WORKER_COUNT: usize = 4;

#[derive(Debug, Clone)]
pub enum Event {
    Hotword(HotwordEvent),
    VoiceActivity(VoiceActivityEvent),
    SpeakingFinished(SpeakingFinishedEvent),
}

pub const TOPIC_HOTWORD_DETECTED: &str = "hotword_detected";
pub const TOPIC_VOICE_ACTIVITY_STARTED: &str = "voice_activity_started";
pub const TOPIC_VOICE_ACTIVITY_STOPPED: &str = "voice_activity_stopped";
pub const TOPIC_SPEAKING_FINISHED: &str = "speaking_finished";

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

struct Job {
    handler: Handler,
    event: Event,
}

pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
    job_tx: Sender<Job>,
    _workers: Vec<JoinHandle<()>>,
}

impl EventBus {
    pub fn new(worker_count: usize) -> Arc<Self> {
        let (job_tx, job_rx): (Sender<Job>, Receiver<Job>) = crossbeam_channel::unbounded();
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for i in 0..worker_count.max(1) {
            let rx = job_rx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("event-bus-worker-{i}"))
                    .spawn(move || Self::worker_loop(rx))
                    .expect("failed to spawn event bus worker"),
            );
        }
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            job_tx,
            _workers: workers,
        })
    }

    fn worker_loop(rx: Receiver<Job>) {
        for job in rx.iter() {
            let handler = job.handler;
            let event = job.event;
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (handler)(&event)));
            if let Err(payload) = result {
                log::error!("event bus handler panicked: {}", panic_message(&payload));
            }
        }
    }

    pub fn subscribe(
        &self,
        topic: &str,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                id,
                handler: Arc::new(handler),
            });
        id
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        if let Some(subs) = self.subscribers.lock().unwrap().get_mut(topic) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Dispatch `event` to a snapshot of `topic`'s subscribers, taken under the
    /// lock so concurrent (un)subscription never observes a torn list and never
    /// affects this particular publish. Never blocks on handler execution.
    pub fn publish(&self, topic: &str, event: Event) {
        let handlers: Vec<Handler> = {
            let subs = self.subscribers.lock().unwrap();
            subs.get(topic)
                .map(|v| v.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default()
        };
        if handlers.is_empty() {
            log::debug!("publish to topic '{}' with no subscribers", topic);
            return;
        }
        for handler in handlers {
            let _ = self.job_tx.send(Job {
                handler,
                event: event.clone(),
            });
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

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

    #[test]
    fn publish_dispatches_to_all_subscribers() {
        let bus = EventBus::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            bus.subscribe("topic", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(
            "topic",
            Event::SpeakingFinished(SpeakingFinishedEvent {
                timestamp: std::time::Instant::now(),
            }),
        );
        assert!(wait_until(
            || counter.load(Ordering::SeqCst) == 3,
            Duration::from_secs(1)
        ));
    }

    #[test]
    fn panicking_handler_does_not_block_other_handlers() {
        let bus = EventBus::new(2);
        let delivered = Arc::new(AtomicUsize::new(0));
        bus.subscribe("topic", |_| panic!("boom"));
        let delivered_clone = delivered.clone();
        bus.subscribe("topic", move |_| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(
            "topic",
            Event::SpeakingFinished(SpeakingFinishedEvent {
                timestamp: std::time::Instant::now(),
            }),
        );
        assert!(wait_until(
            || delivered.load(Ordering::SeqCst) == 1,
            Duration::from_secs(1)
        ));
    }

    #[test]
    fn unsubscribe_stops_future_delivery() {
        let bus = EventBus::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let id = bus.subscribe("topic", move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.unsubscribe("topic", id);
        bus.publish(
            "topic",
            Event::SpeakingFinished(SpeakingFinishedEvent {
                timestamp: std::time::Instant::now(),
            }),
        );
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
