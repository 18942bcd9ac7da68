//! Coordinates the three async flows the design calls "the hardest subsystem":
//! outgoing utterance collection, incoming response playback, and connection
//! lifecycle — driven entirely off `hotword_detected` / `voice_activity_stopped`
//! bus events and the remote client's callbacks.
//!
//! Grounded 1:1 on `original_source/consumers/realtime_consumer.py`
//! (`RealtimeConsumer`): cold-start vs. interruption branching in
//! `on_hotword_detected`, the collector thread in `_stream_audio_loop`,
//! complete-utterance submission in `_commit_and_respond`, and the
//! non-critical-error classification in `_on_error`. The Python version
//! re-enters `streaming_audio = True` right after clearing it during
//! interruption, which races its own collector thread exiting — this port
//! closes that race with an explicit generation counter (see
//! `spawn_collector`) rather than porting the race itself.

use crate::audio_broadcaster::AudioBroadcaster;
use crate::event_bus::{Event, EventBus, TOPIC_HOTWORD_DETECTED, TOPIC_VOICE_ACTIVITY_STOPPED};
use crate::model::{Frame, Session};
use crate::session::remote_client::{RemoteAICallbacks, RemoteSession};
use crate::speaker::SpeakerService;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const COLLECTOR_READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct SessionManager {
    session: Mutex<Session>,
    remote: Arc<dyn RemoteSession>,
    broadcaster: Arc<AudioBroadcaster>,
    utterance_rx: Receiver<Frame>,
    speaker: Arc<SpeakerService>,
    event_bus: Arc<EventBus>,
    generation: Arc<AtomicU64>,
    responding_announced: AtomicBool,
}

impl SessionManager {
    pub fn new(
        event_bus: Arc<EventBus>,
        broadcaster: Arc<AudioBroadcaster>,
        utterance_rx: Receiver<Frame>,
        remote: Arc<dyn RemoteSession>,
        speaker: Arc<SpeakerService>,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            session: Mutex::new(Session::new()),
            remote,
            broadcaster,
            utterance_rx,
            speaker,
            event_bus: event_bus.clone(),
            generation: Arc::new(AtomicU64::new(0)),
            responding_announced: AtomicBool::new(false),
        });

        let hotword_handler = this.clone();
        event_bus.subscribe(TOPIC_HOTWORD_DETECTED, move |event| {
            if let Event::Hotword(e) = event {
                hotword_handler.on_hotword_detected(e.hotword_name.clone());
            }
        });

        let voice_stopped_handler = this.clone();
        event_bus.subscribe(TOPIC_VOICE_ACTIVITY_STOPPED, move |_event| {
            voice_stopped_handler.on_voice_stopped();
        });

        this
    }

    pub fn is_in_conversation(&self) -> bool {
        self.session.lock().unwrap().in_conversation
    }

    /// Graceful teardown: retires any running collector, drops queued audio in
    /// both directions, and disconnects the remote session. Ported from
    /// `RealtimeConsumer.cleanup()`; unlike the Python version this has nothing
    /// async to await — it just needs to stop threads from touching `session`
    /// after the manager itself is on its way out.
    pub fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.broadcaster.drain_utterance_queue(&self.utterance_rx);
        self.speaker.clear_queue();
        {
            let mut session = self.session.lock().unwrap();
            session.in_conversation = false;
            session.streaming = false;
            session.collected.clear();
        }
        self.remote.disconnect();
        log::info!("session manager shut down");
    }

    fn on_hotword_detected(self: &Arc<Self>, hotword_name: String) {
        let was_in_conversation = self.session.lock().unwrap().in_conversation;

        if was_in_conversation {
            log::info!(
                "hotword '{}' detected mid-conversation, treating as interruption",
                hotword_name
            );
            match self.remote.cancel_response() {
                Ok(true) => log::info!("cancelled active response"),
                Ok(false) => log::debug!("no active response to cancel"),
                Err(e) => log::warn!("cancel_response failed: {}", e),
            }

            {
                let mut session = self.session.lock().unwrap();
                session.streaming = false;
                self.broadcaster.drain_utterance_queue(&self.utterance_rx);
                self.speaker.clear_queue();
                session.collected.clear();
                session.streaming = true;
            }
            self.spawn_collector();
        } else {
            log::info!("hotword '{}' detected, starting conversation", hotword_name);
            if !self.remote.is_connected() {
                if let Err(e) = self.remote.connect(self.clone() as Arc<dyn RemoteAICallbacks>) {
                    log::error!("failed to connect to remote AI service: {}", e);
                    return;
                }
            } else {
                log::info!("reusing existing remote connection");
            }

            {
                let mut session = self.session.lock().unwrap();
                session.in_conversation = true;
                session.streaming = true;
                session.collected.clear();
            }
            self.spawn_collector();
        }
    }

    fn on_voice_stopped(self: &Arc<Self>) {
        let collected = {
            let mut session = self.session.lock().unwrap();
            if !session.in_conversation || !session.streaming {
                log::debug!("voice stopped but not collecting, ignoring");
                return;
            }
            session.streaming = false;
            std::mem::take(&mut session.collected)
        };

        log::info!("voice stopped, submitting {} bytes of audio", collected.len());
        if let Err(e) = self.remote.send_complete_audio(collected) {
            log::error!("failed to submit utterance: {}", e);
        }
    }

    /// Invalidates any collector still running from a prior turn and starts a
    /// fresh one tagged with the new generation. `streaming && in_conversation`
    /// alone isn't enough to stop the *old* collector promptly, since
    /// `on_hotword_detected`'s interruption path flips `streaming` back to
    /// `true` moments after clearing it — the generation bump is what actually
    /// retires the previous collector.
    fn spawn_collector(self: &Arc<Self>) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let session = self.clone();

        std::thread::Builder::new()
            .name("session-collector".to_string())
            .spawn(move || {
                loop {
                    if generation.load(Ordering::SeqCst) != my_generation {
                        break;
                    }
                    let (streaming, in_conversation) = {
                        let s = session.session.lock().unwrap();
                        (s.streaming, s.in_conversation)
                    };
                    if !streaming || !in_conversation {
                        break;
                    }
                    match session.utterance_rx.recv_timeout(COLLECTOR_READ_TIMEOUT) {
                        Ok(frame) => {
                            session.session.lock().unwrap().collected.extend_from_slice(&frame);
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("collector (generation {}) stopped", my_generation);
            })
            .expect("failed to spawn collector thread");
    }
}

impl RemoteAICallbacks for SessionManager {
    fn on_audio_delta(&self, chunk: Vec<u8>) {
        if !self.responding_announced.swap(true, Ordering::Relaxed) {
            log::info!("AI is responding");
        }
        if let Err(e) = self.speaker.play_audio(chunk) {
            log::warn!("failed to enqueue response audio: {}", e);
        }
    }

    fn on_response_done(&self) {
        log::info!("response complete");
        self.responding_announced.store(false, Ordering::Relaxed);
        self.speaker.mark_content_done();
        if let Err(e) = self.remote.clear_audio_buffer() {
            log::warn!("failed to clear remote audio buffer: {}", e);
        }
        let mut session = self.session.lock().unwrap();
        session.streaming = false;
        session.in_conversation = false;
        log::info!("ready for next conversation (connection kept alive)");
    }

    fn on_error(&self, message: String) {
        if crate::session::remote_client::is_non_critical_error(&message) {
            log::warn!("non-critical remote AI message: {}", message);
            return;
        }
        log::error!("critical remote AI error: {}", message);
        let mut session = self.session.lock().unwrap();
        session.in_conversation = false;
        session.streaming = false;
    }
}
