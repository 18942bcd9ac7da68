//! Fans out captured frames to any number of consumer queues, each with its own
//! overflow policy. Two queues are always present: a skip-ahead queue for the
//! hotword detector (latency matters more than completeness) and a FIFO queue
//! for utterance collection (no frame may be silently lost mid-utterance).
//!
//! Grounded on `original_source/core/audio_handler.py`'s `consumer_queues` fan-out
//! (`put_nowait`, silently dropping on `queue.Full`) generalized to named policies,
//! and on the broadcast-channel fan-out shape in the teacher's
//! `speech_producer/mod.rs`.

use crate::model::Frame;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const HOTWORD_QUEUE_CAPACITY: usize = 3;
pub const UTTERANCE_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Readers only ever want the newest frame; overflow silently drops older
    /// frames still sitting in the channel.
    SkipAhead,
    /// No frame may be dropped while a reader is draining promptly; overflow is
    /// still a (logged) drop rather than a block, since the broadcaster must
    /// never stall on a slow consumer.
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(u64);

struct RegisteredQueue {
    id: QueueId,
    policy: QueuePolicy,
    sender: Sender<Frame>,
}

pub struct AudioBroadcaster {
    queues: Mutex<Vec<RegisteredQueue>>,
    next_id: AtomicU64,
    hotword_queue_id: QueueId,
    utterance_queue_id: QueueId,
}

impl AudioBroadcaster {
    /// Builds the broadcaster with its two built-in queues pre-registered, and
    /// returns the receivers callers need to read from them alongside the
    /// broadcaster itself.
    pub fn new() -> (std::sync::Arc<Self>, Receiver<Frame>, Receiver<Frame>) {
        let this = Self {
            queues: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            hotword_queue_id: QueueId(0),
            utterance_queue_id: QueueId(1),
        };
        let mut this = this;
        let (hotword_id, hotword_rx) =
            this.register_queue_inner(QueuePolicy::SkipAhead, HOTWORD_QUEUE_CAPACITY);
        let (utterance_id, utterance_rx) =
            this.register_queue_inner(QueuePolicy::Fifo, UTTERANCE_QUEUE_CAPACITY);
        this.hotword_queue_id = hotword_id;
        this.utterance_queue_id = utterance_id;
        (std::sync::Arc::new(this), hotword_rx, utterance_rx)
    }

    fn register_queue_inner(
        &mut self,
        policy: QueuePolicy,
        capacity: usize,
    ) -> (QueueId, Receiver<Frame>) {
        let id = QueueId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.queues
            .get_mut()
            .unwrap()
            .push(RegisteredQueue { id, policy, sender: tx });
        (id, rx)
    }

    /// Register an additional consumer queue at runtime. Each call creates a
    /// fresh queue (there is no prior object for a first call to be identical
    /// to); a `QueueId` returned from an earlier call identifies that queue for
    /// bookkeeping but does not re-create it — re-registering is meaningful only
    /// as "add another independent consumer", which this always does.
    pub fn register_queue(&self, policy: QueuePolicy, capacity: usize) -> (QueueId, Receiver<Frame>) {
        let id = QueueId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.queues
            .lock()
            .unwrap()
            .push(RegisteredQueue { id, policy, sender: tx });
        (id, rx)
    }

    pub fn unregister_queue(&self, id: QueueId) {
        self.queues.lock().unwrap().retain(|q| q.id != id);
    }

    pub fn hotword_queue_id(&self) -> QueueId {
        self.hotword_queue_id
    }

    pub fn utterance_queue_id(&self) -> QueueId {
        self.utterance_queue_id
    }

    /// Deliver one frame to every registered queue. Non-blocking: a full queue
    /// just drops the frame (debug-logged) rather than stalling the caller,
    /// which must stay wait-free when called from the capture callback.
    pub fn broadcast(&self, frame: Frame) {
        let queues = self.queues.lock().unwrap();
        for q in queues.iter() {
            if q.sender.try_send(frame.clone()).is_err() {
                log::debug!(
                    "audio queue {:?} ({:?}) full, dropping frame",
                    q.id,
                    q.policy
                );
            }
        }
    }

    /// Drain every frame currently buffered in the utterance-buffer queue
    /// without processing it — used by SessionManager on interruption.
    pub fn drain_utterance_queue(&self, utterance_rx: &Receiver<Frame>) {
        while utterance_rx.try_recv().is_ok() {}
    }
}

/// Skip-ahead read: discard any backlog, returning only the most recently
/// broadcast frame, blocking up to `timeout` if nothing has arrived yet.
pub fn recv_latest(rx: &Receiver<Frame>, timeout: Duration) -> Option<Frame> {
    let mut latest = match rx.recv_timeout(timeout) {
        Ok(frame) => frame,
        Err(_) => return None,
    };
    while let Ok(newer) = rx.try_recv() {
        latest = newer;
    }
    Some(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::frame_from_i16;

    #[test]
    fn broadcast_delivers_to_both_builtin_queues() {
        let (broadcaster, hotword_rx, utterance_rx) = AudioBroadcaster::new();
        let frame = frame_from_i16(&[1, 2, 3]);
        broadcaster.broadcast(frame.clone());
        assert_eq!(hotword_rx.recv_timeout(Duration::from_millis(50)).unwrap(), frame);
        assert_eq!(utterance_rx.recv_timeout(Duration::from_millis(50)).unwrap(), frame);
    }

    #[test]
    fn skip_ahead_queue_yields_only_latest_frame() {
        let (broadcaster, hotword_rx, _utterance_rx) = AudioBroadcaster::new();
        for i in 0..10i16 {
            broadcaster.broadcast(frame_from_i16(&[i]));
        }
        let latest = recv_latest(&hotword_rx, Duration::from_millis(50)).unwrap();
        assert_eq!(latest, frame_from_i16(&[9]));
    }

    #[test]
    fn fifo_queue_preserves_order() {
        let (broadcaster, _hotword_rx, utterance_rx) = AudioBroadcaster::new();
        for i in 0..5i16 {
            broadcaster.broadcast(frame_from_i16(&[i]));
        }
        for i in 0..5i16 {
            let frame = utterance_rx.recv_timeout(Duration::from_millis(50)).unwrap();
            assert_eq!(frame, frame_from_i16(&[i]));
        }
    }

    #[test]
    fn register_queue_adds_independent_consumer() {
        let (broadcaster, _hotword_rx, _utterance_rx) = AudioBroadcaster::new();
        let (id, rx) = broadcaster.register_queue(QueuePolicy::Fifo, 4);
        broadcaster.broadcast(frame_from_i16(&[42]));
        assert_eq!(rx.recv_timeout(Duration::from_millis(50)).unwrap(), frame_from_i16(&[42]));
        broadcaster.unregister_queue(id);
        broadcaster.broadcast(frame_from_i16(&[43]));
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn drain_utterance_queue_empties_backlog() {
        let (broadcaster, _hotword_rx, utterance_rx) = AudioBroadcaster::new();
        for i in 0..3i16 {
            broadcaster.broadcast(frame_from_i16(&[i]));
        }
        broadcaster.drain_utterance_queue(&utterance_rx);
        assert!(utterance_rx.try_recv().is_err());
    }
}
