use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{Envelope, Shared, SubscriberId, SyncEvent};

/// Receiving side of the bus for one listener.
///
/// Dropping it unregisters the listener, so a view cannot leak its
/// subscription past teardown.
pub struct Subscription {
    id: SubscriberId,
    receiver: broadcast::Receiver<Envelope>,
    shared: Arc<Shared>,
    last_acked: u64,
    last_delivered: u64,
    replay: VecDeque<Envelope>,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriberId,
        receiver: broadcast::Receiver<Envelope>,
        shared: Arc<Shared>,
        position: u64,
    ) -> Self {
        Self {
            id,
            receiver,
            shared,
            last_acked: position,
            last_delivered: position,
            replay: VecDeque::new(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn last_acked(&self) -> u64 {
        self.last_acked
    }

    /// Waits for the next event. `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            if let Some(envelope) = self.next_replayed() {
                return Some(SyncEvent::Change(envelope));
            }
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if let Some(envelope) = self.fresh(envelope) {
                        return Some(SyncEvent::Change(envelope));
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    if let Some(event) = self.recover(missed) {
                        return Some(event);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            if let Some(envelope) = self.next_replayed() {
                return Some(SyncEvent::Change(envelope));
            }
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if let Some(envelope) = self.fresh(envelope) {
                        return Some(SyncEvent::Change(envelope));
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    if let Some(event) = self.recover(missed) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Marks everything up to `seq` as processed.
    pub fn ack(&mut self, seq: u64) {
        if seq <= self.last_acked {
            return;
        }
        self.last_acked = seq;
        if let Some(acked) = self.shared.lock().acks.get_mut(&self.id) {
            *acked = seq;
        }
    }

    fn next_replayed(&mut self) -> Option<Envelope> {
        let envelope = self.replay.pop_front()?;
        self.last_delivered = self.last_delivered.max(envelope.seq);
        Some(envelope)
    }

    fn fresh(&mut self, envelope: Envelope) -> Option<Envelope> {
        if envelope.seq <= self.last_delivered {
            return None;
        }
        self.last_delivered = envelope.seq;
        Some(envelope)
    }

    /// Refills from the replay log after the channel dropped `missed`
    /// envelopes for this subscriber. Returns `Resync` when the log no
    /// longer covers the gap.
    fn recover(&mut self, missed: u64) -> Option<SyncEvent> {
        let state = self.shared.lock();
        let covers_gap = state
            .log
            .front()
            .is_some_and(|oldest| oldest.seq <= self.last_acked + 1);
        if covers_gap {
            debug!(subscriber = self.id, missed, from = self.last_acked, "Replaying missed changes");
            self.replay
                .extend(state.log.iter().filter(|e| e.seq > self.last_acked).cloned());
            None
        } else {
            warn!(subscriber = self.id, missed, "Replay log exhausted, subscriber must resync");
            Some(SyncEvent::Resync { missed })
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.lock().acks.remove(&self.id);
        debug!(subscriber = self.id, "Subscriber released");
    }
}
