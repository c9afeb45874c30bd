//! Session notifications for the rendering layer.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use tokio::sync::mpsc;

use crate::domain::Message;

/// Something the UI should react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Fired after every append, carrying the full transcript at that point.
    TranscriptChanged(Vec<Message>),
    /// Fired on entering (`true`) or leaving (`false`) the awaiting state.
    ComposingChanged(bool),
}

/// Port implemented by whatever renders the conversation.
///
/// Callbacks arrive in the order the changes happened, on whichever thread is
/// delivering at the time (a submitting caller or the scheduler's timer). They
/// may call back into the session.
pub trait SessionObserver: Send + Sync {
    fn on_transcript_changed(&self, snapshot: &[Message]);
    fn on_composing_changed(&self, composing: bool);
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_transcript_changed(&self, _snapshot: &[Message]) {}
    fn on_composing_changed(&self, _composing: bool) {}
}

/// Forwards notifications into a tokio channel for async front-ends.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionObserver for ChannelObserver {
    fn on_transcript_changed(&self, snapshot: &[Message]) {
        // A closed receiver means the front-end is gone; nothing left to render.
        let _ = self
            .tx
            .send(SessionEvent::TranscriptChanged(snapshot.to_vec()));
    }

    fn on_composing_changed(&self, composing: bool) {
        let _ = self.tx.send(SessionEvent::ComposingChanged(composing));
    }
}

/// Ordered hand-off of events from state changes to the observer.
///
/// Events are pushed while the session state lock is held, so queue order is
/// mutation order. Delivery happens after that lock is released, by a single
/// drainer at a time; re-entrant pushes from inside a callback are picked up by
/// the drainer already running.
#[derive(Default)]
pub(crate) struct Outbox {
    queue: Mutex<VecDeque<SessionEvent>>,
    draining: AtomicBool,
}

impl Outbox {
    pub(crate) fn push(&self, ev: SessionEvent) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(ev);
    }

    pub(crate) fn drain(&self, observer: &dyn SessionObserver) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            let flag = DrainFlag(&self.draining);

            while let Some(ev) = self.pop() {
                match &ev {
                    SessionEvent::TranscriptChanged(snapshot) => {
                        observer.on_transcript_changed(snapshot)
                    }
                    SessionEvent::ComposingChanged(c) => observer.on_composing_changed(*c),
                }
            }

            drop(flag);

            // Another thread may have pushed after our last pop but before the
            // flag was released.
            if self.is_empty() {
                return;
            }
        }
    }

    fn pop(&self) -> Option<SessionEvent> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Releases the drain flag on scope exit, including when an observer panics,
/// so a later `drain` can still deliver what is queued.
struct DrainFlag<'a>(&'a AtomicBool);

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, Sender};
    use chrono::Utc;
    use std::sync::Arc;

    fn msg(id: u64) -> Message {
        Message {
            id: MessageId(id),
            content: format!("m{id}"),
            sender: Sender::User,
            timestamp: Utc::now(),
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl SessionObserver for Recorder {
        fn on_transcript_changed(&self, snapshot: &[Message]) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("transcript:{}", snapshot.len()));
        }

        fn on_composing_changed(&self, composing: bool) {
            self.seen.lock().unwrap().push(format!("composing:{composing}"));
        }
    }

    #[test]
    fn outbox_delivers_in_push_order() {
        let outbox = Outbox::default();
        let rec = Recorder::default();
        outbox.push(SessionEvent::TranscriptChanged(vec![msg(1)]));
        outbox.push(SessionEvent::ComposingChanged(true));
        outbox.push(SessionEvent::TranscriptChanged(vec![msg(1), msg(2)]));
        outbox.drain(&rec);

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec!["transcript:1", "composing:true", "transcript:2"]
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn panicking_observer_does_not_stall_later_delivery() {
        struct Flaky {
            inner: Recorder,
        }

        impl SessionObserver for Flaky {
            fn on_transcript_changed(&self, snapshot: &[Message]) {
                self.inner.on_transcript_changed(snapshot);
            }

            fn on_composing_changed(&self, composing: bool) {
                if composing {
                    panic!("render failed");
                }
                self.inner.on_composing_changed(composing);
            }
        }

        let outbox = Outbox::default();
        let obs = Flaky {
            inner: Recorder::default(),
        };
        outbox.push(SessionEvent::ComposingChanged(true));
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| outbox.drain(&obs)));
        assert!(res.is_err());

        outbox.push(SessionEvent::ComposingChanged(false));
        outbox.drain(&obs);

        assert_eq!(*obs.inner.seen.lock().unwrap(), vec!["composing:false"]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn reentrant_pushes_are_delivered_by_the_running_drainer() {
        struct Reentrant {
            outbox: Arc<Outbox>,
            inner: Recorder,
        }

        impl SessionObserver for Reentrant {
            fn on_transcript_changed(&self, snapshot: &[Message]) {
                self.inner.on_transcript_changed(snapshot);
                if snapshot.len() == 1 {
                    self.outbox.push(SessionEvent::ComposingChanged(false));
                    // Nested drain must not deliver out of order or deadlock.
                    self.outbox.drain(self);
                }
            }

            fn on_composing_changed(&self, composing: bool) {
                self.inner.on_composing_changed(composing);
            }
        }

        let outbox = Arc::new(Outbox::default());
        let obs = Reentrant {
            outbox: outbox.clone(),
            inner: Recorder::default(),
        };
        outbox.push(SessionEvent::TranscriptChanged(vec![msg(1)]));
        outbox.drain(&obs);

        assert_eq!(
            *obs.inner.seen.lock().unwrap(),
            vec!["transcript:1", "composing:false"]
        );
    }

    #[tokio::test]
    async fn channel_observer_forwards_events() {
        let (obs, mut rx) = ChannelObserver::new();
        obs.on_composing_changed(true);
        obs.on_transcript_changed(&[msg(7)]);

        assert_eq!(rx.recv().await, Some(SessionEvent::ComposingChanged(true)));
        match rx.recv().await {
            Some(SessionEvent::TranscriptChanged(s)) => assert_eq!(s[0].id, MessageId(7)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
