//! Dialogue engine: one conversation, one reply in flight.
//!
//! `Idle + submit` appends the user message, enters `Awaiting` and schedules
//! the reply. When the reply fires the most recent user text is classified, the
//! bot message is appended and the session returns to `Idle`. While `Awaiting`,
//! further submissions are rejected (or parked, with `BusyPolicy::Queue`).

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tracing::{debug, error, info};

use crate::{
    domain::{Message, MessageId, NewMessage},
    errors::Error,
    events::{Outbox, SessionEvent, SessionObserver},
    intent::{RuleSet, GREETING},
    scheduler::{ScheduledTask, Scheduler},
    transcript::TranscriptStore,
    Result,
};

/// What to do with a submission that arrives while a reply is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Reject with `Error::EngineBusy`.
    #[default]
    Reject,
    /// Park up to `max_pending` texts; each is appended as a user message only
    /// after the previous reply has been appended.
    Queue { max_pending: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Simulated processing time before a reply is appended.
    pub response_delay: Duration,
    pub busy_policy: BusyPolicy,
    /// Bot message the transcript starts with, if any.
    pub greeting: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_delay: Duration::from_millis(1500),
            busy_policy: BusyPolicy::Reject,
            greeting: Some(GREETING.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Awaiting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The user message was appended and a reply is on its way.
    Accepted(MessageId),
    /// Parked behind the pending reply; `position` is 1-based.
    Queued { position: usize },
}

struct PendingTurn {
    turn: u64,
    input: String,
    timer: Option<ScheduledTask>,
}

enum Phase {
    Idle,
    Awaiting(PendingTurn),
}

struct SessionState {
    transcript: TranscriptStore,
    phase: Phase,
    queued: VecDeque<String>,
    last_turn: u64,
    closed: bool,
}

impl SessionState {
    fn begin_turn(&mut self, input: String) -> u64 {
        self.last_turn += 1;
        let turn = self.last_turn;
        self.phase = Phase::Awaiting(PendingTurn {
            turn,
            input,
            timer: None,
        });
        turn
    }
}

struct SessionInner {
    cfg: EngineConfig,
    rules: RuleSet,
    scheduler: Arc<dyn Scheduler>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<SessionState>,
    outbox: Outbox,
}

/// A single conversation owned by the caller.
///
/// Dropping the session closes it: a pending reply is cancelled and never
/// appended.
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(
        cfg: EngineConfig,
        rules: RuleSet,
        scheduler: Arc<dyn Scheduler>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        let mut transcript = TranscriptStore::new();
        if let Some(greeting) = &cfg.greeting {
            transcript.append(NewMessage::bot(greeting.as_str()))?;
        }

        let inner = Arc::new(SessionInner {
            cfg,
            rules,
            scheduler,
            observer,
            state: Mutex::new(SessionState {
                transcript,
                phase: Phase::Idle,
                queued: VecDeque::new(),
                last_turn: 0,
                closed: false,
            }),
            outbox: Outbox::default(),
        });

        {
            let st = inner.lock();
            if !st.transcript.is_empty() {
                inner
                    .outbox
                    .push(SessionEvent::TranscriptChanged(st.transcript.all()));
            }
        }
        inner.deliver();

        info!(
            rules = inner.rules.rules().len(),
            delay_ms = inner.cfg.response_delay.as_millis() as u64,
            "chat session opened"
        );
        Ok(Self { inner })
    }

    /// Submit one user utterance.
    ///
    /// Rejections (`EmptyInput`, `EngineBusy`, `SessionClosed`) leave the
    /// transcript untouched.
    pub fn submit(&self, text: &str) -> Result<SubmitOutcome> {
        let inner = &self.inner;
        let (id, turn) = {
            let mut st = inner.lock();
            if st.closed {
                return Err(Error::SessionClosed);
            }
            if text.trim().is_empty() {
                debug!("rejected blank submission");
                return Err(Error::EmptyInput);
            }

            if matches!(st.phase, Phase::Awaiting(_)) {
                return match inner.cfg.busy_policy {
                    BusyPolicy::Reject => {
                        debug!("rejected submission while composing");
                        Err(Error::EngineBusy)
                    }
                    BusyPolicy::Queue { max_pending } => {
                        if st.queued.len() >= max_pending {
                            debug!(max_pending, "queue full, rejected submission");
                            return Err(Error::EngineBusy);
                        }
                        st.queued.push_back(text.to_string());
                        let position = st.queued.len();
                        debug!(position, "queued submission behind pending reply");
                        Ok(SubmitOutcome::Queued { position })
                    }
                };
            }

            let msg = st.transcript.append(NewMessage::user(text))?;
            let turn = st.begin_turn(text.to_string());
            inner
                .outbox
                .push(SessionEvent::TranscriptChanged(st.transcript.all()));
            inner.outbox.push(SessionEvent::ComposingChanged(true));
            debug!(turn, message_id = msg.id.0, "accepted submission");
            (msg.id, turn)
        };

        inner.deliver();
        SessionInner::arm_reply(inner, turn);
        Ok(SubmitOutcome::Accepted(id))
    }

    /// Stop the conversation. A pending reply is cancelled, queued texts are
    /// dropped and later submissions fail with `Error::SessionClosed`.
    pub fn close(&self) {
        let inner = &self.inner;
        {
            let mut st = inner.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            st.queued.clear();
            let was_awaiting = matches!(st.phase, Phase::Awaiting(_));
            // Dropping the pending turn cancels its timer.
            st.phase = Phase::Idle;
            if was_awaiting {
                inner.outbox.push(SessionEvent::ComposingChanged(false));
            }
            info!(messages = st.transcript.len(), "chat session closed");
        }
        inner.deliver();
    }

    /// Point-in-time copy of the transcript.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().transcript.all()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().transcript.is_empty()
    }

    pub fn state(&self) -> EngineState {
        match self.inner.lock().phase {
            Phase::Idle => EngineState::Idle,
            Phase::Awaiting(_) => EngineState::Awaiting,
        }
    }

    /// True while a reply is pending (drives the typing indicator).
    pub fn is_composing(&self) -> bool {
        self.state() == EngineState::Awaiting
    }

    /// Number of parked submissions (always 0 with `BusyPolicy::Reject`).
    pub fn queued(&self) -> usize {
        self.inner.lock().queued.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn rules(&self) -> &RuleSet {
        &self.inner.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.cfg
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Observer callbacks never run under this lock; a poisoned lock can only
        // follow a panic in our own bookkeeping, whose state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver(&self) {
        self.outbox.drain(self.observer.as_ref());
    }

    fn arm_reply(inner: &Arc<SessionInner>, turn: u64) {
        let weak = Arc::downgrade(inner);
        let timer = inner.scheduler.schedule(
            inner.cfg.response_delay,
            Box::new(move || {
                // A dropped session stays dropped.
                if let Some(inner) = weak.upgrade() {
                    SessionInner::complete_turn(&inner, turn);
                }
            }),
        );

        let mut st = inner.lock();
        match &mut st.phase {
            Phase::Awaiting(pending) if pending.turn == turn && pending.timer.is_none() => {
                pending.timer = Some(timer);
            }
            // Already answered (inline scheduler) or closed meanwhile.
            _ => timer.cancel(),
        }
    }

    fn complete_turn(inner: &Arc<SessionInner>, turn: u64) {
        let next_turn = {
            let mut st = inner.lock();
            if st.closed {
                return;
            }
            let input = match &st.phase {
                Phase::Awaiting(pending) if pending.turn == turn => pending.input.clone(),
                _ => return,
            };

            let reply = inner.rules.classify(&input);
            debug!(
                turn,
                topic = reply.topic.unwrap_or("fallback"),
                "reply ready"
            );
            match st.transcript.append(NewMessage::bot(reply.response)) {
                Ok(_) => inner
                    .outbox
                    .push(SessionEvent::TranscriptChanged(st.transcript.all())),
                Err(e) => error!("failed to append reply for turn {turn}: {e}"),
            }

            st.phase = Phase::Idle;
            let next = match st.queued.pop_front() {
                Some(text) => match st.transcript.append(NewMessage::user(text.as_str())) {
                    Ok(msg) => {
                        let next = st.begin_turn(text);
                        inner
                            .outbox
                            .push(SessionEvent::TranscriptChanged(st.transcript.all()));
                        debug!(turn = next, message_id = msg.id.0, "dequeued submission");
                        Some(next)
                    }
                    Err(e) => {
                        error!("failed to append queued submission: {e}");
                        st.queued.clear();
                        None
                    }
                },
                None => None,
            };
            if next.is_none() {
                inner.outbox.push(SessionEvent::ComposingChanged(false));
            }
            next
        };

        inner.deliver();
        if let Some(next) = next_turn {
            SessionInner::arm_reply(inner, next);
        }
    }
}
