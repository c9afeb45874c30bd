//! Delayed single-shot task scheduling.
//!
//! The dialogue engine never sleeps; it hands its reply to a `Scheduler`.
//! `TokioScheduler` runs replies on the tokio timer, `ManualScheduler` keeps a
//! virtual clock so hosts and tests can fire them deterministically.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Injectable timer used for the simulated processing delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled
    /// (or dropped) first.
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Handle to a pending task. Dropping it cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    cancel: CancellationToken,
}

impl ScheduledTask {
    fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Scheduler backed by the tokio timer.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Bind to the current runtime. Panics outside a tokio runtime, like
    /// `tokio::spawn`.
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        self.handle.spawn(async move {
            tokio::select! {
              _ = tok.cancelled() => {}
              _ = sleep(delay) => {
                if !tok.is_cancelled() {
                  task();
                }
              }
            }
        });
        ScheduledTask::new(cancel)
    }
}

struct PendingTask {
    seq: u64,
    due: Duration,
    cancel: CancellationToken,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingTask>,
}

/// Virtual-clock scheduler. Nothing runs until the owner advances time.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        // Tasks never run under this lock, so poisoning only follows a panic in
        // our own bookkeeping; keep going with the inner state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of scheduled tasks that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .pending
            .iter()
            .filter(|p| !p.cancel.is_cancelled())
            .count()
    }

    /// Move the clock forward by `by` and run every task that became due, in
    /// deadline order. Tasks scheduled while running are included if they are
    /// already due. Returns how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let st = self.lock();
            st.now + by
        };
        self.run_until(target)
    }

    /// Run every pending task, moving the clock to each deadline in turn.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next_due = {
                let mut st = self.lock();
                st.pending.retain(|p| !p.cancel.is_cancelled());
                st.pending.iter().map(|p| p.due).min()
            };
            let Some(due) = next_due else {
                return ran;
            };
            ran += self.run_until(due);
        }
    }

    fn run_until(&self, target: Duration) -> usize {
        let mut ran = 0;
        loop {
            let next = {
                let mut st = self.lock();
                st.pending.retain(|p| !p.cancel.is_cancelled());
                let idx = st
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(idx, _)| idx);
                match idx {
                    Some(idx) => {
                        let p = st.pending.swap_remove(idx);
                        if p.due > st.now {
                            st.now = p.due;
                        }
                        Some(p.task)
                    }
                    None => {
                        if target > st.now {
                            st.now = target;
                        }
                        None
                    }
                }
            };

            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let cancel = CancellationToken::new();
        let mut st = self.lock();
        let seq = st.next_seq;
        st.next_seq += 1;
        let due = st.now + delay;
        st.pending.push(PendingTask {
            seq,
            due,
            cancel: cancel.clone(),
            task,
        });
        ScheduledTask::new(cancel)
    }
}
