//! Per-file debouncing of change events.
//!
//! Editors often write a file several times per save (temp file, rename,
//! metadata). Each watched file gets one deadline; new events move the
//! deadline instead of adding timers, and a single deferred check per
//! pending file fires once the file has been quiet for the whole period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};

/// What recording an event did to a file's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// `Idle -> Pending`; the caller schedules a check at the deadline.
    Scheduled(Instant),
    /// Already pending; the deadline moved and no new check is needed.
    Extended(Instant),
}

/// Result of a deferred check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Quiet period elapsed; the file is back to idle.
    Fire,
    /// A newer event moved the deadline; check again then.
    Wait(Instant),
    /// Nothing pending (cancelled or already fired).
    Idle,
}

/// Debounce state machine: `Idle -> Pending -> Idle` per file name.
///
/// Time is passed in explicitly so the transitions can be tested without
/// sleeping.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending files: name -> deadline.
    pending: HashMap<String, Instant>,
    quiet_period: Duration,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            quiet_period,
        }
    }

    /// Record a change event for `name` observed at `now`.
    pub fn record(&mut self, name: &str, now: Instant) -> Recorded {
        let deadline = now + self.quiet_period;
        match self.pending.get_mut(name) {
            Some(existing) => {
                *existing = deadline;
                Recorded::Extended(deadline)
            }
            None => {
                self.pending.insert(name.to_string(), deadline);
                Recorded::Scheduled(deadline)
            }
        }
    }

    /// Run the deferred check for `name` at `now`.
    pub fn check(&mut self, name: &str, now: Instant) -> Check {
        match self.pending.get(name) {
            None => Check::Idle,
            Some(&deadline) if now >= deadline => {
                self.pending.remove(name);
                Check::Fire
            }
            Some(&deadline) => Check::Wait(deadline),
        }
    }

    /// Drop a pending trigger. Returns whether one existed.
    pub fn cancel(&mut self, name: &str) -> bool {
        self.pending.remove(name).is_some()
    }

    pub fn deadline(&self, name: &str) -> Option<Instant> {
        self.pending.get(name).copied()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Drives a [`Debouncer`] with tokio timers.
///
/// Settled file names are sent on the `fired` channel. Must be used from
/// within a tokio runtime.
pub struct DebounceScheduler {
    state: Arc<Mutex<Debouncer>>,
    fired: mpsc::UnboundedSender<String>,
    checks: Mutex<HashMap<String, AbortHandle>>,
}

impl DebounceScheduler {
    pub fn new(quiet_period: Duration, fired: mpsc::UnboundedSender<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(Debouncer::new(quiet_period))),
            fired,
            checks: Mutex::new(HashMap::new()),
        }
    }

    /// Record a change for `name` now.
    pub fn notify(&self, name: &str) {
        let recorded = self.state.lock().record(name, Instant::now());

        match recorded {
            Recorded::Extended(_) => {
                crate::debug_event!("debounce", "extended", "{name}");
            }
            Recorded::Scheduled(deadline) => {
                crate::debug_event!("debounce", "scheduled", "{name}");
                let handle = tokio::spawn(settle(
                    self.state.clone(),
                    self.fired.clone(),
                    name.to_string(),
                    deadline,
                ));
                self.checks
                    .lock()
                    .insert(name.to_string(), handle.abort_handle());
            }
        }
    }

    /// Drop a pending trigger and its deferred check.
    pub fn cancel(&self, name: &str) -> bool {
        if let Some(handle) = self.checks.lock().remove(name) {
            handle.abort();
        }
        self.state.lock().cancel(name)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending_count()
    }

    /// Abandon every deferred check without waiting for it.
    pub fn shutdown(&self) {
        for (_, handle) in self.checks.lock().drain() {
            handle.abort();
        }
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Deferred check for one pending file.
async fn settle(
    state: Arc<Mutex<Debouncer>>,
    fired: mpsc::UnboundedSender<String>,
    name: String,
    mut deadline: Instant,
) {
    loop {
        sleep_until(deadline).await;
        let check = state.lock().check(&name, Instant::now());
        match check {
            Check::Fire => {
                crate::debug_event!("debounce", "settled", "{name}");
                let _ = fired.send(name);
                return;
            }
            Check::Wait(next) => deadline = next,
            Check::Idle => return,
        }
    }
}
