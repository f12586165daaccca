//! Trial scheduler - cancellable delayed tasks on a single thread
//!
//! Test pacing (shape segments, tone bursts, trial completion) is expressed
//! as tasks due at an instant. The owner calls `poll_due()` from its own
//! loop; nothing runs on another thread, and a cancelled task can never fire.

pub mod clock;

pub use clock::{ManualClock, SystemTimeSource, TimeSource};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle returned by [`TrialScheduler::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

pub struct TrialScheduler<T> {
    clock: Arc<dyn TimeSource>,
    // Keyed by (deadline, id) so equal deadlines fire in scheduling order
    queue: BTreeMap<(Instant, TaskId), T>,
    deadlines: HashMap<TaskId, Instant>,
    next_id: u64,
}

impl<T> TrialScheduler<T> {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Queue `task` to become due after `delay`
    pub fn schedule(&mut self, delay: Duration, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let due = self.clock.now() + delay;
        self.queue.insert((due, id), task);
        self.deadlines.insert(id, due);
        id
    }

    /// Remove a pending task; returns it if it had not fired yet
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        let due = self.deadlines.remove(&id)?;
        self.queue.remove(&(due, id))
    }

    /// Drop every pending task, returning how many were cancelled
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.queue.len();
        self.queue.clear();
        self.deadlines.clear();
        cancelled
    }

    /// Pop every task whose deadline has passed, earliest first
    pub fn poll_due(&mut self) -> Vec<T> {
        let now = self.clock.now();
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((_, id), task) = entry.remove_entry();
            self.deadlines.remove(&id);
            due.push(task);
        }
        due
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Time until the earliest pending task, zero if already due
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|due| due.saturating_duration_since(self.clock.now()))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
}
