//! Discrete-event scheduler and virtual clock
//!
//! Everything in the simulator runs on one logical thread driven by this
//! scheduler. Events are closures over a caller-chosen world type `W`; they run
//! to completion, in non-decreasing time order, and events scheduled for the
//! same instant run in the order they were scheduled.
//!
//! # Invariants
//!
//! - Monotonicity: `SimClock::now()` never goes backwards
//! - FIFO ties: equal timestamps are broken by a scheduling sequence number
//! - Idempotent cancellation: cancelling a fired or cancelled event is a no-op

use crate::{Error, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Simulation time, measured from the start of the run
pub type SimTime = Duration;

/// Shared handle to the virtual clock
///
/// Clones observe the same time. Only the scheduler advances it in a running
/// simulation; tests may advance it by hand.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    nanos: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    /// Move the clock forward to `t`; earlier times are ignored
    pub fn advance_to(&self, t: SimTime) {
        let nanos = u64::try_from(t.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn advance(&self, delta: Duration) {
        self.advance_to(self.now() + delta);
    }
}

/// Handle to a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

type OnceTask<W> = Box<dyn FnOnce(&mut W, &mut Simulator<W>)>;
type RepeatingTask<W> = Box<dyn FnMut(&mut W, &mut Simulator<W>)>;

enum Task<W> {
    Once(OnceTask<W>),
    Repeating {
        period: Duration,
        task: RepeatingTask<W>,
    },
}

/// Min-heap event queue over a world of type `W`
pub struct Simulator<W> {
    clock: SimClock,
    queue: BinaryHeap<Reverse<(SimTime, u64, EventId)>>,
    tasks: HashMap<EventId, Task<W>>,
    next_seq: u64,
    next_id: u64,
    running: Option<EventId>,
    running_cancelled: bool,
    executed: u64,
}

impl<W: 'static> Default for Simulator<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: 'static> Simulator<W> {
    pub fn new() -> Self {
        Self::with_clock(SimClock::new())
    }

    /// Drive an existing clock (shared with key buffers and engines)
    pub fn with_clock(clock: SimClock) -> Self {
        Self {
            clock,
            queue: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_seq: 0,
            next_id: 0,
            running: None,
            running_cancelled: false,
            executed: 0,
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Run `f` once after `delay`
    pub fn schedule<F>(&mut self, delay: Duration, f: F) -> EventId
    where
        F: FnOnce(&mut W, &mut Simulator<W>) + 'static,
    {
        let at = self.now() + delay;
        self.schedule_at(at, f)
    }

    /// Run `f` once at absolute time `at` (clamped to now)
    pub fn schedule_at<F>(&mut self, at: SimTime, f: F) -> EventId
    where
        F: FnOnce(&mut W, &mut Simulator<W>) + 'static,
    {
        let id = self.allocate_id();
        let at = at.max(self.now());
        self.enqueue(id, at, Task::Once(Box::new(f)));
        id
    }

    /// Run `f` every `period`, first at now + period, until cancelled
    pub fn schedule_repeating<F>(&mut self, period: Duration, f: F) -> Result<EventId>
    where
        F: FnMut(&mut W, &mut Simulator<W>) + 'static,
    {
        if period.is_zero() {
            return Err(Error::Validation(
                "repeating timer period must be non-zero".to_string(),
            ));
        }
        let id = self.allocate_id();
        let at = self.now() + period;
        self.enqueue(
            id,
            at,
            Task::Repeating {
                period,
                task: Box::new(f),
            },
        );
        Ok(id)
    }

    /// Cancel a pending event
    ///
    /// Unknown, fired or already cancelled ids are ignored. A repeating task
    /// may cancel itself from inside its own callback.
    pub fn cancel(&mut self, id: EventId) {
        if self.tasks.remove(&id).is_none() && self.running == Some(id) {
            self.running_cancelled = true;
        }
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Number of live (not cancelled, not fired) events
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Total number of events executed so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Execute the next live event; returns false when the queue is empty
    pub fn step(&mut self, world: &mut W) -> bool {
        let Some((at, id, task)) = self.pop_live() else {
            return false;
        };

        self.clock.advance_to(at);
        self.executed += 1;
        trace!(event = id.0, at_ms = at.as_millis() as u64, "Dispatching event");

        match task {
            Task::Once(f) => f(world, self),
            Task::Repeating { period, mut task } => {
                self.running = Some(id);
                self.running_cancelled = false;
                task(world, self);
                self.running = None;

                if !self.running_cancelled {
                    let next = self.now() + period;
                    self.enqueue(id, next, Task::Repeating { period, task });
                }
            }
        }
        true
    }

    /// Execute every event due at or before `end`, then move the clock to `end`
    pub fn run_until(&mut self, world: &mut W, end: SimTime) {
        while let Some(&Reverse((at, _, id))) = self.queue.peek() {
            if !self.tasks.contains_key(&id) {
                self.queue.pop();
                continue;
            }
            if at > end {
                break;
            }
            self.step(world);
        }
        self.clock.advance_to(end);
    }

    /// Execute events for `duration` of simulated time from now
    pub fn run_for(&mut self, world: &mut W, duration: Duration) {
        let end = self.now() + duration;
        self.run_until(world, end);
    }

    fn allocate_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    fn enqueue(&mut self, id: EventId, at: SimTime, task: Task<W>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((at, seq, id)));
        self.tasks.insert(id, task);
    }

    fn pop_live(&mut self) -> Option<(SimTime, EventId, Task<W>)> {
        while let Some(Reverse((at, _, id))) = self.queue.pop() {
            if let Some(task) = self.tasks.remove(&id) {
                return Some((at, id, task));
            }
        }
        None
    }
}
