//! Interval scheduling for actors.
//!
//! One deadline per actor in a min-heap. An actor is never due while a tick
//! of it is in flight; completing a tick reschedules it at `now + interval`
//! whatever the outcome was.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use super::registry::ActorKey;

pub struct ActorScheduler {
    actors: HashMap<ActorKey, ActorState>,
    pending: HashMap<ActorKey, Instant>,
    heap: BinaryHeap<Reverse<(Instant, ActorKey)>>,
}

struct ActorState {
    interval: Duration,
    in_flight: bool,
}

impl Default for ActorScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorScheduler {
    pub fn new() -> Self {
        Self {
            actors: HashMap::new(),
            pending: HashMap::new(),
            heap: BinaryHeap::new(),
        }
    }

    /// Register an actor whose first tick is due at `first_due`.
    pub fn register(&mut self, key: ActorKey, interval: Duration, first_due: Instant) {
        self.actors.insert(
            key.clone(),
            ActorState {
                interval,
                in_flight: false,
            },
        );
        self.schedule(key, first_due);
    }

    pub fn is_in_flight(&self, key: &ActorKey) -> bool {
        self.actors.get(key).is_some_and(|state| state.in_flight)
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.pop_stale();
        self.heap.peek().map(|Reverse((t, _))| *t)
    }

    pub fn drain_due(&mut self, now: Instant) -> Vec<ActorKey> {
        let mut due = Vec::new();
        loop {
            self.pop_stale();
            let Some(Reverse((fire_at, key))) = self.heap.peek().cloned() else {
                break;
            };
            if fire_at > now {
                break;
            }
            let _ = self.heap.pop();
            if self.pending.get(&key).copied() == Some(fire_at) && !self.is_in_flight(&key) {
                self.pending.remove(&key);
                due.push(key);
            }
        }
        due
    }

    pub fn start_in_flight(&mut self, key: &ActorKey) {
        if let Some(state) = self.actors.get_mut(key) {
            state.in_flight = true;
        }
        self.pending.remove(key);
    }

    pub fn complete(&mut self, key: &ActorKey, now: Instant) {
        let Some(state) = self.actors.get_mut(key) else {
            return;
        };
        state.in_flight = false;
        let next = now + state.interval;
        self.schedule(key.clone(), next);
    }

    fn schedule(&mut self, key: ActorKey, at: Instant) {
        if self.is_in_flight(&key) {
            return;
        }
        self.pending.insert(key.clone(), at);
        self.heap.push(Reverse((at, key)));
    }

    fn pop_stale(&mut self) {
        while let Some(Reverse((fire_at, key))) = self.heap.peek() {
            match self.pending.get(key).copied() {
                Some(current) if current == *fire_at => break,
                _ => {
                    let _ = self.heap.pop();
                }
            }
        }
    }
}
