//! At most one cancellable timer per entity, multiplexed into the event queue.
//!
//! A timer is pending for an entity if and only if a [Kind::TimerFired] event addressed to it is
//! in the [Queue]. Starting a timer that is already pending or stopping one that is not are
//! caller errors: they are logged and leave the queue untouched.

use crate::{
    queue::{Event, Kind, Queue},
    Entity,
};
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use tracing::{debug, warn};

/// Timer bookkeeping for both entities.
#[derive(Debug)]
pub struct Timers {
    started: Counter,
    stopped: Counter,
}

impl Timers {
    pub fn new(registry: &mut Registry) -> Self {
        let started = Counter::default();
        let stopped = Counter::default();
        registry.register(
            "timers_started",
            "Number of timers started",
            started.clone(),
        );
        registry.register(
            "timers_stopped",
            "Number of timers stopped before firing",
            stopped.clone(),
        );
        Self { started, stopped }
    }

    /// Schedule a timer for `entity` to fire `duration` after `now`.
    ///
    /// Returns `false` (without touching the queue) if `entity` already has a pending timer or
    /// if `duration` is negative or not a number.
    pub fn start(&mut self, queue: &mut Queue, now: f64, entity: Entity, duration: f64) -> bool {
        if Self::pending(queue, entity) {
            warn!(%entity, "attempt to start a timer that is already started");
            return false;
        }
        if duration.is_nan() || duration < 0.0 {
            warn!(%entity, duration, "attempt to start a timer with an invalid duration");
            return false;
        }
        let at = now + duration;
        debug!(%entity, now, at, "starting timer");
        queue.insert(Event::new(at, Kind::TimerFired, entity));
        self.started.inc();
        true
    }

    /// Cancel the pending timer of `entity`.
    ///
    /// Returns `false` if `entity` had no pending timer.
    pub fn stop(&mut self, queue: &mut Queue, entity: Entity) -> bool {
        match queue.remove_first(|event| event.entity == entity && event.kind.is_timer()) {
            Some(event) => {
                debug!(%entity, at = event.time, "stopping timer");
                self.stopped.inc();
                true
            }
            None => {
                warn!(%entity, "unable to cancel timer: not running");
                false
            }
        }
    }

    /// Returns `true` if `entity` has a pending timer.
    pub fn pending(queue: &Queue, entity: Entity) -> bool {
        queue.any(|event| event.entity == entity && event.kind.is_timer())
    }

    /// Number of timers started.
    pub fn started(&self) -> u64 {
        self.started.get()
    }

    /// Number of timers stopped before firing.
    pub fn stopped(&self) -> u64 {
        self.stopped.get()
    }
}
