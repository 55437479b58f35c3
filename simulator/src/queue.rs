//! Time-ordered queue of pending events.
//!
//! Events are kept in a [BTreeMap] keyed by `(time, sequence)`, where `sequence` is assigned
//! at insertion. Events scheduled for the same time are therefore dispatched in the order they
//! were inserted (a new event is placed after every existing event with an equal time and before
//! the first event with a strictly greater time).
//!
//! Times are `f64`. A C emulator keeping a `float` clock can order two events that fall within
//! `f32` rounding of each other differently.

use crate::{Entity, Packet};
use std::{cmp::Ordering, collections::BTreeMap};
use tracing::trace;

/// What happens when an [Event] is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The timer of the addressed entity expired.
    TimerFired,
    /// The application layer handed a message to the addressed entity.
    FromApplication,
    /// A packet (owned by the event until dispatch) arrived from the medium.
    FromMedium(Packet),
}

impl Kind {
    /// Numeric identifier used in traces (`timer = 0`, `application = 1`, `medium = 2`).
    pub fn code(&self) -> u8 {
        match self {
            Self::TimerFired => 0,
            Self::FromApplication => 1,
            Self::FromMedium(_) => 2,
        }
    }

    /// Human-readable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TimerFired => "timer",
            Self::FromApplication => "application",
            Self::FromMedium(_) => "medium",
        }
    }

    /// Returns `true` if this is a timer expiration.
    pub fn is_timer(&self) -> bool {
        matches!(self, Self::TimerFired)
    }

    /// Returns `true` if this is a packet arriving from the medium.
    pub fn is_medium(&self) -> bool {
        matches!(self, Self::FromMedium(_))
    }
}

/// Something that happens to an entity at a point in simulated time.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f64,
    pub kind: Kind,
    pub entity: Entity,
}

impl Event {
    pub fn new(time: f64, kind: Kind, entity: Entity) -> Self {
        Self { time, kind, entity }
    }
}

#[derive(Clone, Copy, Debug)]
struct Key {
    time: f64,
    sequence: u64,
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

/// Pending events, ordered by time (ties broken by insertion order).
#[derive(Debug, Default)]
pub struct Queue {
    events: BTreeMap<Key, Event>,
    sequence: u64,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, keeping the queue ordered.
    pub fn insert(&mut self, event: Event) {
        trace!(
            time = event.time,
            kind = event.kind.name(),
            entity = %event.entity,
            pending = self.events.len(),
            "inserting event"
        );
        let key = Key {
            time: event.time,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.events.insert(key, event);
    }

    /// Remove and return the earliest event (if any).
    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_first().map(|(_, event)| event)
    }

    /// Return the earliest event without removing it.
    pub fn peek(&self) -> Option<&Event> {
        self.events.first_key_value().map(|(_, event)| event)
    }

    /// Remove the earliest event matching `predicate`.
    ///
    /// At most one event is removed. Returns `None` if no event matches.
    pub fn remove_first<F>(&mut self, mut predicate: F) -> Option<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let key = self
            .events
            .iter()
            .find(|(_, event)| predicate(event))
            .map(|(key, _)| *key)?;
        self.events.remove(&key)
    }

    /// Returns `true` if any pending event matches `predicate`.
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&Event) -> bool,
    {
        self.events.values().any(predicate)
    }

    /// Iterate over pending events from earliest to latest.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
