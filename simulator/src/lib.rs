//! Simulate an unreliable point-to-point link with a deterministic event queue.
//!
//! This crate provides the discrete-event engine used to exercise reliable-data-transfer
//! protocols (stop-and-wait, Go-Back-N, ...). Two entities, [Entity::A] (the sender) and
//! [Entity::B] (the receiver), exchange [Packet]s over a medium that may lose, corrupt, and
//! delay them (but never reorder packets addressed to the same entity). Protocol logic is
//! plugged in through the [Participant] trait and interacts with the engine exclusively through
//! the [Context] it is handed on every callback.
//!
//! Given the same [Config] (including its seed), a simulation dispatches the exact same sequence
//! of events every run. The [Auditor] summarizes this sequence as a digest that can be compared
//! across runs.
//!
//! # Terminology
//!
//! * `Event`: something that happens at a point in simulated time (an application message is
//!   handed to an entity, a packet arrives from the medium, or a timer fires).
//! * `Queue`: the time-ordered list of pending events.
//! * `Network`: the lossy medium between the two entities.
//! * `Timers`: at most one outstanding timer per entity, stored as events in the queue.
//! * `Simulation`: owns the clock, queue, and participants and drives them until the queue drains.
//!
//! # Example
//!
//! ```rust
//! use rdtsim_simulator::{Config, Context, Entity, Message, Packet, Participant, Simulation};
//!
//! struct Sender;
//!
//! impl Participant for Sender {
//!     fn on_application_message(&mut self, ctx: &mut Context, entity: Entity, message: Message) {
//!         let packet = Packet { payload: message, ..Packet::default() };
//!         ctx.send(entity, packet);
//!     }
//!     fn on_medium_arrival(&mut self, _: &mut Context, _: Entity, _: Packet) {}
//!     fn on_timer_fired(&mut self, _: &mut Context, _: Entity) {}
//! }
//!
//! struct Receiver;
//!
//! impl Participant for Receiver {
//!     fn on_application_message(&mut self, _: &mut Context, _: Entity, _: Message) {}
//!     fn on_medium_arrival(&mut self, ctx: &mut Context, entity: Entity, packet: Packet) {
//!         ctx.deliver(entity, &packet.payload);
//!     }
//!     fn on_timer_fired(&mut self, _: &mut Context, _: Entity) {}
//! }
//!
//! let cfg = Config { messages: 5, ..Config::default() };
//! let mut simulation = Simulation::new(cfg, Sender, Receiver).unwrap();
//! let report = simulation.run().unwrap();
//! assert_eq!(report.generated, 5);
//! assert_eq!(report.delivered, 5);
//! ```

use std::fmt;
use thiserror::Error;

mod auditor;
pub use auditor::Auditor;
mod context;
pub use context::Context;
mod driver;
pub use driver::{message, Config, Report, Simulation, Status};
pub mod network;
pub use network::{Corruption, Network, Transmission};
mod participant;
pub use participant::Participant;
pub mod queue;
pub use queue::{Event, Kind, Queue};
pub mod random;
pub use random::{Glibc, Uniform};
pub mod timer;
pub use timer::Timers;

/// Prefix for simulator metrics.
const METRICS_PREFIX: &str = "simulator";

/// Size (in bytes) of the payload carried by every message and packet.
pub const PAYLOAD_SIZE: usize = 20;

/// Data handed to an entity by the application layer (and delivered back to it).
pub type Message = [u8; PAYLOAD_SIZE];

/// Errors that can occur when configuring or running a simulation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {0} probability (must be in [0, 1]): {1}")]
    InvalidProbability(&'static str, f64),
    #[error("invalid mean interval (must be > 0): {0}")]
    InvalidInterval(f64),
    #[error("random source failed calibration (mean of samples {0} outside [0.25, 0.75])")]
    Calibration(f64),
    #[error("deadline exceeded: next event at {0}")]
    DeadlineExceeded(f64),
}

/// One of the two endpoints attached to the medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    /// Sending side.
    A,
    /// Receiving side.
    B,
}

impl Entity {
    /// Returns the entity at the other end of the medium.
    pub fn peer(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Numeric identifier used in traces (`A = 0`, `B = 1`).
    pub fn code(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Unit of data carried by the medium.
///
/// `Packet` is `Copy`: every handoff (to the medium, from the medium) moves an independent
/// value, so no participant can observe or mutate a copy held by the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Packet {
    pub seqnum: i32,
    pub acknum: i32,
    pub checksum: i32,
    pub payload: Message,
}

/// Converts bytes to a hexadecimal string.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut hex = String::new();
    for byte in bytes.iter() {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}
