//! Deliver messages reliably over a lossy link with automatic repeat request.
//!
//! This crate provides two classic automatic-repeat-request (ARQ) protocols as
//! [rdtsim_simulator::Participant]s. In both, [Entity::A] (the sender) transmits data packets
//! and [Entity::B] (the receiver) answers with acknowledgements:
//!
//! * [alternating_bit]: stop-and-wait with a one-bit sequence number. At most one packet is
//!   outstanding and new messages are dropped while it is.
//! * [go_back_n]: up to a window of packets is outstanding. The receiver only accepts the next
//!   expected packet and a timeout (or negative acknowledgement) resends the whole window.
//!
//! Packets carry an additive [checksum] over every field. Any modification made by the
//! simulated medium changes the sum, so corrupted packets are always detected.
//!
//! # Example
//!
//! ```rust
//! use rdtsim_arq::alternating_bit::{Receiver, Sender};
//! use rdtsim_simulator::{Config, Simulation};
//!
//! let cfg = Config {
//!     messages: 10,
//!     loss_probability: 0.1,
//!     corruption_probability: 0.1,
//!     ..Config::default()
//! };
//! let mut simulation = Simulation::new(cfg, Sender::default(), Receiver::default()).unwrap();
//! let report = simulation.run().unwrap();
//! assert_eq!(report.delivered, simulation.sender().accepted());
//! ```

use rdtsim_simulator::{Entity, Message, Packet, PAYLOAD_SIZE};

pub mod alternating_bit;
pub mod go_back_n;

/// Compute the checksum of `packet` (ignoring its `checksum` field).
///
/// The sum of the sequence number, the acknowledgement number, and every payload byte
/// (interpreted as signed).
pub fn checksum(packet: &Packet) -> i32 {
    packet
        .payload
        .iter()
        .fold(packet.seqnum.wrapping_add(packet.acknum), |sum, byte| {
            sum.wrapping_add(*byte as i8 as i32)
        })
}

/// Returns `true` if the checksum carried by `packet` does not match its contents.
pub fn is_corrupted(packet: &Packet) -> bool {
    checksum(packet) != packet.checksum
}

/// Build a data packet carrying `payload`.
pub fn data(seqnum: i32, payload: Message) -> Packet {
    seal(Packet {
        seqnum,
        acknum: 0,
        checksum: 0,
        payload,
    })
}

/// Build an acknowledgement packet (no payload).
pub fn ack(acknum: i32) -> Packet {
    seal(Packet {
        seqnum: 0,
        acknum,
        checksum: 0,
        payload: [0; PAYLOAD_SIZE],
    })
}

fn seal(mut packet: Packet) -> Packet {
    packet.checksum = checksum(&packet);
    packet
}

/// Render a payload for logs.
fn printable(payload: &Message) -> String {
    String::from_utf8_lossy(payload)
        .trim_end_matches('\0')
        .to_string()
}

/// Returns `true` if `entity` is the side that sends data.
fn is_sender(entity: Entity) -> bool {
    entity == Entity::A
}
