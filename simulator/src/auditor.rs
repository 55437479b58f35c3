use crate::{hex, queue::Event, Kind};
use sha2::{Digest, Sha256};

/// Track the sequence of events dispatched by a simulation.
///
/// Every dispatched event is folded into a running SHA-256 digest. Two runs with the same
/// configuration produce the same [Auditor::state], so comparing states is a cheap way to
/// check that logic running on top of the simulator behaves deterministically.
#[derive(Clone, Debug, Default)]
pub struct Auditor {
    hash: Vec<u8>,
    events: u64,
}

impl Auditor {
    pub(crate) fn dispatch(&mut self, event: &Event) {
        let mut hasher = Sha256::new();
        hasher.update(&self.hash);
        hasher.update(b"dispatch");
        hasher.update(event.time.to_bits().to_be_bytes());
        hasher.update([event.kind.code(), event.entity.code()]);
        if let Kind::FromMedium(packet) = &event.kind {
            hasher.update(packet.seqnum.to_be_bytes());
            hasher.update(packet.acknum.to_be_bytes());
            hasher.update(packet.checksum.to_be_bytes());
            hasher.update(packet.payload);
        }
        self.hash = hasher.finalize().to_vec();
        self.events += 1;
    }

    pub(crate) fn terminate(&mut self, now: f64) {
        let mut hasher = Sha256::new();
        hasher.update(&self.hash);
        hasher.update(b"terminate");
        hasher.update(now.to_bits().to_be_bytes());
        self.hash = hasher.finalize().to_vec();
    }

    /// Number of events folded into the digest.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Generate a representation of the events dispatched so far.
    pub fn state(&self) -> String {
        hex(&self.hash)
    }
}
