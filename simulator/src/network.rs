//! Lossy, corrupting, non-reordering medium between the two entities.
//!
//! When a packet is handed to the medium it is:
//! 1. Dropped with probability `loss`.
//! 2. Copied (the queued copy is independent of the caller's).
//! 3. Scheduled to arrive at the peer between 1 and 10 time units after the later of the current
//!    time and the last arrival already scheduled for that peer (so the medium never reorders).
//! 4. Corrupted with probability `corruption` (payload 75% of the time, sequence number 12.5%,
//!    acknowledgement number 12.5%).
//!
//! Randomness is drawn in exactly this order (loss, delay, corruption, corruption target).

use crate::{
    queue::{Event, Kind, Queue},
    random::Uniform,
    Entity, Error, Message, Packet,
};
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use tracing::debug;

/// Byte written to the start of a corrupted payload.
pub const CORRUPT_PAYLOAD: u8 = b'Z';

/// Value written to a corrupted sequence or acknowledgement number.
pub const CORRUPT_FIELD: i32 = 999_999;

/// Minimum transit time of a packet.
pub const MIN_DELAY: f64 = 1.0;

/// Maximum additional (uniformly distributed) transit time of a packet.
pub const DELAY_SPREAD: f64 = 9.0;

/// Share of corruptions that hit the payload.
const PAYLOAD_SHARE: f64 = 0.75;

/// Share of corruptions that hit the payload or the sequence number.
const SEQNUM_SHARE: f64 = 0.875;

/// Field of a packet modified by the medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corruption {
    Payload,
    Seqnum,
    Acknum,
}

/// Outcome of handing a packet to the medium.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Transmission {
    /// The packet was dropped (no arrival was scheduled).
    Lost,
    /// The packet will arrive at the peer at `at`.
    Scheduled {
        at: f64,
        corruption: Option<Corruption>,
    },
}

#[derive(Debug)]
struct Metrics {
    sent: Counter,
    lost: Counter,
    corrupted: Counter,
    delivered: Counter,
}

impl Metrics {
    fn init(registry: &mut Registry) -> Self {
        let metrics = Self {
            sent: Counter::default(),
            lost: Counter::default(),
            corrupted: Counter::default(),
            delivered: Counter::default(),
        };
        registry.register(
            "packets_sent",
            "Number of packets handed to the medium",
            metrics.sent.clone(),
        );
        registry.register(
            "packets_lost",
            "Number of packets dropped by the medium",
            metrics.lost.clone(),
        );
        registry.register(
            "packets_corrupted",
            "Number of packets corrupted by the medium",
            metrics.corrupted.clone(),
        );
        registry.register(
            "messages_delivered",
            "Number of messages delivered to the application layer",
            metrics.delivered.clone(),
        );
        metrics
    }
}

/// Implementation of the simulated medium.
pub struct Network {
    loss: f64,
    corruption: f64,
    metrics: Metrics,
    deliveries: Vec<(Entity, Message)>,
}

impl Network {
    /// Create a new medium with the given loss and corruption probabilities.
    pub fn new(loss: f64, corruption: f64, registry: &mut Registry) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&loss) {
            return Err(Error::InvalidProbability("loss", loss));
        }
        if !(0.0..=1.0).contains(&corruption) {
            return Err(Error::InvalidProbability("corruption", corruption));
        }
        Ok(Self {
            loss,
            corruption,
            metrics: Metrics::init(registry),
            deliveries: Vec::new(),
        })
    }

    /// Hand `packet` (sent by `from`) to the medium at time `now`.
    pub fn send<U: Uniform + ?Sized>(
        &mut self,
        queue: &mut Queue,
        random: &mut U,
        now: f64,
        from: Entity,
        packet: Packet,
    ) -> Transmission {
        self.metrics.sent.inc();
        let to = from.peer();

        // Simulate loss
        if random.uniform() < self.loss {
            self.metrics.lost.inc();
            debug!(
                %from,
                %to,
                seqnum = packet.seqnum,
                acknum = packet.acknum,
                reason = "random link failure",
                "dropping packet"
            );
            return Transmission::Lost;
        }
        let mut copy = packet;

        // Never arrive before a packet already in flight to the same entity
        let last = queue
            .iter()
            .filter(|event| event.entity == to && event.kind.is_medium())
            .fold(now, |last, event| last.max(event.time));
        let at = last + MIN_DELAY + DELAY_SPREAD * random.uniform();

        // Simulate corruption
        let corruption = if random.uniform() < self.corruption {
            self.metrics.corrupted.inc();
            let target = random.uniform();
            let corruption = if target < PAYLOAD_SHARE {
                copy.payload[0] = CORRUPT_PAYLOAD;
                Corruption::Payload
            } else if target < SEQNUM_SHARE {
                copy.seqnum = CORRUPT_FIELD;
                Corruption::Seqnum
            } else {
                copy.acknum = CORRUPT_FIELD;
                Corruption::Acknum
            };
            debug!(%from, %to, ?corruption, "corrupting packet");
            Some(corruption)
        } else {
            None
        };

        debug!(
            %from,
            %to,
            seqnum = copy.seqnum,
            acknum = copy.acknum,
            checksum = copy.checksum,
            now,
            at,
            "scheduling arrival"
        );
        queue.insert(Event::new(at, Kind::FromMedium(copy), to));
        Transmission::Scheduled { at, corruption }
    }

    /// Hand `payload` to the application layer of `entity`.
    ///
    /// Every payload is kept (see [Network::deliveries]), so memory grows with the number of
    /// deliveries over the lifetime of the simulation.
    pub fn deliver(&mut self, entity: Entity, payload: &Message) {
        self.metrics.delivered.inc();
        let text = String::from_utf8_lossy(payload);
        debug!(
            %entity,
            payload = text.trim_end_matches('\0'),
            "delivering to application"
        );
        self.deliveries.push((entity, *payload));
    }

    /// Loss probability.
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Corruption probability.
    pub fn corruption(&self) -> f64 {
        self.corruption
    }

    /// Number of packets handed to the medium (including lost ones).
    pub fn sent(&self) -> u64 {
        self.metrics.sent.get()
    }

    /// Number of packets dropped by the medium.
    pub fn lost(&self) -> u64 {
        self.metrics.lost.get()
    }

    /// Number of packets corrupted by the medium.
    pub fn corrupted(&self) -> u64 {
        self.metrics.corrupted.get()
    }

    /// Number of payloads delivered to the application layer.
    pub fn delivered(&self) -> u64 {
        self.metrics.delivered.get()
    }

    /// Every payload delivered to the application layer, in delivery order.
    ///
    /// Never truncated. Use [Network::delivered] when only the count matters.
    pub fn deliveries(&self) -> &[(Entity, Message)] {
        &self.deliveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{random::Glibc, PAYLOAD_SIZE};
    use rdtsim_macros::test_traced;

    /// Replays a fixed list of samples.
    struct Script(Vec<f64>);

    impl Uniform for Script {
        fn uniform(&mut self) -> f64 {
            self.0.remove(0)
        }
    }

    fn network(loss: f64, corruption: f64) -> Network {
        Network::new(loss, corruption, &mut Registry::default()).unwrap()
    }

    fn packet(seqnum: i32) -> Packet {
        Packet {
            seqnum,
            acknum: 0,
            checksum: 42,
            payload: [b'a'; PAYLOAD_SIZE],
        }
    }

    fn arrivals(queue: &Queue, to: Entity) -> Vec<(f64, Packet)> {
        queue
            .iter()
            .filter_map(|event| match event.kind {
                Kind::FromMedium(packet) if event.entity == to => Some((event.time, packet)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_invalid_probabilities() {
        let mut registry = Registry::default();
        assert!(matches!(
            Network::new(-0.1, 0.0, &mut registry),
            Err(Error::InvalidProbability("loss", _))
        ));
        assert!(matches!(
            Network::new(0.0, 1.5, &mut registry),
            Err(Error::InvalidProbability("corruption", _))
        ));
        assert!(matches!(
            Network::new(f64::NAN, 0.0, &mut registry),
            Err(Error::InvalidProbability("loss", _))
        ));
    }

    #[test_traced]
    fn test_scripted_delivery() {
        let mut network = network(0.5, 0.5);
        let mut queue = Queue::new();

        // Not lost (0.6 >= 0.5), delay 1 + 9 * 0.5, not corrupted (0.9 >= 0.5)
        let mut script = Script(vec![0.6, 0.5, 0.9]);
        let outcome = network.send(&mut queue, &mut script, 10.0, Entity::A, packet(1));
        assert_eq!(
            outcome,
            Transmission::Scheduled {
                at: 15.5,
                corruption: None
            }
        );
        assert!(script.0.is_empty());

        let arrivals = arrivals(&queue, Entity::B);
        assert_eq!(arrivals, vec![(15.5, packet(1))]);
        assert_eq!(network.sent(), 1);
        assert_eq!(network.lost(), 0);
        assert_eq!(network.corrupted(), 0);
    }

    #[test]
    fn test_scripted_loss() {
        let mut network = network(0.5, 0.5);
        let mut queue = Queue::new();

        // Lost draws nothing else
        let mut script = Script(vec![0.1]);
        let outcome = network.send(&mut queue, &mut script, 0.0, Entity::B, packet(1));
        assert_eq!(outcome, Transmission::Lost);
        assert!(queue.is_empty());
        assert_eq!(network.sent(), 1);
        assert_eq!(network.lost(), 1);
    }

    #[test]
    fn test_scripted_corruption_targets() {
        let cases = [
            (0.0, Corruption::Payload),
            (0.74, Corruption::Payload),
            (0.75, Corruption::Seqnum),
            (0.8, Corruption::Seqnum),
            (0.875, Corruption::Acknum),
            (0.99, Corruption::Acknum),
        ];
        for (target, expected) in cases {
            let mut network = network(0.0, 1.0);
            let mut queue = Queue::new();
            let mut script = Script(vec![0.5, 0.0, 0.5, target]);
            let outcome = network.send(&mut queue, &mut script, 0.0, Entity::A, packet(3));
            assert_eq!(
                outcome,
                Transmission::Scheduled {
                    at: 1.0,
                    corruption: Some(expected)
                }
            );

            let (_, arrived) = arrivals(&queue, Entity::B)[0];
            let mut wanted = packet(3);
            match expected {
                Corruption::Payload => wanted.payload[0] = CORRUPT_PAYLOAD,
                Corruption::Seqnum => wanted.seqnum = CORRUPT_FIELD,
                Corruption::Acknum => wanted.acknum = CORRUPT_FIELD,
            }
            assert_eq!(arrived, wanted);
            assert_eq!(network.corrupted(), 1);
        }
    }

    #[test]
    fn test_no_reordering() {
        let mut network = network(0.0, 0.0);
        let mut queue = Queue::new();

        // First packet takes the longest possible delay, second the shortest
        let mut script = Script(vec![0.5, 0.999, 0.5, 0.5, 0.0, 0.5]);
        network.send(&mut queue, &mut script, 0.0, Entity::A, packet(1));
        network.send(&mut queue, &mut script, 0.0, Entity::A, packet(2));

        let arrivals = arrivals(&queue, Entity::B);
        assert_eq!(arrivals.len(), 2);
        assert_eq!(arrivals[0].1.seqnum, 1);
        assert_eq!(arrivals[1].1.seqnum, 2);
        assert!(arrivals[1].0 >= arrivals[0].0 + MIN_DELAY);
    }

    #[test]
    fn test_reordering_is_per_destination() {
        let mut network = network(0.0, 0.0);
        let mut queue = Queue::new();

        // A long flight to B does not delay a packet to A
        let mut script = Script(vec![0.5, 0.999, 0.5, 0.5, 0.0, 0.5]);
        network.send(&mut queue, &mut script, 0.0, Entity::A, packet(1));
        network.send(&mut queue, &mut script, 0.0, Entity::B, packet(2));

        let to_b = arrivals(&queue, Entity::B);
        let to_a = arrivals(&queue, Entity::A);
        assert_eq!(to_a, vec![(1.0, packet(2))]);
        assert!(to_b[0].0 > 9.0);
    }

    #[test]
    fn test_no_reordering_random() {
        let mut network = network(0.0, 0.0);
        let mut queue = Queue::new();
        let mut random = Glibc::default();
        for seqnum in 0..1_000 {
            network.send(&mut queue, &mut random, 0.0, Entity::A, packet(seqnum));
        }

        let arrivals = arrivals(&queue, Entity::B);
        assert_eq!(arrivals.len(), 1_000);
        for (expected, window) in arrivals.windows(2).enumerate() {
            assert_eq!(window[0].1.seqnum, expected as i32);
            assert!(window[1].0 >= window[0].0);
        }
    }

    #[test]
    fn test_lossless_uncorrupted() {
        let mut network = network(0.0, 0.0);
        let mut queue = Queue::new();
        let mut random = Glibc::default();
        for seqnum in 0..500 {
            let sent = packet(seqnum);
            assert!(matches!(
                network.send(&mut queue, &mut random, 0.0, Entity::A, sent),
                Transmission::Scheduled {
                    corruption: None,
                    ..
                }
            ));
        }
        let arrivals = arrivals(&queue, Entity::B);
        assert_eq!(arrivals.len(), 500);
        for (seqnum, (_, arrived)) in arrivals.iter().enumerate() {
            assert_eq!(*arrived, packet(seqnum as i32));
        }
        assert_eq!(network.lost(), 0);
        assert_eq!(network.corrupted(), 0);
    }

    #[test]
    fn test_total_loss() {
        let mut network = network(1.0, 0.0);
        let mut queue = Queue::new();
        let mut random = Glibc::default();
        for seqnum in 0..500 {
            assert_eq!(
                network.send(&mut queue, &mut random, 0.0, Entity::A, packet(seqnum)),
                Transmission::Lost
            );
        }
        assert!(queue.is_empty());
        assert_eq!(network.sent(), 500);
        assert_eq!(network.lost(), 500);
    }

    #[test]
    fn test_deliver() {
        let mut network = network(0.0, 0.0);
        let payload = [b'q'; PAYLOAD_SIZE];
        network.deliver(Entity::B, &payload);
        network.deliver(Entity::A, &payload);
        assert_eq!(payload, [b'q'; PAYLOAD_SIZE]);
        assert_eq!(
            network.deliveries(),
            &[(Entity::B, payload), (Entity::A, payload)]
        );
        assert_eq!(network.delivered(), 2);
    }
}
