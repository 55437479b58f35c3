//! Stop-and-wait with a one-bit sequence number.
//!
//! The [Sender] transmits one packet at a time and retransmits it every [TIMEOUT] until the
//! [Receiver] acknowledges it. The [Receiver] answers a packet that is corrupted or carries the
//! wrong sequence number by acknowledging the previous sequence number, which the [Sender]
//! ignores (so the retransmission timer recovers from it).

use crate::{ack, data, is_corrupted, is_sender, printable};
use rdtsim_simulator::{Context, Entity, Message, Packet, Participant};
use tracing::{debug, warn};

/// Time to wait for an acknowledgement before retransmitting.
pub const TIMEOUT: f64 = 15.0;

fn flip(bit: i32) -> i32 {
    1 - bit
}

/// Sending side of the alternating-bit protocol.
#[derive(Debug, Default)]
pub struct Sender {
    seqnum: i32,
    last: Option<Packet>,

    accepted: u64,
    dropped: u64,
    retransmitted: u64,
}

impl Sender {
    /// Sequence number of the next (or currently outstanding) packet.
    pub fn seqnum(&self) -> i32 {
        self.seqnum
    }

    /// Returns `true` if a packet is waiting for its acknowledgement.
    pub fn waiting(&self) -> bool {
        self.last.is_some()
    }

    /// Messages accepted from the application layer.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Messages dropped because a packet was still outstanding.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Packets retransmitted after a timeout.
    pub fn retransmitted(&self) -> u64 {
        self.retransmitted
    }
}

impl Participant for Sender {
    fn on_application_message(&mut self, ctx: &mut Context, entity: Entity, message: Message) {
        if !is_sender(entity) {
            warn!(%entity, "only A sends data, dropping message");
            return;
        }
        if self.waiting() {
            self.dropped += 1;
            debug!(
                seqnum = self.seqnum,
                payload = printable(&message),
                "waiting for ack, dropping message"
            );
            return;
        }

        let packet = data(self.seqnum, message);
        debug!(
            seqnum = packet.seqnum,
            payload = printable(&message),
            "sending packet"
        );
        self.last = Some(packet);
        self.accepted += 1;
        ctx.send(entity, packet);
        ctx.start_timer(entity, TIMEOUT);
    }

    fn on_medium_arrival(&mut self, ctx: &mut Context, entity: Entity, packet: Packet) {
        if packet.acknum != self.seqnum {
            debug!(
                acknum = packet.acknum,
                expected = self.seqnum,
                "discarding unexpected ack"
            );
            return;
        }
        if is_corrupted(&packet) {
            debug!(acknum = packet.acknum, "discarding corrupted ack");
            return;
        }
        if self.last.take().is_none() {
            warn!(acknum = packet.acknum, "received ack while not waiting");
            return;
        }

        debug!(acknum = packet.acknum, "received ack");
        ctx.stop_timer(entity);
        self.seqnum = flip(self.seqnum);
    }

    fn on_timer_fired(&mut self, ctx: &mut Context, entity: Entity) {
        let Some(last) = self.last else {
            warn!(seqnum = self.seqnum, "timer fired while not waiting for ack");
            return;
        };
        debug!(
            seqnum = last.seqnum,
            payload = printable(&last.payload),
            "timeout, retransmitting"
        );
        self.retransmitted += 1;
        ctx.send(entity, last);
        ctx.start_timer(entity, TIMEOUT);
    }
}

/// Receiving side of the alternating-bit protocol.
#[derive(Debug, Default)]
pub struct Receiver {
    expected: i32,
    delivered: u64,
}

impl Receiver {
    /// Sequence number of the next packet to deliver.
    pub fn expected(&self) -> i32 {
        self.expected
    }

    /// Messages delivered to the application layer.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Participant for Receiver {
    fn on_application_message(&mut self, _: &mut Context, entity: Entity, message: Message) {
        warn!(
            %entity,
            payload = printable(&message),
            "bidirectional transfer not supported, dropping message"
        );
    }

    fn on_medium_arrival(&mut self, ctx: &mut Context, entity: Entity, packet: Packet) {
        if packet.seqnum != self.expected {
            debug!(
                seqnum = packet.seqnum,
                expected = self.expected,
                "out of order packet, sending nak"
            );
            ctx.send(entity, ack(flip(self.expected)));
            return;
        }
        if is_corrupted(&packet) {
            debug!(seqnum = packet.seqnum, "corrupted packet, sending nak");
            ctx.send(entity, ack(flip(self.expected)));
            return;
        }

        debug!(
            seqnum = packet.seqnum,
            payload = printable(&packet.payload),
            "received packet, sending ack"
        );
        ctx.send(entity, ack(self.expected));
        ctx.deliver(entity, &packet.payload);
        self.delivered += 1;
        self.expected = flip(self.expected);
    }

    fn on_timer_fired(&mut self, _: &mut Context, entity: Entity) {
        warn!(%entity, "receiver does not use a timer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::registry::Registry;
    use rdtsim_macros::test_traced;
    use rdtsim_simulator::{message, Config, Kind, Simulation};

    fn run(cfg: Config) -> Simulation<Sender, Receiver> {
        let mut simulation =
            Simulation::new(cfg, Sender::default(), Receiver::default()).unwrap();
        simulation.run().unwrap();
        simulation
    }

    fn context() -> Context {
        Context::new(&Config::default(), &mut Registry::default()).unwrap()
    }

    /// Packets in flight to `entity`.
    fn in_flight(ctx: &Context, entity: Entity) -> Vec<Packet> {
        ctx.queue()
            .iter()
            .filter(|event| event.entity == entity)
            .filter_map(|event| match event.kind {
                Kind::FromMedium(packet) => Some(packet),
                _ => None,
            })
            .collect()
    }

    #[test_traced]
    fn test_lossless() {
        // Messages far apart never find the sender waiting
        let cfg = Config {
            messages: 20,
            mean_interval: 100_000.0,
            ..Config::default()
        };
        let simulation = run(cfg);
        let sender = simulation.sender();
        assert_eq!(sender.accepted(), 20);
        assert_eq!(sender.dropped(), 0);
        assert!(!sender.waiting());
        assert_eq!(sender.seqnum(), 0);

        let expected: Vec<_> = (0..20).map(|index| (Entity::B, message(index))).collect();
        assert_eq!(simulation.context().network().deliveries(), expected.as_slice());
        assert_eq!(simulation.receiver().delivered(), 20);

        // At least one data packet and one ack per message
        assert!(simulation.report().sent >= 40);
    }

    #[test_traced]
    fn test_drops_while_waiting() {
        let cfg = Config {
            messages: 20,
            mean_interval: 2.0,
            ..Config::default()
        };
        let simulation = run(cfg);
        let sender = simulation.sender();
        assert!(sender.dropped() > 0);
        assert_eq!(sender.accepted() + sender.dropped(), 20);
        assert_eq!(simulation.receiver().delivered(), sender.accepted());
    }

    #[test_traced]
    fn test_recovers_from_loss_and_corruption() {
        let cfg = Config {
            messages: 20,
            loss_probability: 0.2,
            corruption_probability: 0.2,
            ..Config::default()
        };
        let simulation = run(cfg);
        let sender = simulation.sender();
        assert!(sender.retransmitted() > 0);
        assert!(!sender.waiting());

        // Every accepted message is delivered once, in order
        let deliveries = simulation.context().network().deliveries();
        assert_eq!(deliveries.len() as u64, sender.accepted());
        for window in deliveries.windows(2) {
            assert!(window[0].1[0] < window[1].1[0]);
        }
    }

    #[test_traced]
    fn test_sender_ignores_bad_acks() {
        let mut ctx = context();
        let mut sender = Sender::default();

        sender.on_application_message(&mut ctx, Entity::A, message(0));
        assert!(sender.waiting());
        assert!(ctx.timer_pending(Entity::A));
        assert_eq!(in_flight(&ctx, Entity::B), vec![data(0, message(0))]);

        // A second message is dropped while waiting
        sender.on_application_message(&mut ctx, Entity::A, message(1));
        assert_eq!(sender.dropped(), 1);
        assert_eq!(in_flight(&ctx, Entity::B).len(), 1);

        // Ack for the other sequence number
        sender.on_medium_arrival(&mut ctx, Entity::A, ack(1));
        assert!(sender.waiting());

        // Corrupted ack
        let mut corrupted = ack(0);
        corrupted.payload[0] = b'Z';
        sender.on_medium_arrival(&mut ctx, Entity::A, corrupted);
        assert!(sender.waiting());
        assert!(ctx.timer_pending(Entity::A));

        // Valid ack
        sender.on_medium_arrival(&mut ctx, Entity::A, ack(0));
        assert!(!sender.waiting());
        assert_eq!(sender.seqnum(), 1);
        assert!(!ctx.timer_pending(Entity::A));

        // Duplicate ack is ignored
        sender.on_medium_arrival(&mut ctx, Entity::A, ack(0));
        assert_eq!(sender.seqnum(), 1);
    }

    #[test_traced]
    fn test_sender_retransmits_on_timeout() {
        let mut ctx = context();
        let mut sender = Sender::default();

        // Nothing outstanding
        sender.on_timer_fired(&mut ctx, Entity::A);
        assert_eq!(sender.retransmitted(), 0);

        sender.on_application_message(&mut ctx, Entity::A, message(0));
        ctx.stop_timer(Entity::A);
        sender.on_timer_fired(&mut ctx, Entity::A);
        assert_eq!(sender.retransmitted(), 1);
        assert!(ctx.timer_pending(Entity::A));
        assert_eq!(
            in_flight(&ctx, Entity::B),
            vec![data(0, message(0)), data(0, message(0))]
        );
    }

    #[test]
    fn test_receiver_acks_and_naks() {
        let mut ctx = context();
        let mut receiver = Receiver::default();

        // Wrong sequence number: ack the previous one
        receiver.on_medium_arrival(&mut ctx, Entity::B, data(1, message(0)));
        assert_eq!(receiver.delivered(), 0);

        // Corrupted
        let mut corrupted = data(0, message(0));
        corrupted.payload[0] = b'Z';
        receiver.on_medium_arrival(&mut ctx, Entity::B, corrupted);
        assert_eq!(receiver.delivered(), 0);

        // Valid
        receiver.on_medium_arrival(&mut ctx, Entity::B, data(0, message(0)));
        assert_eq!(receiver.delivered(), 1);
        assert_eq!(receiver.expected(), 1);

        // Retransmission of a delivered packet is not delivered again
        receiver.on_medium_arrival(&mut ctx, Entity::B, data(0, message(0)));
        assert_eq!(receiver.delivered(), 1);

        let acks: Vec<i32> = in_flight(&ctx, Entity::A)
            .iter()
            .map(|packet| packet.acknum)
            .collect();
        assert_eq!(acks, vec![1, 1, 0, 0]);
        assert_eq!(ctx.network().deliveries(), &[(Entity::B, message(0))]);
    }

    #[test]
    fn test_flip() {
        assert_eq!(flip(0), 1);
        assert_eq!(flip(1), 0);
    }
}
