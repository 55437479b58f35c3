//! Sliding window with cumulative acknowledgements.
//!
//! The [Sender] buffers up to [BUFFER] packets and keeps up to [WINDOW] of them in flight. The
//! [Receiver] only accepts the next expected sequence number: it acknowledges it (ACK `n`) or,
//! for anything else, asks for it again with a negative acknowledgement encoded as a negative
//! `acknum` (NAK `-n`). The [Sender] treats ACK `n` as acknowledging every buffered packet up to
//! `n` and NAK `-n` as acknowledging every packet before `n`. A timeout, like a NAK, resends the
//! whole window.
//!
//! The retransmission timer backs off with the number of packets just sent: `TIMEOUT + sent *
//! TIMEOUT / 3`. It is running whenever the buffer is not empty.

use crate::{ack, data, is_corrupted, is_sender, printable};
use rdtsim_simulator::{Context, Entity, Message, Packet, Participant};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Maximum number of packets in flight.
pub const WINDOW: usize = 8;

/// Maximum number of packets buffered by the sender (in flight or waiting for the window).
pub const BUFFER: usize = 25;

/// Base time to wait for an acknowledgement before resending the window.
pub const TIMEOUT: f64 = 50.0;

/// Sequence number of the first packet.
pub const FIRST_SEQNUM: i32 = 1;

fn backoff(sent: usize) -> f64 {
    TIMEOUT + sent as f64 * TIMEOUT / 3.0
}

#[derive(Debug)]
struct Slot {
    packet: Packet,
    sent: bool,
}

/// Sending side of Go-Back-N.
#[derive(Debug)]
pub struct Sender {
    buffer: VecDeque<Slot>,
    next_seqnum: i32,

    accepted: u64,
    dropped: u64,
    resent: u64,
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            buffer: VecDeque::with_capacity(BUFFER),
            next_seqnum: FIRST_SEQNUM,
            accepted: 0,
            dropped: 0,
            resent: 0,
        }
    }
}

impl Sender {
    /// Sequence number assigned to the next accepted message.
    pub fn next_seqnum(&self) -> i32 {
        self.next_seqnum
    }

    /// Sequence numbers of buffered (unacknowledged) packets, oldest first.
    pub fn buffered(&self) -> Vec<i32> {
        self.buffer.iter().map(|slot| slot.packet.seqnum).collect()
    }

    /// Number of buffered packets that have been sent at least once.
    pub fn in_flight(&self) -> usize {
        self.buffer.iter().filter(|slot| slot.sent).count()
    }

    /// Messages accepted from the application layer.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Messages dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Packets sent again after a timeout or negative acknowledgement.
    pub fn resent(&self) -> u64 {
        self.resent
    }

    /// Drop every buffered packet up to and including `seqnum` (if buffered).
    fn slide(&mut self, seqnum: i32) {
        let Some(index) = self
            .buffer
            .iter()
            .position(|slot| slot.packet.seqnum == seqnum)
        else {
            debug!(seqnum, "packet not buffered, not sliding");
            return;
        };
        self.buffer.drain(..=index);
        debug!(
            seqnum,
            removed = index + 1,
            buffered = self.buffer.len(),
            "slid window"
        );
    }

    /// Send every packet in the window (again, if already sent) and restart the timer.
    fn send_window(&mut self, ctx: &mut Context, entity: Entity) {
        let mut sent = 0;
        for slot in self.buffer.iter_mut().take(WINDOW) {
            if slot.sent {
                self.resent += 1;
            }
            debug!(
                seqnum = slot.packet.seqnum,
                payload = printable(&slot.packet.payload),
                "sending packet"
            );
            slot.sent = true;
            ctx.send(entity, slot.packet);
            sent += 1;
        }
        if sent > 0 {
            Self::restart_timer(ctx, entity, sent);
        }
    }

    /// Send the packets in the window that have not been sent yet.
    ///
    /// Returns the number of packets sent.
    fn send_unsent(&mut self, ctx: &mut Context, entity: Entity) -> usize {
        let mut sent = 0;
        for slot in self.buffer.iter_mut().take(WINDOW) {
            if slot.sent {
                continue;
            }
            debug!(
                seqnum = slot.packet.seqnum,
                payload = printable(&slot.packet.payload),
                "sending packet"
            );
            slot.sent = true;
            ctx.send(entity, slot.packet);
            sent += 1;
        }
        sent
    }

    fn restart_timer(ctx: &mut Context, entity: Entity, sent: usize) {
        if ctx.timer_pending(entity) {
            ctx.stop_timer(entity);
        }
        ctx.start_timer(entity, backoff(sent));
    }
}

impl Participant for Sender {
    fn on_application_message(&mut self, ctx: &mut Context, entity: Entity, message: Message) {
        if !is_sender(entity) {
            warn!(%entity, "only A sends data, dropping message");
            return;
        }
        if self.buffer.len() >= BUFFER {
            self.dropped += 1;
            debug!(payload = printable(&message), "buffer full, dropping message");
            return;
        }

        let packet = data(self.next_seqnum, message);
        self.next_seqnum += 1;
        self.accepted += 1;
        debug!(
            seqnum = packet.seqnum,
            payload = printable(&message),
            buffered = self.buffer.len() + 1,
            "buffering packet"
        );
        self.buffer.push_back(Slot {
            packet,
            sent: false,
        });

        // Send immediately if the packet falls inside the window
        if self.send_unsent(ctx, entity) > 0 && !ctx.timer_pending(entity) {
            ctx.start_timer(entity, TIMEOUT);
        }
    }

    fn on_medium_arrival(&mut self, ctx: &mut Context, entity: Entity, packet: Packet) {
        if is_corrupted(&packet) {
            debug!(acknum = packet.acknum, "discarding corrupted ack");
            return;
        }

        if packet.acknum < 0 {
            let requested = -packet.acknum;
            debug!(requested, "received nak, resending window");
            self.slide(requested - 1);
            self.send_window(ctx, entity);
            return;
        }

        debug!(acknum = packet.acknum, "received ack");
        self.slide(packet.acknum);
        let sent = self.send_unsent(ctx, entity);
        if ctx.timer_pending(entity) {
            ctx.stop_timer(entity);
        }
        if !self.buffer.is_empty() {
            ctx.start_timer(entity, backoff(sent));
        }
    }

    fn on_timer_fired(&mut self, ctx: &mut Context, entity: Entity) {
        debug!(buffered = self.buffer.len(), "timeout, resending window");
        self.send_window(ctx, entity);
    }
}

/// Receiving side of Go-Back-N.
#[derive(Debug)]
pub struct Receiver {
    expected: i32,
    delivered: u64,
}

impl Default for Receiver {
    fn default() -> Self {
        Self {
            expected: FIRST_SEQNUM,
            delivered: 0,
        }
    }
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
        if is_corrupted(&packet) {
            debug!(expected = self.expected, "corrupted packet, sending nak");
            ctx.send(entity, ack(-self.expected));
            return;
        }
        if packet.seqnum != self.expected {
            debug!(
                seqnum = packet.seqnum,
                expected = self.expected,
                "out of order packet, sending nak"
            );
            ctx.send(entity, ack(-self.expected));
            return;
        }

        debug!(
            seqnum = packet.seqnum,
            payload = printable(&packet.payload),
            "received packet, sending ack"
        );
        ctx.deliver(entity, &packet.payload);
        self.delivered += 1;
        ctx.send(entity, ack(packet.seqnum));
        self.expected += 1;
    }

    fn on_timer_fired(&mut self, _: &mut Context, entity: Entity) {
        warn!(%entity, "receiver does not use a timer");
    }
}
