//! Drive a pair of participants over the simulated medium until no events remain.

use crate::{
    queue::{Event, Kind},
    Auditor, Context, Entity, Error, Message, Participant, METRICS_PREFIX, PAYLOAD_SIZE,
};
use prometheus_client::{encoding::text::encode, metrics::counter::Counter, registry::Registry};
use std::fmt;
use tracing::{debug, info, trace};

/// Configuration for a [Simulation].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of messages the application layer hands to the entities.
    pub messages: u64,

    /// Probability that the medium drops a packet.
    pub loss_probability: f64,

    /// Probability that the medium corrupts a (not dropped) packet.
    pub corruption_probability: f64,

    /// Mean time between two application messages.
    pub mean_interval: f64,

    /// Seed for the random source.
    pub seed: u32,

    /// If set, application messages are addressed to either entity (otherwise only to A).
    pub bidirectional: bool,

    /// If the next event lies beyond this time, stop with [Error::DeadlineExceeded].
    pub deadline: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            messages: 10,
            loss_probability: 0.0,
            corruption_probability: 0.0,
            mean_interval: 1000.0,
            seed: crate::random::DEFAULT_SEED,
            bidirectional: false,
            deadline: None,
        }
    }
}

impl Config {
    /// Ensure every parameter is in range.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(Error::InvalidProbability("loss", self.loss_probability));
        }
        if !(0.0..=1.0).contains(&self.corruption_probability) {
            return Err(Error::InvalidProbability(
                "corruption",
                self.corruption_probability,
            ));
        }
        if !self.mean_interval.is_finite() || self.mean_interval <= 0.0 {
            return Err(Error::InvalidInterval(self.mean_interval));
        }
        Ok(())
    }
}

/// Lifecycle of a [Simulation].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Created but no event has been scheduled yet.
    Uninitialized,
    /// Dispatching events.
    Running,
    /// The queue drained (irreversible).
    Terminated,
}

/// Summary of a simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// Simulated time of the last dispatched event.
    pub time: f64,
    /// Messages handed to the entities by the application layer.
    pub generated: u64,
    /// Messages delivered to the application layer by the entities.
    pub delivered: u64,
    /// Packets handed to the medium.
    pub sent: u64,
    /// Packets dropped by the medium.
    pub lost: u64,
    /// Packets corrupted by the medium.
    pub corrupted: u64,
    /// Events dispatched.
    pub dispatched: u64,
    /// Digest of every dispatched event (see [Auditor::state]).
    pub digest: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "simulation terminated at time {:.6}", self.time)?;
        writeln!(f, "  messages generated: {}", self.generated)?;
        writeln!(f, "  messages delivered: {}", self.delivered)?;
        writeln!(f, "  packets sent: {}", self.sent)?;
        writeln!(f, "  packets lost: {}", self.lost)?;
        writeln!(f, "  packets corrupted: {}", self.corrupted)?;
        writeln!(f, "  events dispatched: {}", self.dispatched)?;
        write!(f, "  digest: {}", self.digest)
    }
}

/// Build the `index`-th message handed down by the application layer.
///
/// Messages cycle through the alphabet (`aaa...`, `bbb...`, ...) and end with a zero byte.
pub fn message(index: u64) -> Message {
    let mut message = [b'a' + (index % 26) as u8; PAYLOAD_SIZE];
    message[PAYLOAD_SIZE - 1] = 0;
    message
}

/// A single run of two participants over the simulated medium.
///
/// `sender` handles every event addressed to [Entity::A] and `receiver` every event addressed
/// to [Entity::B].
pub struct Simulation<S: Participant, R: Participant> {
    cfg: Config,
    registry: Registry,
    context: Context,
    sender: S,
    receiver: R,

    status: Status,
    generated: Counter,
    dispatched: Counter,
    auditor: Auditor,
}

impl<S: Participant, R: Participant> Simulation<S, R> {
    /// Create a new simulation.
    ///
    /// Fails if `cfg` is invalid or the random source fails calibration.
    pub fn new(cfg: Config, sender: S, receiver: R) -> Result<Self, Error> {
        let mut registry = Registry::default();
        let sub = registry.sub_registry_with_prefix(METRICS_PREFIX);
        let context = Context::new(&cfg, sub)?;
        let generated = Counter::default();
        let dispatched = Counter::default();
        sub.register(
            "messages_generated",
            "Number of messages handed down by the application layer",
            generated.clone(),
        );
        sub.register(
            "events_dispatched",
            "Number of events dispatched",
            dispatched.clone(),
        );
        Ok(Self {
            cfg,
            registry,
            context,
            sender,
            receiver,
            status: Status::Uninitialized,
            generated,
            dispatched,
            auditor: Auditor::default(),
        })
    }

    /// Dispatch the next event.
    ///
    /// The first call schedules the first application message. Returns `None` once no events
    /// remain (and on every call after that).
    pub fn step(&mut self) -> Result<Option<Event>, Error> {
        match self.status {
            Status::Terminated => return Ok(None),
            Status::Uninitialized => {
                info!(
                    messages = self.cfg.messages,
                    loss = self.cfg.loss_probability,
                    corruption = self.cfg.corruption_probability,
                    interval = self.cfg.mean_interval,
                    "starting simulation"
                );
                self.schedule_arrival();
                self.status = Status::Running;
            }
            Status::Running => {}
        }

        if let (Some(deadline), Some(next)) = (self.cfg.deadline, self.context.peek()) {
            if next.time > deadline {
                return Err(Error::DeadlineExceeded(next.time));
            }
        }

        let Some(event) = self.context.advance() else {
            self.status = Status::Terminated;
            self.auditor.terminate(self.context.now());
            info!(
                time = self.context.now(),
                dispatched = self.dispatched.get(),
                "simulation terminated"
            );
            return Ok(None);
        };
        self.dispatched.inc();
        self.auditor.dispatch(&event);
        trace!(
            time = event.time,
            kind = event.kind.name(),
            entity = %event.entity,
            "dispatching event"
        );

        let entity = event.entity;
        match event.kind {
            Kind::FromApplication => self.handle_application(entity),
            Kind::FromMedium(packet) => {
                let (ctx, participant) = self.split(entity);
                participant.on_medium_arrival(ctx, entity, packet);
            }
            Kind::TimerFired => {
                let (ctx, participant) = self.split(entity);
                participant.on_timer_fired(ctx, entity);
            }
        }
        Ok(Some(event))
    }

    /// Dispatch events until none remain.
    pub fn run(&mut self) -> Result<Report, Error> {
        while self.step()?.is_some() {}
        Ok(self.report())
    }

    /// Summarize the simulation so far.
    pub fn report(&self) -> Report {
        let network = self.context.network();
        Report {
            time: self.context.now(),
            generated: self.generated.get(),
            delivered: network.deliveries().len() as u64,
            sent: network.sent(),
            lost: network.lost(),
            corrupted: network.corrupted(),
            dispatched: self.dispatched.get(),
            digest: self.auditor.state(),
        }
    }

    /// Encode all metrics in the text exposition format.
    pub fn encode_metrics(&self) -> Result<String, fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    /// Number of messages handed down by the application layer so far.
    pub fn generated(&self) -> u64 {
        self.generated.get()
    }

    fn split(&mut self, entity: Entity) -> (&mut Context, &mut dyn Participant) {
        match entity {
            Entity::A => (&mut self.context, &mut self.sender),
            Entity::B => (&mut self.context, &mut self.receiver),
        }
    }

    fn handle_application(&mut self, entity: Entity) {
        let generated = self.generated.get();
        if generated >= self.cfg.messages {
            debug!(%entity, generated, "discarding application message: limit reached");
            return;
        }

        // The next arrival is drawn before the message is handed over
        if generated + 1 < self.cfg.messages {
            self.schedule_arrival();
        }
        let message = message(generated);
        self.generated.inc();
        debug!(%entity, index = generated, "generated application message");

        let (ctx, participant) = self.split(entity);
        participant.on_application_message(ctx, entity, message);
    }

    fn schedule_arrival(&mut self) {
        let at = self.context.now() + self.cfg.mean_interval * 2.0 * self.context.uniform();
        let entity = if self.cfg.bidirectional && self.context.uniform() > 0.5 {
            Entity::B
        } else {
            Entity::A
        };
        trace!(%entity, at, "scheduling application message");
        self.context
            .schedule(Event::new(at, Kind::FromApplication, entity));
    }
}
