use crate::{
    network::{Network, Transmission},
    queue::{Event, Queue},
    random::{calibrate, Glibc, Uniform},
    timer::Timers,
    Config, Entity, Error, Message, Packet,
};
use prometheus_client::registry::Registry;
use tracing::debug;

/// Everything a [crate::Participant] can observe or affect during a callback.
///
/// A `Context` owns the simulation clock, the pending events, the random source, and the medium
/// of a single run. Independent simulations each own their own `Context`, so any number of them
/// can coexist in one process.
pub struct Context {
    now: f64,
    queue: Queue,
    random: Glibc,
    network: Network,
    timers: Timers,
}

impl Context {
    /// Validate `cfg`, seed the random source, and ensure it passes calibration.
    pub fn new(cfg: &Config, registry: &mut Registry) -> Result<Self, Error> {
        cfg.validate()?;
        let mut random = Glibc::new(cfg.seed);
        let mean = calibrate(&mut random)?;
        debug!(seed = cfg.seed, mean, "calibrated random source");
        Ok(Self {
            now: 0.0,
            queue: Queue::new(),
            random,
            network: Network::new(
                cfg.loss_probability,
                cfg.corruption_probability,
                registry,
            )?,
            timers: Timers::new(registry),
        })
    }

    /// Current simulated time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Hand `packet` from `entity` to the medium (addressed to its peer).
    pub fn send(&mut self, entity: Entity, packet: Packet) -> Transmission {
        self.network
            .send(&mut self.queue, &mut self.random, self.now, entity, packet)
    }

    /// Start the timer of `entity`, to fire `duration` from now.
    ///
    /// Returns `false` if a timer was already pending (it is left unchanged).
    pub fn start_timer(&mut self, entity: Entity, duration: f64) -> bool {
        self.timers
            .start(&mut self.queue, self.now, entity, duration)
    }

    /// Cancel the timer of `entity`.
    ///
    /// Returns `false` if no timer was pending.
    pub fn stop_timer(&mut self, entity: Entity) -> bool {
        self.timers.stop(&mut self.queue, entity)
    }

    /// Returns `true` if `entity` has a pending timer.
    pub fn timer_pending(&self, entity: Entity) -> bool {
        Timers::pending(&self.queue, entity)
    }

    /// Hand `payload` to the application layer at `entity`.
    pub fn deliver(&mut self, entity: Entity, payload: &Message) {
        self.network.deliver(entity, payload);
    }

    /// Pending events.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The simulated medium.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Timer bookkeeping.
    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub(crate) fn uniform(&mut self) -> f64 {
        self.random.uniform()
    }

    pub(crate) fn schedule(&mut self, event: Event) {
        self.queue.insert(event);
    }

    pub(crate) fn peek(&self) -> Option<&Event> {
        self.queue.peek()
    }

    /// Remove the earliest event and move the clock to its time.
    pub(crate) fn advance(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        self.now = event.time;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{random::CALIBRATION_SAMPLES, Kind};

    fn context(cfg: Config) -> Context {
        Context::new(&cfg, &mut Registry::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cfg = Config {
            loss_probability: 2.0,
            ..Config::default()
        };
        assert!(matches!(
            Context::new(&cfg, &mut Registry::default()),
            Err(Error::InvalidProbability("loss", _))
        ));
    }

    #[test]
    fn test_calibration_consumes_stream() {
        let mut ctx = context(Config::default());
        let mut expected = Glibc::default();
        for _ in 0..CALIBRATION_SAMPLES {
            expected.uniform();
        }
        assert_eq!(ctx.uniform(), expected.uniform());
    }

    #[test]
    fn test_advance_moves_clock() {
        let mut ctx = context(Config::default());
        assert_eq!(ctx.now(), 0.0);
        ctx.schedule(Event::new(3.0, Kind::FromApplication, Entity::A));
        ctx.schedule(Event::new(1.5, Kind::FromApplication, Entity::A));

        assert_eq!(ctx.peek().unwrap().time, 1.5);
        assert_eq!(ctx.advance().unwrap().time, 1.5);
        assert_eq!(ctx.now(), 1.5);
        assert_eq!(ctx.advance().unwrap().time, 3.0);
        assert_eq!(ctx.now(), 3.0);

        // Draining leaves the clock where it was
        assert!(ctx.advance().is_none());
        assert_eq!(ctx.now(), 3.0);
    }

    #[test]
    fn test_timer_relative_to_now() {
        let mut ctx = context(Config::default());
        ctx.schedule(Event::new(7.0, Kind::FromApplication, Entity::A));
        ctx.advance();

        assert!(ctx.start_timer(Entity::A, 15.0));
        assert!(ctx.timer_pending(Entity::A));
        assert_eq!(ctx.peek().unwrap().time, 22.0);
        assert!(ctx.stop_timer(Entity::A));
        assert!(!ctx.timer_pending(Entity::A));
        assert_eq!(ctx.timers().started(), 1);
        assert_eq!(ctx.timers().stopped(), 1);
    }

    #[test]
    fn test_send_schedules_for_peer() {
        let mut ctx = context(Config::default());
        let outcome = ctx.send(Entity::A, Packet::default());
        let Transmission::Scheduled { at, corruption } = outcome else {
            panic!("lossless medium dropped a packet");
        };
        assert!(corruption.is_none());
        assert!((1.0..10.0).contains(&at));

        let event = ctx.advance().unwrap();
        assert_eq!(event.entity, Entity::B);
        assert_eq!(event.kind, Kind::FromMedium(Packet::default()));
        assert_eq!(ctx.network().sent(), 1);
    }
}
