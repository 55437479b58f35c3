use crate::{Context, Entity, Message, Packet};

/// Protocol logic attached to one end of the medium.
///
/// The simulation owns one participant per entity and invokes exactly one callback per
/// dispatched event. Callbacks interact with the simulation only through the [Context] they are
/// handed (sending packets, starting and stopping timers, delivering payloads upward).
pub trait Participant {
    /// The application layer handed `message` to `entity`.
    fn on_application_message(&mut self, ctx: &mut Context, entity: Entity, message: Message);

    /// `packet` arrived at `entity` from the medium.
    fn on_medium_arrival(&mut self, ctx: &mut Context, entity: Entity, packet: Packet);

    /// The timer of `entity` expired.
    fn on_timer_fired(&mut self, ctx: &mut Context, entity: Entity);
}

impl<P: Participant + ?Sized> Participant for Box<P> {
    fn on_application_message(&mut self, ctx: &mut Context, entity: Entity, message: Message) {
        (**self).on_application_message(ctx, entity, message)
    }

    fn on_medium_arrival(&mut self, ctx: &mut Context, entity: Entity, packet: Packet) {
        (**self).on_medium_arrival(ctx, entity, packet)
    }

    fn on_timer_fired(&mut self, ctx: &mut Context, entity: Entity) {
        (**self).on_timer_fired(ctx, entity)
    }
}
