use matrix_core::{MessageEvent, OpaqueEvent, ReactionEvent, RoomEvent};

/// Receives events from a sync loop.
///
/// Methods run on the loop's task, one event at a time and in timeline order;
/// the next poll is not issued until they return. Hand slow work off to
/// another task.
pub trait EventHandler: Send {
    fn on_message(&mut self, event: MessageEvent) {
        let _ = event;
    }

    fn on_reaction(&mut self, event: ReactionEvent) {
        let _ = event;
    }

    /// Events of any type the client does not decode.
    fn on_other(&mut self, event: &OpaqueEvent) {
        let _ = event;
    }
}

/// Adapter routing every event into one closure. See [`from_fn`].
pub struct FnHandler<F>(F);

/// Handle all events with a closure taking the decoded [`RoomEvent`].
pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(RoomEvent) + Send,
{
    FnHandler(f)
}

impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(RoomEvent) + Send,
{
    fn on_message(&mut self, event: MessageEvent) {
        (self.0)(RoomEvent::Message(event));
    }

    fn on_reaction(&mut self, event: ReactionEvent) {
        (self.0)(RoomEvent::Reaction(event));
    }

    fn on_other(&mut self, event: &OpaqueEvent) {
        (self.0)(RoomEvent::Other(event.clone()));
    }
}
