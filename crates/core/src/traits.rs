//! State machine traits.

use crate::{Action, Event};
use std::time::Duration;

/// A complete, top-level state machine.
///
/// The runner calls [`StateMachine::set_time`] before every
/// [`StateMachine::handle`] so timeout predicates observe a consistent
/// monotonic clock.
pub trait StateMachine {
    /// Process one event, returning the actions it provokes.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Advance the machine's monotonic clock.
    fn set_time(&mut self, now: Duration);

    /// The machine's current monotonic time.
    fn now(&self) -> Duration;
}

/// A sub-state machine that handles a subset of events.
///
/// Composed into a [`StateMachine`]; returns `None` for events it does
/// not recognize so the composer can route elsewhere.
pub trait SubStateMachine {
    /// Process the event if it belongs to this sub-machine.
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>>;

    /// Advance the sub-machine's monotonic clock.
    fn set_time(&mut self, now: Duration);
}
