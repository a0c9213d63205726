//! Message identity: the only structural requirement the bus imposes on a
//! dispatched value.

/// A typed, immutable request routed to exactly one handler.
///
/// `NAME` is the stable registry key. It is fixed per type, so routing never
/// inspects the value itself. Two types must not share a name; the registry
/// rejects the second registration.
pub trait Message: Send + Sync + 'static {
    /// Stable identifier used as the registry key (e.g. `"create-user-command"`).
    const NAME: &'static str;

    /// Returns the identifier of this message's type.
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

/// A message that requests a state change and yields only success or failure.
pub trait Command: Message {}

/// A message that requests data and yields `Output` or failure.
pub trait Query: Message {
    /// Value produced by the query's handler.
    type Output: Send + 'static;
}
