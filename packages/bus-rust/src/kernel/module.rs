use cqbus_core::{BusError, Command, CommandHandler, Query, QueryHandler};

use crate::bus::{CommandBus, QueryBus};

/// A named group of command and query handlers wired into the buses at
/// startup (e.g. a `users` module).
pub trait BusModule: Send + Sync {
    /// Unique module name (e.g. `"user_module"`).
    fn name(&self) -> &'static str;

    /// Registers this module's handlers.
    ///
    /// # Errors
    ///
    /// Propagates `BusError::AlreadyRegistered` from either bus.
    fn register(&self, registrar: &mut ModuleRegistrar<'_>) -> Result<(), BusError>;
}

/// Handed to [`BusModule::register`]; forwards to the kernel's buses.
pub struct ModuleRegistrar<'a> {
    commands: &'a CommandBus,
    queries: &'a QueryBus,
}

impl<'a> ModuleRegistrar<'a> {
    pub(crate) fn new(commands: &'a CommandBus, queries: &'a QueryBus) -> Self {
        Self { commands, queries }
    }

    /// Registers a command handler.
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyRegistered` on a duplicate identifier.
    pub fn command<C, H>(&mut self, handler: H) -> Result<&mut Self, BusError>
    where
        C: Command,
        H: CommandHandler<C>,
    {
        self.commands.register::<C, H>(handler)?;
        Ok(self)
    }

    /// Registers a query handler.
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyRegistered` on a duplicate identifier.
    pub fn query<Q, H>(&mut self, handler: H) -> Result<&mut Self, BusError>
    where
        Q: Query,
        H: QueryHandler<Q>,
    {
        self.queries.register::<Q, H>(handler)?;
        Ok(self)
    }
}
