//! Type-erased command invocation and the failed-command envelope.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use cqbus_core::{BusError, Command, CommandHandler, DispatchContext};
use tokio::sync::oneshot;

/// A command message with its concrete type erased.
pub(crate) type ErasedMessage = Arc<dyn Any + Send + Sync>;

/// Command handler with its message type erased, as stored in the registry.
#[async_trait]
pub(crate) trait ErasedCommandHandler: Send + Sync {
    async fn handle_erased(
        &self,
        ctx: &DispatchContext,
        command: &(dyn Any + Send + Sync),
    ) -> Result<(), BusError>;
}

/// Adapts a typed `CommandHandler<C>` to `ErasedCommandHandler`.
pub(crate) struct CommandHandlerAdapter<C, H> {
    handler: H,
    _command: PhantomData<fn(C)>,
}

impl<C, H> CommandHandlerAdapter<C, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _command: PhantomData,
        }
    }
}

#[async_trait]
impl<C, H> ErasedCommandHandler for CommandHandlerAdapter<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    async fn handle_erased(
        &self,
        ctx: &DispatchContext,
        command: &(dyn Any + Send + Sync),
    ) -> Result<(), BusError> {
        let Some(command) = command.downcast_ref::<C>() else {
            return Err(BusError::InvalidMessage {
                name: C::NAME.to_string(),
                reason: format!(
                    "message does not have the type registered for {}",
                    C::NAME
                ),
            });
        };
        self.handler
            .handle(ctx, command)
            .await
            .map_err(BusError::Handler)
    }
}

// ---------------------------------------------------------------------------
// FailedEnvelope
// ---------------------------------------------------------------------------

/// An asynchronously dispatched command whose handler returned an error,
/// waiting for the retry consumer.
///
/// Owned by the retry consumer once sent; the original caller keeps no
/// reference to it. The sending task waits on the paired receiver until the
/// consumer calls `mark_received`, or until the envelope is dropped unread.
pub struct FailedEnvelope {
    name: &'static str,
    message: ErasedMessage,
    handler: Arc<dyn ErasedCommandHandler>,
    attempts: u32,
    trace_id: String,
    received: Option<oneshot::Sender<()>>,
}

impl FailedEnvelope {
    pub(crate) fn new(
        name: &'static str,
        message: ErasedMessage,
        handler: Arc<dyn ErasedCommandHandler>,
        trace_id: String,
    ) -> (Self, oneshot::Receiver<()>) {
        let (received, on_received) = oneshot::channel();
        let envelope = Self {
            name,
            message,
            handler,
            attempts: 1,
            trace_id,
            received: Some(received),
        };
        (envelope, on_received)
    }

    /// Identifier of the failed command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of handler invocations made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Trace id of the dispatch that produced this envelope.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Signals the sending task that the consumer has taken this envelope.
    /// Calling it again does nothing.
    pub(crate) fn mark_received(&mut self) {
        if let Some(received) = self.received.take() {
            // The sender is gone only if its task was aborted.
            let _ = received.send(());
        }
    }

    /// Counts one more attempt and re-invokes the handler with the same message.
    pub(crate) async fn retry(&mut self, ctx: &DispatchContext) -> Result<(), BusError> {
        self.attempts += 1;
        self.handler.handle_erased(ctx, self.message.as_ref()).await
    }
}

impl std::fmt::Debug for FailedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedEnvelope")
            .field("name", &self.name)
            .field("attempts", &self.attempts)
            .field("trace_id", &self.trace_id)
            .finish_non_exhaustive()
    }
}
