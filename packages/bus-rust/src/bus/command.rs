//! Command bus: synchronous dispatch, fire-and-forget dispatch, and the
//! failure channel feeding the retry consumer (see `retry.rs`).

use std::sync::Arc;
use std::time::Duration;

use cqbus_core::{
    BusError, BusLogger, Command, CommandHandler, DispatchContext, LogLevel, LogRecord, Registry,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::config::BusConfig;
use super::envelope::{CommandHandlerAdapter, ErasedCommandHandler, ErasedMessage, FailedEnvelope};
use super::in_flight::InFlightTracker;

/// Routes each command to its single registered handler.
///
/// Handlers must all be registered before the first dispatch. Asynchronous
/// dispatches that fail are sent to a shared failure channel drained by
/// [`CommandBus::process_failed`], which must be started explicitly.
pub struct CommandBus {
    pub(super) registry: Registry<dyn ErasedCommandHandler>,
    pub(super) logger: Arc<dyn BusLogger>,
    pub(super) config: BusConfig,
    failed_tx: mpsc::Sender<FailedEnvelope>,
    pub(super) failed_rx: Mutex<Option<mpsc::Receiver<FailedEnvelope>>>,
    in_flight: InFlightTracker,
}

impl CommandBus {
    /// Creates a bus with an empty registry and an idle failure channel.
    ///
    /// A zero `failure_channel_capacity` is raised to 1.
    #[must_use]
    pub fn new(config: BusConfig, logger: Arc<dyn BusLogger>) -> Self {
        let (failed_tx, failed_rx) = mpsc::channel(config.failure_channel_capacity.max(1));
        Self {
            registry: Registry::new(),
            logger,
            config,
            failed_tx,
            failed_rx: Mutex::new(Some(failed_rx)),
            in_flight: InFlightTracker::new(),
        }
    }

    /// Binds `handler` to command type `C`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyRegistered` if `C::NAME` already has a handler.
    pub fn register<C, H>(&self, handler: H) -> Result<(), BusError>
    where
        C: Command,
        H: CommandHandler<C>,
    {
        self.registry
            .register(C::NAME, Arc::new(CommandHandlerAdapter::<C, H>::new(handler)))
    }

    /// Runs the command's handler on the caller's task and returns its result.
    ///
    /// # Errors
    ///
    /// `NotRegistered` if no handler is bound, `InvalidMessage` if the bound
    /// handler expects another type, or the handler's own error as
    /// `BusError::Handler`.
    pub async fn dispatch<C: Command>(
        &self,
        ctx: &DispatchContext,
        command: C,
    ) -> Result<(), BusError> {
        self.dispatch_ref(ctx, &command).await
    }

    /// Same as [`CommandBus::dispatch`] for a borrowed command.
    ///
    /// # Errors
    ///
    /// See [`CommandBus::dispatch`].
    pub async fn dispatch_ref<C: Command>(
        &self,
        ctx: &DispatchContext,
        command: &C,
    ) -> Result<(), BusError> {
        let handler = self.registry.resolve(C::NAME)?;
        metrics::counter!("cqbus_commands_dispatched_total", "message" => C::NAME).increment(1);
        handler.handle_erased(ctx, command).await
    }

    /// Schedules the command's handler on a new task and returns immediately.
    ///
    /// Only resolution failures are reported. If the handler later fails, the
    /// task sends a [`FailedEnvelope`] to the failure channel, waits until the
    /// retry consumer has taken it, and then logs the failure. Until then the
    /// task counts as in flight.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `BusError::NotRegistered` if no handler is bound to `C::NAME`.
    pub fn dispatch_async<C: Command>(
        &self,
        ctx: &DispatchContext,
        command: C,
    ) -> Result<(), BusError> {
        let handler = self.registry.resolve(C::NAME)?;
        metrics::counter!("cqbus_commands_dispatched_total", "message" => C::NAME).increment(1);

        let ctx = ctx.clone();
        let message: ErasedMessage = Arc::new(command);
        let failed_tx = self.failed_tx.clone();
        let logger = Arc::clone(&self.logger);
        let guard = self.in_flight.guard();

        tokio::spawn(async move {
            let _guard = guard;
            let Err(err) = handler.handle_erased(&ctx, message.as_ref()).await else {
                return;
            };
            metrics::counter!("cqbus_commands_failed_total", "message" => C::NAME).increment(1);

            let error = err.to_string();
            let (envelope, on_received) =
                FailedEnvelope::new(C::NAME, message, Arc::clone(&handler), ctx.trace_id.clone());

            // A closed channel, or an envelope dropped before the consumer
            // took it, both mean nobody will retry this command.
            if failed_tx.send(envelope).await.is_err() || on_received.await.is_err() {
                logger.log(
                    LogRecord::new(
                        LogLevel::Warn,
                        "failure channel closed, dropping failed command",
                    )
                    .field("message", C::NAME)
                    .field("trace_id", &ctx.trace_id)
                    .field("error", &error),
                );
                return;
            }

            logger.log(
                LogRecord::new(LogLevel::Error, "command failed asynchronously")
                    .field("message", C::NAME)
                    .field("trace_id", &ctx.trace_id)
                    .field("error", error),
            );
        });

        Ok(())
    }

    /// Closes the failure channel when no consumer will ever run. Envelopes
    /// already buffered are dropped and every waiting task is released.
    ///
    /// Does nothing once the consumer has taken the receiver.
    pub(crate) fn close_failure_channel(&self) -> bool {
        let Some(mut rx) = self.failed_rx.lock().take() else {
            return false;
        };
        rx.close();
        true
    }

    /// Whether a handler is bound to `name`.
    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Registered command identifiers in sorted order.
    #[must_use]
    pub fn registered_commands(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Number of asynchronous dispatch tasks still running, including those
    /// waiting on the failure channel.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count()
    }

    /// Waits up to `timeout` for all asynchronous dispatch tasks to finish.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.in_flight.wait_for_idle(timeout).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
