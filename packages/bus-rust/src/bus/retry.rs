//! Retry consumer: the single long-lived reader of the failure channel.

use cqbus_core::{BusError, DispatchContext, LogLevel, LogRecord};

use super::command::CommandBus;
use super::envelope::FailedEnvelope;

impl CommandBus {
    /// Consumes failed asynchronous commands until `ctx` is cancelled.
    ///
    /// For each envelope the sending task is released first. If the envelope
    /// has already reached `max_attempts` it is then discarded; otherwise its
    /// handler is re-invoked once, inline, with the loop's context. A failed
    /// retry is logged and not sent back to the channel. On cancellation the
    /// channel is closed; envelopes still buffered are dropped and any task
    /// waiting on the channel observes the closure.
    ///
    /// # Errors
    ///
    /// Returns `BusError::ConsumerAlreadyStarted` if the consumer for this bus
    /// has been started before.
    pub async fn process_failed(&self, ctx: DispatchContext) -> Result<(), BusError> {
        let mut rx = self
            .failed_rx
            .lock()
            .take()
            .ok_or(BusError::ConsumerAlreadyStarted)?;

        loop {
            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    rx.close();
                    self.logger.log(
                        LogRecord::new(LogLevel::Warn, "exiting failed commands consumer")
                            .field("reason", "context cancelled"),
                    );
                    return Ok(());
                }
                // The bus holds a sender for as long as `self` lives, so
                // `recv` only yields `None` after `close`.
                Some(envelope) = rx.recv() => self.retry_envelope(&ctx, envelope).await,
            }
        }
    }

    async fn retry_envelope(&self, ctx: &DispatchContext, mut envelope: FailedEnvelope) {
        envelope.mark_received();
        let name = envelope.name();
        if envelope.attempts() >= self.config.max_attempts {
            metrics::counter!("cqbus_command_retries_exhausted_total", "message" => name)
                .increment(1);
            return;
        }

        metrics::counter!("cqbus_command_retries_total", "message" => name).increment(1);
        if let Err(err) = envelope.retry(ctx).await {
            self.logger.log(
                LogRecord::new(LogLevel::Warn, "failed retrying command")
                    .field("message", name)
                    .field("trace_id", envelope.trace_id())
                    .field("attempts", envelope.attempts())
                    .field("error", err),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
