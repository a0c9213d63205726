use std::sync::Arc;

use async_trait::async_trait;

use crate::context::DispatchContext;
use crate::message::{Command, Query};

/// Performs the work for one command type.
///
/// The command is borrowed so a failed asynchronous invocation can be retried
/// with the same value. Errors are returned to synchronous callers unchanged;
/// use `anyhow::Error::downcast_ref` to recover a domain error.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    async fn handle(&self, ctx: &DispatchContext, command: &C) -> anyhow::Result<()>;
}

/// Performs the work for one query type.
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync + 'static {
    async fn handle(&self, ctx: &DispatchContext, query: &Q) -> anyhow::Result<Q::Output>;
}

#[async_trait]
impl<C, H> CommandHandler<C> for Arc<H>
where
    C: Command,
    H: CommandHandler<C> + ?Sized,
{
    async fn handle(&self, ctx: &DispatchContext, command: &C) -> anyhow::Result<()> {
        (**self).handle(ctx, command).await
    }
}

#[async_trait]
impl<Q, H> QueryHandler<Q> for Arc<H>
where
    Q: Query,
    H: QueryHandler<Q> + ?Sized,
{
    async fn handle(&self, ctx: &DispatchContext, query: &Q) -> anyhow::Result<Q::Output> {
        (**self).handle(ctx, query).await
    }
}
