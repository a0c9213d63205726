//! Query bus: synchronous ask only. Failed queries are returned to the caller
//! and never retried.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use cqbus_core::{
    BusError, BusLogger, DispatchContext, LogLevel, LogRecord, Query, QueryHandler, Registry,
};

type ErasedOutput = Box<dyn Any + Send>;

#[async_trait]
trait ErasedQueryHandler: Send + Sync {
    async fn ask_erased(
        &self,
        ctx: &DispatchContext,
        query: &(dyn Any + Send + Sync),
    ) -> Result<ErasedOutput, BusError>;
}

struct QueryHandlerAdapter<Q, H> {
    handler: H,
    _query: PhantomData<fn(Q)>,
}

#[async_trait]
impl<Q, H> ErasedQueryHandler for QueryHandlerAdapter<Q, H>
where
    Q: Query,
    H: QueryHandler<Q>,
{
    async fn ask_erased(
        &self,
        ctx: &DispatchContext,
        query: &(dyn Any + Send + Sync),
    ) -> Result<ErasedOutput, BusError> {
        let Some(query) = query.downcast_ref::<Q>() else {
            return Err(BusError::InvalidMessage {
                name: Q::NAME.to_string(),
                reason: format!("message does not have the type registered for {}", Q::NAME),
            });
        };
        let output = self.handler.handle(ctx, query).await.map_err(BusError::Handler)?;
        Ok(Box::new(output))
    }
}

/// Routes each query to its single registered handler and returns the result
/// inline.
pub struct QueryBus {
    registry: Registry<dyn ErasedQueryHandler>,
    logger: Arc<dyn BusLogger>,
}

impl QueryBus {
    #[must_use]
    pub fn new(logger: Arc<dyn BusLogger>) -> Self {
        Self {
            registry: Registry::new(),
            logger,
        }
    }

    /// Binds `handler` to query type `Q`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyRegistered` if `Q::NAME` already has a handler.
    pub fn register<Q, H>(&self, handler: H) -> Result<(), BusError>
    where
        Q: Query,
        H: QueryHandler<Q>,
    {
        self.registry.register(
            Q::NAME,
            Arc::new(QueryHandlerAdapter::<Q, H> {
                handler,
                _query: PhantomData,
            }),
        )
    }

    /// Runs the query's handler on the caller's task and returns its output.
    ///
    /// # Errors
    ///
    /// `NotRegistered` if no handler is bound, `InvalidMessage` if the bound
    /// handler expects another type, or the handler's own error as
    /// `BusError::Handler`.
    pub async fn ask<Q: Query>(
        &self,
        ctx: &DispatchContext,
        query: Q,
    ) -> Result<Q::Output, BusError> {
        self.ask_ref(ctx, &query).await
    }

    /// Same as [`QueryBus::ask`] for a borrowed query.
    ///
    /// # Errors
    ///
    /// See [`QueryBus::ask`].
    pub async fn ask_ref<Q: Query>(
        &self,
        ctx: &DispatchContext,
        query: &Q,
    ) -> Result<Q::Output, BusError> {
        let handler = self.registry.resolve(Q::NAME)?;
        metrics::counter!("cqbus_queries_asked_total", "message" => Q::NAME).increment(1);

        let output = match handler.ask_erased(ctx, query).await {
            Ok(output) => output,
            Err(err) => {
                self.logger.log(
                    LogRecord::new(LogLevel::Debug, "query failed")
                        .field("message", Q::NAME)
                        .field("trace_id", &ctx.trace_id)
                        .field("error", &err),
                );
                return Err(err);
            }
        };

        output
            .downcast::<Q::Output>()
            .map(|boxed| *boxed)
            .map_err(|_| BusError::InvalidMessage {
                name: Q::NAME.to_string(),
                reason: "handler produced an output of an unexpected type".to_string(),
            })
    }

    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Registered query identifiers in sorted order.
    #[must_use]
    pub fn registered_queries(&self) -> Vec<&'static str> {
        self.registry.names()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use cqbus_core::{MemoryLogger, Message};

    use super::*;

    #[derive(Debug, Clone)]
    struct FindUser {
        email: String,
    }

    impl Message for FindUser {
        const NAME: &'static str = "find-user-query";
    }

    impl Query for FindUser {
        type Output = Option<String>;
    }

    struct ListUsers;

    impl Message for ListUsers {
        const NAME: &'static str = "list-users-query";
    }

    impl Query for ListUsers {
        type Output = Vec<String>;
    }

    /// Same identifier as `FindUser`, different type.
    struct FindUserImpostor;

    impl Message for FindUserImpostor {
        const NAME: &'static str = "find-user-query";
    }

    impl Query for FindUserImpostor {
        type Output = u8;
    }

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("db down")]
    struct DbDown;

    struct Directory {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl QueryHandler<FindUser> for Directory {
        async fn handle(
            &self,
            _ctx: &DispatchContext,
            query: &FindUser,
        ) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((query.email == "ada@example.com").then(|| "Ada".to_string()))
        }
    }

    struct Unavailable {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl QueryHandler<FindUser> for Unavailable {
        async fn handle(
            &self,
            _ctx: &DispatchContext,
            _query: &FindUser,
        ) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DbDown.into())
        }
    }

    fn make_bus() -> (QueryBus, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        (QueryBus::new(logger.clone()), logger)
    }

    #[tokio::test]
    async fn ask_returns_handler_result() {
        let (bus, _) = make_bus();
        let calls = Arc::new(AtomicU32::new(0));
        bus.register::<FindUser, _>(Directory {
            calls: calls.clone(),
        })
        .unwrap();

        let ctx = DispatchContext::new();
        let found = bus
            .ask(&ctx, FindUser {
                email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("Ada"));

        let missing = bus
            .ask_ref(&ctx, &FindUser {
                email: "bob@example.com".to_string(),
            })
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // The handler's error reaches the caller synchronously, exactly once.
    #[tokio::test]
    async fn query_error_returned_verbatim() {
        let (bus, logger) = make_bus();
        let calls = Arc::new(AtomicU32::new(0));
        bus.register::<FindUser, _>(Unavailable {
            calls: calls.clone(),
        })
        .unwrap();

        let err = bus
            .ask(&DispatchContext::new(), FindUser {
                email: "ada@example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "db down");
        let inner = err.into_handler_error().unwrap();
        assert_eq!(inner.downcast_ref::<DbDown>(), Some(&DbDown));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let failures = logger.with_message("query failed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].level, LogLevel::Debug);
    }

    #[tokio::test]
    async fn ask_unregistered_is_not_registered() {
        let (bus, _) = make_bus();
        let calls = Arc::new(AtomicU32::new(0));
        bus.register::<FindUser, _>(Directory {
            calls: calls.clone(),
        })
        .unwrap();

        let err = bus.ask(&DispatchContext::new(), ListUsers).await.unwrap_err();
        assert!(matches!(err, BusError::NotRegistered { ref name } if name == "list-users-query"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ask_with_mismatched_type_is_invalid_message() {
        let (bus, _) = make_bus();
        let calls = Arc::new(AtomicU32::new(0));
        bus.register::<FindUser, _>(Directory {
            calls: calls.clone(),
        })
        .unwrap();

        let err = bus
            .ask(&DispatchContext::new(), FindUserImpostor)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidMessage { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_query_registration_fails() {
        let (bus, _) = make_bus();
        bus.register::<FindUser, _>(Directory {
            calls: Arc::new(AtomicU32::new(0)),
        })
        .unwrap();
        let err = bus
            .register::<FindUser, _>(Unavailable {
                calls: Arc::new(AtomicU32::new(0)),
            })
            .unwrap_err();
        assert!(err.is_already_registered());
        assert_eq!(bus.registered_queries(), vec!["find-user-query"]);
        assert!(bus.has_handler("find-user-query"));
    }
}
