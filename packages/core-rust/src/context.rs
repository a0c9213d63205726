use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Per-dispatch context carrying cancellation and correlation data.
/// Passed to every handler invocation and to the retry consumer loop.
///
/// The bus never preempts a running handler: cancellation is only observed by
/// code that checks `is_cancelled()` or awaits `cancelled()`.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Distributed trace identifier for log correlation.
    pub trace_id: String,
    /// Authenticated caller, if an outer layer established one.
    pub principal: Option<String>,
    cancel: CancellationToken,
}

impl DispatchContext {
    /// Creates a root context with a fresh trace id and its own cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            principal: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a context driven by an existing cancellation token.
    #[must_use]
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Derives a context that is cancelled when this one is, but whose own
    /// cancellation does not propagate upward.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            principal: self.principal.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_contexts_get_distinct_trace_ids() {
        let a = DispatchContext::new();
        let b = DispatchContext::new();
        assert_ne!(a.trace_id, b.trace_id);
        assert!(a.principal.is_none());
    }

    #[test]
    fn builders_set_fields() {
        let ctx = DispatchContext::new()
            .with_trace_id("trace-1")
            .with_principal("user-42");
        assert_eq!(ctx.trace_id, "trace-1");
        assert_eq!(ctx.principal.as_deref(), Some("user-42"));
    }

    #[test]
    fn cancelling_parent_cancels_child() {
        let parent = DispatchContext::new();
        let child = parent.child();
        assert_eq!(child.trace_id, parent.trace_id);

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent_running() {
        let parent = DispatchContext::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let ctx = DispatchContext::new();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        ctx.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn from_token_shares_cancellation() {
        let token = CancellationToken::new();
        let ctx = DispatchContext::from_token(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
