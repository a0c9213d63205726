/// Errors surfaced by registration and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no handler registered for message: {name}")]
    NotRegistered { name: String },
    #[error("handler already registered for message: {name}")]
    AlreadyRegistered { name: String },
    #[error("invalid message {name}: {reason}")]
    InvalidMessage { name: String, reason: String },
    /// The handler's own error, unchanged.
    #[error(transparent)]
    Handler(anyhow::Error),
    #[error("failed-command consumer already started for this bus")]
    ConsumerAlreadyStarted,
}

impl BusError {
    /// Returns the handler's error if this is a handler failure.
    #[must_use]
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            BusError::Handler(err) => Some(err),
            _ => None,
        }
    }

    /// Unwraps a handler failure into the handler's own error.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged when this is not a handler failure.
    pub fn into_handler_error(self) -> Result<anyhow::Error, BusError> {
        match self {
            BusError::Handler(err) => Ok(err),
            other => Err(other),
        }
    }

    #[must_use]
    pub fn is_not_registered(&self) -> bool {
        matches!(self, BusError::NotRegistered { .. })
    }

    #[must_use]
    pub fn is_already_registered(&self) -> bool {
        matches!(self, BusError::AlreadyRegistered { .. })
    }
}
