//! Command and query dispatch.
//!
//! 1. **Registration** (`command`, `query`): bind one handler per message identifier
//! 2. **Synchronous dispatch** (`CommandBus::dispatch`, `QueryBus::ask`)
//! 3. **Asynchronous dispatch** (`CommandBus::dispatch_async`): failures go to the failure channel
//! 4. **Retry consumer** (`retry`): re-invokes failed commands up to the attempt ceiling

pub mod command;
pub mod config;
pub mod envelope;
pub mod in_flight;
pub mod query;
pub mod retry;

pub use command::CommandBus;
pub use config::{BusConfig, ConfigError};
pub use envelope::FailedEnvelope;
pub use in_flight::{InFlightGuard, InFlightTracker};
pub use query::QueryBus;
