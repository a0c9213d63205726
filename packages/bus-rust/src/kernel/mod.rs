//! Kernel: owns both buses, wires modules into them, and runs the retry
//! consumer for the lifetime of the host process.
//!
//! Follows a deferred startup pattern:
//! 1. `new()` -- builds the buses from a validated `BusConfig`
//! 2. `add_module()` -- registers each module's handlers (configuring phase only)
//! 3. `start()` -- spawns the retry consumer; registration is closed from here on
//! 4. `shutdown()` -- cancels the consumer and waits for in-flight async dispatches

pub mod lifecycle;
pub mod module;

use std::sync::Arc;

use arc_swap::ArcSwap;
use cqbus_core::{BusError, BusLogger, DispatchContext};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{BusConfig, CommandBus, ConfigError, QueryBus};

pub use lifecycle::KernelState;
pub use module::{BusModule, ModuleRegistrar};

/// Errors from assembling or starting a `Kernel`.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("module already registered: {name}")]
    ModuleAlreadyRegistered { name: String },
    #[error("module {module} failed to register its handlers: {source}")]
    Registration {
        module: String,
        #[source]
        source: BusError,
    },
    #[error("kernel is {state:?}, expected Configuring")]
    NotConfiguring { state: KernelState },
}

/// Owns the command and query buses and the retry consumer task.
pub struct Kernel {
    config: BusConfig,
    command_bus: Arc<CommandBus>,
    query_bus: Arc<QueryBus>,
    modules: Vec<&'static str>,
    state: Arc<ArcSwap<KernelState>>,
    root: DispatchContext,
    consumer: Option<JoinHandle<Result<(), BusError>>>,
}

impl Kernel {
    /// Creates a kernel in the `Configuring` state with empty buses.
    ///
    /// # Errors
    ///
    /// Returns `KernelError::InvalidConfig` if `config` fails validation.
    pub fn new(config: BusConfig, logger: Arc<dyn BusLogger>) -> Result<Self, KernelError> {
        config.validate()?;
        Ok(Self {
            command_bus: Arc::new(CommandBus::new(config.clone(), Arc::clone(&logger))),
            query_bus: Arc::new(QueryBus::new(logger)),
            config,
            modules: Vec::new(),
            state: Arc::new(ArcSwap::from_pointee(KernelState::Configuring)),
            root: DispatchContext::new(),
            consumer: None,
        })
    }

    /// Registers a module's handlers with both buses.
    ///
    /// A failure part-way through may leave some of the module's handlers
    /// registered; callers are expected to abort startup.
    ///
    /// # Errors
    ///
    /// `NotConfiguring` after `start()`, `ModuleAlreadyRegistered` on a
    /// duplicate module name, `Registration` on a duplicate handler.
    pub fn add_module(&mut self, module: &dyn BusModule) -> Result<(), KernelError> {
        self.ensure_configuring()?;

        let name = module.name();
        if self.modules.contains(&name) {
            return Err(KernelError::ModuleAlreadyRegistered {
                name: name.to_string(),
            });
        }

        let mut registrar = ModuleRegistrar::new(&self.command_bus, &self.query_bus);
        module
            .register(&mut registrar)
            .map_err(|source| KernelError::Registration {
                module: name.to_string(),
                source,
            })?;

        self.modules.push(name);
        info!(module = name, "module registered");
        Ok(())
    }

    /// Spawns the retry consumer on a dedicated task and closes registration.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `KernelError::NotConfiguring` if the kernel was already started.
    pub fn start(&mut self) -> Result<(), KernelError> {
        self.ensure_configuring()?;

        let bus = Arc::clone(&self.command_bus);
        let ctx = self.root.child();
        self.consumer = Some(tokio::spawn(async move { bus.process_failed(ctx).await }));
        self.state.store(Arc::new(KernelState::Running));

        info!(
            modules = self.modules.len(),
            commands = self.command_bus.registered_commands().len(),
            queries = self.query_bus.registered_queries().len(),
            "kernel started"
        );
        Ok(())
    }

    /// Stops the retry consumer and waits up to `drain_timeout` for in-flight
    /// asynchronous dispatches.
    ///
    /// Returns `true` if every in-flight dispatch finished before the deadline.
    /// Failed commands still queued for retry are dropped, including when the
    /// kernel was never started.
    pub async fn shutdown(&mut self) -> bool {
        if self.state() == KernelState::Stopped {
            return true;
        }
        self.state.store(Arc::new(KernelState::Draining));
        self.root.cancel();

        if let Some(handle) = self.consumer.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "retry consumer exited with error"),
                Err(err) => warn!(error = %err, "retry consumer task failed"),
            }
        } else if self.command_bus.close_failure_channel() {
            info!("closed failure channel of a kernel that never started");
        }

        let drained = self
            .command_bus
            .wait_for_idle(self.config.drain_timeout)
            .await;
        if drained {
            info!("all async dispatches drained");
        } else {
            warn!(
                in_flight = self.command_bus.in_flight_count(),
                "drain timeout expired with async dispatches remaining"
            );
        }

        self.state.store(Arc::new(KernelState::Stopped));
        drained
    }

    #[must_use]
    pub fn state(&self) -> KernelState {
        **self.state.load()
    }

    /// Shared handle to the lifecycle state for health reporting.
    #[must_use]
    pub fn state_handle(&self) -> Arc<ArcSwap<KernelState>> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn command_bus(&self) -> Arc<CommandBus> {
        Arc::clone(&self.command_bus)
    }

    #[must_use]
    pub fn query_bus(&self) -> Arc<QueryBus> {
        Arc::clone(&self.query_bus)
    }

    /// Registered module names in registration order.
    #[must_use]
    pub fn modules(&self) -> &[&'static str] {
        &self.modules
    }

    fn ensure_configuring(&self) -> Result<(), KernelError> {
        let state = self.state();
        if state.accepts_modules() {
            Ok(())
        } else {
            Err(KernelError::NotConfiguring { state })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
