//! `bus-demo`: wires a `users` module into a kernel and runs each dispatch
//! path once.

mod users;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cqbus::telemetry::init_tracing;
use cqbus::{BusConfig, DispatchContext, Kernel, TracingLogger};
use tracing::{info, warn};
use uuid::Uuid;

use users::{CreateUserCommand, FindUserQuery, SendWelcomeEmailCommand, UsersModule};

#[derive(Debug, Parser)]
#[command(name = "bus-demo", about = "Command/query bus demonstration")]
struct Args {
    /// Attempt ceiling for failed asynchronous commands.
    #[arg(long, env = "CQBUS_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Capacity of the failure channel feeding the retry consumer.
    #[arg(long, env = "CQBUS_FAILURE_CHANNEL_CAPACITY", default_value_t = 1)]
    failure_channel_capacity: usize,

    /// How long shutdown waits for in-flight async dispatches, in milliseconds.
    #[arg(long, env = "CQBUS_DRAIN_TIMEOUT_MS", default_value_t = 30_000)]
    drain_timeout_ms: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CQBUS_LOG_JSON")]
    log_json: bool,

    /// How many welcome-email deliveries fail before the gateway recovers.
    #[arg(long, default_value_t = 1)]
    email_failures: u32,

    /// How long to keep running after the script before shutting down, in
    /// milliseconds. Ctrl-C shuts down early.
    #[arg(long, default_value_t = 500)]
    linger_ms: u64,
}

impl Args {
    fn bus_config(&self) -> BusConfig {
        BusConfig {
            max_attempts: self.max_attempts,
            failure_channel_capacity: self.failure_channel_capacity,
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    let users = UsersModule::new(args.email_failures);
    let mut kernel = Kernel::new(args.bus_config(), Arc::new(TracingLogger))?;
    kernel.add_module(&users)?;
    kernel.start()?;

    let commands = kernel.command_bus();
    let queries = kernel.query_bus();
    let ctx = DispatchContext::new().with_principal("bus-demo");

    let email = "ada@example.com".to_string();
    commands
        .dispatch(&ctx, CreateUserCommand {
            id: Uuid::new_v4(),
            email: email.clone(),
            name: "Ada Lovelace".to_string(),
        })
        .await?;

    let user = queries
        .ask(&ctx, FindUserQuery {
            email: email.clone(),
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&user)?);

    commands.dispatch_async(&ctx, SendWelcomeEmailCommand { email })?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        () = tokio::time::sleep(Duration::from_millis(args.linger_ms)) => {}
    }

    if !kernel.shutdown().await {
        warn!("shutdown finished with async dispatches still running");
    }
    info!(
        email_attempts = users.email_attempts(),
        "bus-demo finished"
    );
    Ok(())
}
