//! In-memory `users` module: create and look up users, send a welcome email.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cqbus::{
    BusError, BusModule, Command, CommandHandler, DispatchContext, Message, ModuleRegistrar, Query,
    QueryHandler,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UserError {
    #[error("user not found: {email}")]
    NotFound { email: String },
    #[error("user already exists: {email}")]
    AlreadyExists { email: String },
}

/// Users keyed by email.
#[derive(Debug, Default)]
pub struct UserRepository {
    users: DashMap<String, User>,
}

impl UserRepository {
    fn save(&self, user: User) -> Result<(), UserError> {
        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(UserError::AlreadyExists { email: user.email }),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    fn find_by_email(&self, email: &str) -> Result<User, UserError> {
        self.users
            .get(email)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| UserError::NotFound {
                email: email.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub struct CreateUserCommand {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl Message for CreateUserCommand {
    const NAME: &'static str = "create-user-command";
}

impl Command for CreateUserCommand {}

pub struct SendWelcomeEmailCommand {
    pub email: String,
}

impl Message for SendWelcomeEmailCommand {
    const NAME: &'static str = "send-welcome-email-command";
}

impl Command for SendWelcomeEmailCommand {}

pub struct FindUserQuery {
    pub email: String,
}

impl Message for FindUserQuery {
    const NAME: &'static str = "find-user-query";
}

impl Query for FindUserQuery {
    type Output = FindUserResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindUserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl From<User> for FindUserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            name: user.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct CreateUserHandler {
    repository: Arc<UserRepository>,
}

#[async_trait]
impl CommandHandler<CreateUserCommand> for CreateUserHandler {
    async fn handle(
        &self,
        _ctx: &DispatchContext,
        command: &CreateUserCommand,
    ) -> anyhow::Result<()> {
        self.repository.save(User {
            id: command.id,
            email: command.email.clone(),
            name: command.name.clone(),
        })?;
        Ok(())
    }
}

struct FindUserHandler {
    repository: Arc<UserRepository>,
}

#[async_trait]
impl QueryHandler<FindUserQuery> for FindUserHandler {
    async fn handle(
        &self,
        _ctx: &DispatchContext,
        query: &FindUserQuery,
    ) -> anyhow::Result<FindUserResponse> {
        Ok(self.repository.find_by_email(&query.email)?.into())
    }
}

/// Mail gateway stand-in that rejects its first `fail_first` deliveries.
struct WelcomeEmailHandler {
    attempts: Arc<AtomicU32>,
    fail_first: u32,
}

#[async_trait]
impl CommandHandler<SendWelcomeEmailCommand> for WelcomeEmailHandler {
    async fn handle(
        &self,
        ctx: &DispatchContext,
        command: &SendWelcomeEmailCommand,
    ) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            anyhow::bail!("mail gateway unavailable (attempt {attempt})");
        }
        info!(email = %command.email, trace_id = %ctx.trace_id, attempt, "welcome email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

pub struct UsersModule {
    repository: Arc<UserRepository>,
    email_attempts: Arc<AtomicU32>,
    email_fail_first: u32,
}

impl UsersModule {
    pub fn new(email_fail_first: u32) -> Self {
        Self {
            repository: Arc::new(UserRepository::default()),
            email_attempts: Arc::new(AtomicU32::new(0)),
            email_fail_first,
        }
    }

    /// Number of welcome-email deliveries attempted so far.
    pub fn email_attempts(&self) -> u32 {
        self.email_attempts.load(Ordering::SeqCst)
    }
}

impl BusModule for UsersModule {
    fn name(&self) -> &'static str {
        "user_module"
    }

    fn register(&self, registrar: &mut ModuleRegistrar<'_>) -> Result<(), BusError> {
        registrar
            .command::<CreateUserCommand, _>(CreateUserHandler {
                repository: Arc::clone(&self.repository),
            })?
            .command::<SendWelcomeEmailCommand, _>(WelcomeEmailHandler {
                attempts: Arc::clone(&self.email_attempts),
                fail_first: self.email_fail_first,
            })?
            .query::<FindUserQuery, _>(FindUserHandler {
                repository: Arc::clone(&self.repository),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cqbus::{BusConfig, Kernel, MemoryLogger};

    use super::*;

    fn make_kernel(module: &UsersModule) -> Kernel {
        let mut kernel = Kernel::new(BusConfig::default(), Arc::new(MemoryLogger::new())).unwrap();
        kernel.add_module(module).unwrap();
        kernel
    }

    fn create(email: &str) -> CreateUserCommand {
        CreateUserCommand {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Ada".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_find_user() {
        let module = UsersModule::new(0);
        let kernel = make_kernel(&module);
        let ctx = DispatchContext::new();

        kernel
            .command_bus()
            .dispatch(&ctx, create("ada@example.com"))
            .await
            .unwrap();

        let found = kernel
            .query_bus()
            .ask(&ctx, FindUserQuery {
                email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(found.email, "ada@example.com");
        assert_eq!(found.name, "Ada");

        let json = serde_json::to_value(&found).unwrap();
        assert_eq!(json["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_surfaces_domain_error() {
        let module = UsersModule::new(0);
        let kernel = make_kernel(&module);
        let ctx = DispatchContext::new();
        let commands = kernel.command_bus();

        commands.dispatch(&ctx, create("ada@example.com")).await.unwrap();
        let err = commands
            .dispatch(&ctx, create("ada@example.com"))
            .await
            .unwrap_err()
            .into_handler_error()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<UserError>(),
            Some(&UserError::AlreadyExists {
                email: "ada@example.com".to_string()
            })
        );
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let module = UsersModule::new(0);
        let kernel = make_kernel(&module);

        let err = kernel
            .query_bus()
            .ask(&DispatchContext::new(), FindUserQuery {
                email: "nobody@example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.handler_error().and_then(|e| e.downcast_ref::<UserError>()),
            Some(UserError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn flaky_welcome_email_is_retried_by_consumer() {
        let module = UsersModule::new(1);
        let mut kernel = make_kernel(&module);
        kernel.start().unwrap();

        kernel
            .command_bus()
            .dispatch_async(&DispatchContext::new(), SendWelcomeEmailCommand {
                email: "ada@example.com".to_string(),
            })
            .unwrap();

        for _ in 0..200 {
            if module.email_attempts() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(module.email_attempts(), 2);
        assert!(kernel.shutdown().await);
    }
}
