// Copyright 2025 Cowboy AI, LLC.

//! Identity service
//!
//! [`IdentityService`] is the capability surface other instances see.
//! [`UserService`] is the local implementation; middlewares wrap it
//! (logging here, proxying in [`crate::proxy`]). Events raised by
//! aggregate mutations are drained onto the bus after the mutation
//! succeeds; repository writes happen in the event handlers that react to
//! published events, never synchronously inside the mutation itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::errors::{Error, Result};
use crate::pubsub::PubSub;
use crate::user::{
    SocialId, SocialProvider, User, UserActivatedEvent, UserId, UserRegisteredEvent,
    UserRepository, UserSocialAccountAddedEvent,
};

/// Request payload of the sign-in capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    /// Provider-issued credential (e.g. an ID token)
    pub credential: String,
    /// Which provider issued the credential
    pub provider: SocialProvider,
}

/// Claims extracted from a verified provider credential
#[derive(Debug, Clone, Default)]
pub struct IdentityClaims {
    /// Provider-scoped subject identifier
    pub subject: String,
    /// Email claim, when present
    pub email: Option<String>,
    /// Display-name claim, when present
    pub name: Option<String>,
    /// Avatar URL claim, when present
    pub picture: Option<String>,
}

/// Identity-provider token verification. External collaborator: the core
/// only requires that a credential yields claims or an error.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Validate the credential and extract its claims
    async fn verify(&self, credential: &str) -> Result<IdentityClaims>;
}

/// Input to an authorization decision
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput {
    /// Domain the action targets, e.g. `identity:users`
    pub domain: String,
    /// Action being attempted
    pub action: String,
    /// Claims of the caller
    pub claims: serde_json::Value,
}

/// Authorization policy evaluation. External collaborator: rule content
/// lives outside the core, which only consumes the boolean decision.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Whether the described action is allowed
    async fn eval(&self, input: &PolicyInput) -> Result<bool>;
}

/// The capability surface of one identity instance
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Register a new user. Duplicate usernames are rejected.
    async fn register(&self, username: &str, name: &str, email: &str) -> Result<User>;

    /// Verify a one-time password and activate the user
    async fn otp_verify(&self, otp: &str, id: UserId) -> Result<User>;

    /// Sign in with a provider credential, creating the user on first
    /// sight of an unknown social subject
    async fn sign_in(&self, credential: &str, provider: SocialProvider) -> Result<User>;

    /// Bind an additional social account to an existing user
    async fn add_social_account(
        &self,
        credential: &str,
        provider: SocialProvider,
        id: UserId,
    ) -> Result<User>;

    /// Liveness probe
    async fn check_health(&self) -> Result<()>;

    /// Project a published `user_registered` event into the repository
    async fn user_registered(&self, event: &UserRegisteredEvent) -> Result<()>;

    /// Project a published `user_activated` event into the repository
    async fn user_activated(&self, event: &UserActivatedEvent) -> Result<()>;

    /// Project a published `user_social_account_added` event into the
    /// repository
    async fn user_social_account_added(&self, event: &UserSocialAccountAddedEvent) -> Result<()>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: IdentityService + ?Sized> IdentityService for Arc<T> {
    async fn register(&self, username: &str, name: &str, email: &str) -> Result<User> {
        (**self).register(username, name, email).await
    }

    async fn otp_verify(&self, otp: &str, id: UserId) -> Result<User> {
        (**self).otp_verify(otp, id).await
    }

    async fn sign_in(&self, credential: &str, provider: SocialProvider) -> Result<User> {
        (**self).sign_in(credential, provider).await
    }

    async fn add_social_account(
        &self,
        credential: &str,
        provider: SocialProvider,
        id: UserId,
    ) -> Result<User> {
        (**self).add_social_account(credential, provider, id).await
    }

    async fn check_health(&self) -> Result<()> {
        (**self).check_health().await
    }

    async fn user_registered(&self, event: &UserRegisteredEvent) -> Result<()> {
        (**self).user_registered(event).await
    }

    async fn user_activated(&self, event: &UserActivatedEvent) -> Result<()> {
        (**self).user_activated(event).await
    }

    async fn user_social_account_added(&self, event: &UserSocialAccountAddedEvent) -> Result<()> {
        (**self).user_social_account_added(event).await
    }
}

/// Local implementation of [`IdentityService`]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    verifiers: HashMap<SocialProvider, Arc<dyn CredentialVerifier>>,
    bus: Arc<dyn PubSub>,
}

impl UserService {
    /// Build the service around its collaborators. The bus is passed
    /// explicitly; there is no ambient global.
    pub fn new(users: Arc<dyn UserRepository>, bus: Arc<dyn PubSub>) -> Self {
        Self {
            users,
            verifiers: HashMap::new(),
            bus,
        }
    }

    /// Register a credential verifier for a provider
    pub fn with_verifier(
        mut self,
        provider: SocialProvider,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        self.verifiers.insert(provider, verifier);
        self
    }

    fn verifier(&self, provider: SocialProvider) -> Result<&Arc<dyn CredentialVerifier>> {
        self.verifiers
            .get(&provider)
            .ok_or(Error::ProviderNotSupported)
    }

    async fn notify(&self, user: &User) -> Result<()> {
        user.event_store().notify(self.bus.as_ref()).await
    }

    async fn sign_in_new_user(&self, claims: &IdentityClaims, provider: SocialProvider) -> Result<User> {
        let email = claims
            .email
            .as_deref()
            .ok_or(Error::ClaimNotFound("email"))?;
        let name = claims.name.as_deref().ok_or(Error::ClaimNotFound("name"))?;
        let username = email.split('@').next().unwrap_or(email);

        let mut user = User::new(username, name, email);
        user.add_social_account(provider, SocialId(claims.subject.clone()));

        self.notify(&user).await?;
        Ok(user)
    }
}

#[async_trait]
impl IdentityService for UserService {
    async fn register(&self, username: &str, name: &str, email: &str) -> Result<User> {
        match self.users.find_by_username(username).await {
            Ok(_) => return Err(Error::UserExists),
            Err(Error::UserNotFound) => {}
            Err(e) => return Err(e),
        }

        let user = User::new(username, name, email);
        self.notify(&user).await?;

        Ok(user)
    }

    async fn otp_verify(&self, _otp: &str, id: UserId) -> Result<User> {
        let mut user = self.users.find(id).await?;

        // TODO: verify the one-time password against the issued challenge
        user.activate();
        self.notify(&user).await?;

        Ok(user)
    }

    async fn sign_in(&self, credential: &str, provider: SocialProvider) -> Result<User> {
        let verifier = self.verifier(provider)?;
        let claims = verifier.verify(credential).await?;

        let social_id = SocialId(claims.subject.clone());
        let mut user = match self.users.find_by_social_id(&social_id).await {
            Ok(user) => user,
            Err(Error::UserNotFound) => self.sign_in_new_user(&claims, provider).await?,
            Err(e) => return Err(e),
        };

        if let Some(picture) = &claims.picture {
            user.avatar = picture.clone();
        }

        Ok(user)
    }

    async fn add_social_account(
        &self,
        credential: &str,
        provider: SocialProvider,
        id: UserId,
    ) -> Result<User> {
        let mut user = self.users.find(id).await?;

        let verifier = self.verifier(provider)?;
        let claims = verifier.verify(credential).await?;

        let social_id = SocialId(claims.subject.clone());
        match self.users.find_by_social_id(&social_id).await {
            Ok(_) => return Err(Error::AccountExists),
            Err(Error::UserNotFound) => {}
            Err(e) => return Err(e),
        }

        user.add_social_account(provider, social_id);
        self.notify(&user).await?;

        Ok(user)
    }

    async fn check_health(&self) -> Result<()> {
        debug!(service = "identity", "health check");
        Ok(())
    }

    async fn user_registered(&self, event: &UserRegisteredEvent) -> Result<()> {
        self.users.store(&event.user).await
    }

    async fn user_activated(&self, event: &UserActivatedEvent) -> Result<()> {
        let mut user = self.users.find(event.base.user_id).await?;

        user.status = event.status;
        user.updated_at = event.base.occurred_at;

        self.users.store(&user).await
    }

    async fn user_social_account_added(&self, event: &UserSocialAccountAddedEvent) -> Result<()> {
        let mut user = self.users.find(event.base.user_id).await?;

        user.accounts.push(event.account.clone());
        user.updated_at = event.base.occurred_at;

        self.users.store(&user).await
    }
}

/// Logging middleware for [`IdentityService`]
pub struct LoggingService<S> {
    next: S,
}

impl<S: IdentityService> LoggingService<S> {
    /// Wrap a service so every capability call is logged
    pub fn new(next: S) -> Self {
        Self { next }
    }
}

#[async_trait]
impl<S: IdentityService> IdentityService for LoggingService<S> {
    async fn register(&self, username: &str, name: &str, email: &str) -> Result<User> {
        match self.next.register(username, name, email).await {
            Ok(user) => {
                info!(action = "register", username = %user.username, "user registered");
                Ok(user)
            }
            Err(e) => {
                error!(action = "register", error = %e);
                Err(e)
            }
        }
    }

    async fn otp_verify(&self, otp: &str, id: UserId) -> Result<User> {
        match self.next.otp_verify(otp, id).await {
            Ok(user) => {
                info!(action = "otp_verify", user_id = %id, username = %user.username, "verified");
                Ok(user)
            }
            Err(e) => {
                error!(action = "otp_verify", user_id = %id, error = %e);
                Err(e)
            }
        }
    }

    async fn sign_in(&self, credential: &str, provider: SocialProvider) -> Result<User> {
        match self.next.sign_in(credential, provider).await {
            Ok(user) => {
                info!(
                    action = "signin",
                    provider = %provider,
                    user_id = %user.id,
                    username = %user.username,
                    "user signed in"
                );
                Ok(user)
            }
            Err(e) => {
                error!(action = "signin", provider = %provider, error = %e);
                Err(e)
            }
        }
    }

    async fn add_social_account(
        &self,
        credential: &str,
        provider: SocialProvider,
        id: UserId,
    ) -> Result<User> {
        match self.next.add_social_account(credential, provider, id).await {
            Ok(user) => {
                info!(action = "add_social_account", provider = %provider, user_id = %id, "account added");
                Ok(user)
            }
            Err(e) => {
                error!(action = "add_social_account", provider = %provider, user_id = %id, error = %e);
                Err(e)
            }
        }
    }

    async fn check_health(&self) -> Result<()> {
        self.next.check_health().await
    }

    async fn user_registered(&self, event: &UserRegisteredEvent) -> Result<()> {
        self.next.user_registered(event).await
    }

    async fn user_activated(&self, event: &UserActivatedEvent) -> Result<()> {
        self.next.user_activated(event).await
    }

    async fn user_social_account_added(&self, event: &UserSocialAccountAddedEvent) -> Result<()> {
        self.next.user_social_account_added(event).await
    }
}
