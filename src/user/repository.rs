// Copyright 2025 Cowboy AI, LLC.

//! User repository seam
//!
//! Persistence engines are external collaborators; the core only needs
//! store/find operations. The in-memory implementation backs tests and
//! single-node deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SocialId, User, UserId};
use crate::errors::{Error, Result};

/// Store and lookup operations the identity service requires
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a user snapshot
    async fn store(&self, user: &User) -> Result<()>;

    /// Find by aggregate id
    async fn find(&self, id: UserId) -> Result<User>;

    /// Find by unique username
    async fn find_by_username(&self, username: &str) -> Result<User>;

    /// Find the user a social account is bound to
    async fn find_by_social_id(&self, social_id: &SocialId) -> Result<User>;
}

#[derive(Default)]
struct Indexes {
    users: HashMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    socials: HashMap<SocialId, UserId>,
}

/// In-memory [`UserRepository`]
#[derive(Default)]
pub struct InMemoryUserRepository {
    state: RwLock<Indexes>,
}

impl InMemoryUserRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn store(&self, user: &User) -> Result<()> {
        let snapshot = user.detached();

        let mut state = self.state.write().await;
        state.usernames.insert(snapshot.username.clone(), snapshot.id);
        for account in &snapshot.accounts {
            state.socials.insert(account.social_id.clone(), snapshot.id);
        }
        state.users.insert(snapshot.id, snapshot);

        Ok(())
    }

    async fn find(&self, id: UserId) -> Result<User> {
        let state = self.state.read().await;
        state.users.get(&id).cloned().ok_or(Error::UserNotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<User> {
        let state = self.state.read().await;
        let id = state.usernames.get(username).ok_or(Error::UserNotFound)?;
        state.users.get(id).cloned().ok_or(Error::UserNotFound)
    }

    async fn find_by_social_id(&self, social_id: &SocialId) -> Result<User> {
        let state = self.state.read().await;
        let id = state.socials.get(social_id).ok_or(Error::UserNotFound)?;
        state.users.get(id).cloned().ok_or(Error::UserNotFound)
    }
}
