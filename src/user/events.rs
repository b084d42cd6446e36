// Copyright 2025 Cowboy AI, LLC.

//! User domain events
//!
//! Every event carries the flattened base `{domain, name, user_id,
//! occurred_at}` plus an event-specific payload: the full aggregate
//! snapshot on registration, the status on activation, the bound account
//! on addition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SocialAccount, Status, User, UserId};
use crate::events::DomainEvent;

/// Canonical names of the user events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    /// A user registered
    UserRegistered,
    /// A user was activated
    UserActivated,
    /// A social account was bound to a user
    UserSocialAccountAdded,
}

impl EventName {
    /// Canonical string form
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::UserRegistered => "user_registered",
            EventName::UserActivated => "user_activated",
            EventName::UserSocialAccountAdded => "user_social_account_added",
        }
    }

    /// Topic suffix: the name with the `user_` prefix stripped
    pub fn suffix(&self) -> &'static str {
        match self {
            EventName::UserRegistered => "registered",
            EventName::UserActivated => "activated",
            EventName::UserSocialAccountAdded => "social_account_added",
        }
    }

    /// Resolve an event name from a topic suffix
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "registered" => Some(EventName::UserRegistered),
            "activated" => Some(EventName::UserActivated),
            "social_account_added" => Some(EventName::UserSocialAccountAdded),
            _ => None,
        }
    }
}

/// Common fields of every user event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBase {
    /// Emitting domain, always `identity:users`
    pub domain: String,
    /// Event name
    pub name: EventName,
    /// Aggregate root the event belongs to
    pub user_id: UserId,
    /// When the aggregate mutation happened
    pub occurred_at: DateTime<Utc>,
}

impl EventBase {
    fn new(name: EventName, user: &User) -> Self {
        Self {
            domain: "identity:users".to_string(),
            name,
            user_id: user.id,
            occurred_at: user.updated_at,
        }
    }

    /// Bus subject this event publishes to
    pub fn topic(&self) -> String {
        format!("users.{}.{}", self.user_id, self.name.suffix())
    }
}

/// `user_registered`: carries the full aggregate snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisteredEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: EventBase,
    /// Snapshot of the registered user
    pub user: User,
}

impl UserRegisteredEvent {
    pub(super) fn new(user: &User) -> Self {
        Self {
            base: EventBase::new(EventName::UserRegistered, user),
            user: user.detached(),
        }
    }
}

/// `user_activated`: carries the new status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivatedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: EventBase,
    /// Status the user transitioned to
    pub status: Status,
}

impl UserActivatedEvent {
    pub(super) fn new(user: &User, status: Status) -> Self {
        Self {
            base: EventBase::new(EventName::UserActivated, user),
            status,
        }
    }
}

/// `user_social_account_added`: carries the bound account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSocialAccountAddedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: EventBase,
    /// The account that was bound
    pub account: SocialAccount,
}

impl UserSocialAccountAddedEvent {
    pub(super) fn new(user: &User, account: SocialAccount) -> Self {
        Self {
            base: EventBase::new(EventName::UserSocialAccountAdded, user),
            account,
        }
    }
}

/// Union of the user events, as buffered by the aggregate
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserEvent {
    /// See [`UserRegisteredEvent`]
    Registered(UserRegisteredEvent),
    /// See [`UserActivatedEvent`]
    Activated(UserActivatedEvent),
    /// See [`UserSocialAccountAddedEvent`]
    SocialAccountAdded(UserSocialAccountAddedEvent),
}

impl UserEvent {
    fn base(&self) -> &EventBase {
        match self {
            UserEvent::Registered(e) => &e.base,
            UserEvent::Activated(e) => &e.base,
            UserEvent::SocialAccountAdded(e) => &e.base,
        }
    }
}

impl DomainEvent for UserEvent {
    fn name(&self) -> &'static str {
        self.base().name.as_str()
    }

    fn topic(&self) -> String {
        self.base().topic()
    }
}
