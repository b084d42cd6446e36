// Copyright 2025 Cowboy AI, LLC.

//! User aggregate
//!
//! The user is the unit of consistency and event emission. Mutation
//! methods change state and raise the matching domain event into the
//! aggregate's event buffer; callers drain the buffer onto the bus after
//! a successful mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::events::EventStore;

mod events;
mod repository;

pub use events::{
    EventBase, EventName, UserActivatedEvent, UserEvent, UserRegisteredEvent,
    UserSocialAccountAddedEvent,
};
pub use repository::{InMemoryUserRepository, UserRepository};

/// Aggregate-root identifier. UUIDv7, so creation time is recoverable
/// from the id itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Mint a fresh time-ordered id
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from the canonical string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Creation instant embedded in the id
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.0.get_timestamp().and_then(|ts| {
            let (secs, nanos) = ts.to_unix();
            DateTime::from_timestamp(secs as i64, nanos)
        })
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created but not yet registered
    Pending,
    /// Registered, awaiting activation
    Registered,
    /// Fully activated
    Activated,
    /// Temporarily locked out
    Locked,
    /// Permanently revoked
    Revoked,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Registered => "registered",
            Status::Activated => "activated",
            Status::Locked => "locked",
            Status::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

impl FromStr for Status {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "registered" => Ok(Status::Registered),
            "activated" => Ok(Status::Activated),
            "locked" => Ok(Status::Locked),
            "revoked" => Ok(Status::Revoked),
            other => Err(crate::Error::Validation(format!("invalid status: {other}"))),
        }
    }
}

/// Social sign-in provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    /// Google identity provider
    Google,
    /// Facebook identity provider
    Facebook,
    /// LINE identity provider
    Line,
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SocialProvider::Google => "google",
            SocialProvider::Facebook => "facebook",
            SocialProvider::Line => "line",
        };
        f.write_str(s)
    }
}

/// Provider-scoped subject identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocialId(pub String);

impl fmt::Display for SocialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SocialId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A social identity bound to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialAccount {
    /// Provider-scoped subject
    pub social_id: SocialId,
    /// Provider the account belongs to
    #[serde(rename = "social_provider")]
    pub provider: SocialProvider,
    /// When the binding was created
    pub created_at: DateTime<Utc>,
    /// Last modification of the binding
    pub updated_at: DateTime<Utc>,
}

impl SocialAccount {
    /// Bind a provider subject now
    pub fn new(provider: SocialProvider, social_id: SocialId) -> Self {
        let now = Utc::now();
        Self {
            social_id,
            provider,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Issued session token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque token value
    pub token: String,
    /// Expiry instant
    pub expired_at: Option<DateTime<Utc>>,
}

/// The user aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Aggregate-root id
    pub id: UserId,
    /// Unique login name
    pub username: String,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Lifecycle state
    pub status: Status,
    /// Bound social accounts
    #[serde(default)]
    pub accounts: Vec<SocialAccount>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: String,
    /// Issued token, if any
    #[serde(default)]
    pub token: Token,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    events: EventStore<UserEvent>,
}

impl User {
    /// Create and register a new user. Raises `user_registered`.
    pub fn new(username: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        let id = UserId::generate();
        let created_at = id.time().unwrap_or_else(Utc::now);

        let mut user = Self {
            id,
            username: username.into(),
            name: name.into(),
            email: email.into(),
            status: Status::Pending,
            accounts: Vec::new(),
            avatar: String::new(),
            token: Token::default(),
            created_at,
            updated_at: created_at,
            events: EventStore::new(),
        };

        user.register();
        user
    }

    /// The aggregate's event buffer
    pub fn event_store(&self) -> &EventStore<UserEvent> {
        &self.events
    }

    /// Mark registered. Raises `user_registered` with a full snapshot.
    pub fn register(&mut self) {
        self.status = Status::Registered;
        self.updated_at = Utc::now();

        let event = UserRegisteredEvent::new(self);
        self.events.add_event(UserEvent::Registered(event));
    }

    /// Mark activated. Raises `user_activated`.
    pub fn activate(&mut self) {
        self.status = Status::Activated;
        self.updated_at = Utc::now();

        let event = UserActivatedEvent::new(self, Status::Activated);
        self.events.add_event(UserEvent::Activated(event));
    }

    /// Bind a social account. Raises `user_social_account_added`.
    pub fn add_social_account(&mut self, provider: SocialProvider, social_id: SocialId) {
        let account = SocialAccount::new(provider, social_id);

        self.accounts.push(account.clone());
        self.updated_at = account.updated_at;

        let event = UserSocialAccountAddedEvent::new(self, account);
        self.events
            .add_event(UserEvent::SocialAccountAdded(event));
    }

    /// Copy of this user with an empty event buffer, for storage or for
    /// embedding in an event payload.
    pub(crate) fn detached(&self) -> User {
        let mut copy = self.clone();
        copy.events = EventStore::new();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DomainEvent;

    #[test]
    fn new_user_is_registered_with_one_event() {
        let user = User::new("mirror", "Mirror", "mirror@example.com");

        assert_eq!(user.status, Status::Registered);

        let events = user.event_store().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "user_registered");
        assert_eq!(events[0].topic(), format!("users.{}.registered", user.id));
    }

    #[test]
    fn mutations_raise_events_in_order() {
        let mut user = User::new("mirror", "Mirror", "mirror@example.com");
        user.activate();
        user.add_social_account(SocialProvider::Google, SocialId::from("g-123"));

        let names: Vec<&str> = user
            .event_store()
            .events()
            .iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "user_registered",
                "user_activated",
                "user_social_account_added"
            ]
        );
    }

    #[test]
    fn id_embeds_creation_time() {
        let user = User::new("mirror", "Mirror", "mirror@example.com");
        let stamp = user.id.time().expect("v7 ids carry a timestamp");
        assert!((Utc::now() - stamp).num_seconds().abs() < 5);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            Status::Pending,
            Status::Registered,
            Status::Activated,
            Status::Locked,
            Status::Revoked,
        ] {
            let parsed: Status = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("half-dead".parse::<Status>().is_err());
    }
}
