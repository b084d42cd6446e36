// Copyright 2025 Cowboy AI, LLC.

//! Bus RPC codec and server-side handlers
//!
//! Client side: [`SignInFactory`] resolves a callable sign-in endpoint
//! for a peer, caching one broker connection per `(address, port)`.
//! Server side: handlers decode requests off the bus, invoke the local
//! service and answer with the [`Reply`] envelope, or fan published
//! domain events into the service's event handlers.

use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::TransportError;
use crate::errors::Result;
use crate::proxy::SignInEndpoint;
use crate::pubsub::{handler, Message, MessageHandler};
use crate::reply::Reply;
use crate::service::{IdentityService, SignInRequest};
use crate::user::{
    EventName, User, UserActivatedEvent, UserRegisteredEvent, UserSocialAccountAddedEvent,
};

/// How long a request waits for its reply
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves sign-in endpoints for peers, reusing one underlying bus
/// connection per distinct `(address, port)`.
#[derive(Default)]
pub struct SignInFactory {
    connections: Mutex<HashMap<String, Client>>,
}

impl SignInFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the sign-in endpoint for a peer instance. Requests address
    /// `<request_prefix>.signin`, the peer's direct topic namespace.
    pub async fn endpoint(
        &self,
        address: &str,
        port: u16,
        request_prefix: &str,
    ) -> std::result::Result<Arc<dyn SignInEndpoint>, TransportError> {
        let key = format!("{address}:{port}");

        let mut connections = self.connections.lock().await;
        let client = match connections.get(&key) {
            Some(client) => client.clone(),
            None => {
                let url = format!("nats://{key}");
                let client = async_nats::connect(&url)
                    .await
                    .map_err(|e| TransportError::ConnectionFailed(format!("{url}: {e}")))?;

                debug!(peer = %key, "bus connection established");
                connections.insert(key, client.clone());
                client
            }
        };

        Ok(Arc::new(NatsSignIn {
            client,
            subject: format!("{request_prefix}.signin"),
        }))
    }
}

struct NatsSignIn {
    client: Client,
    subject: String,
}

#[async_trait]
impl SignInEndpoint for NatsSignIn {
    async fn call(&self, request: SignInRequest) -> Result<User> {
        let payload =
            serde_json::to_vec(&request).map_err(|e| TransportError::Encode(e.to_string()))?;

        let outcome = tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.client
                .request(self.subject.clone(), Bytes::from(payload)),
        )
        .await
        .map_err(|_| TransportError::RequestTimeout)?;

        let reply = outcome.map_err(|e| match e.kind() {
            async_nats::RequestErrorKind::TimedOut => TransportError::RequestTimeout,
            _ => TransportError::RequestFailed(e.to_string()),
        })?;

        let envelope: Reply = serde_json::from_slice(&reply.payload)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(envelope.decode::<User>()?)
    }
}

async fn respond_reply(msg: &Message, reply: Reply) -> anyhow::Result<()> {
    let bytes = reply.to_bytes()?;
    msg.respond(Bytes::from(bytes)).await?;
    Ok(())
}

/// Handler answering sign-in requests published to this instance
pub fn sign_in_handler(svc: Arc<dyn IdentityService>) -> MessageHandler {
    handler(move |msg| {
        let svc = Arc::clone(&svc);
        async move {
            let request: SignInRequest = match serde_json::from_slice(&msg.data) {
                Ok(request) => request,
                Err(e) => return respond_reply(&msg, Reply::failure(e)).await,
            };

            match svc.sign_in(&request.credential, request.provider).await {
                Ok(user) => {
                    let reply = Reply::success("user signed in").with_data(&user)?;
                    respond_reply(&msg, reply).await
                }
                Err(e) => respond_reply(&msg, Reply::failure(e)).await,
            }
        }
    })
}

/// Handler consuming published user events from the durable stream and
/// projecting them through the service. A decode or projection error is
/// returned so the message stays unacknowledged for redelivery.
pub fn event_handler(svc: Arc<dyn IdentityService>) -> MessageHandler {
    handler(move |msg| {
        let svc = Arc::clone(&svc);
        async move {
            let segments: Vec<&str> = msg.topic.split('.').collect();
            let ["users", _, suffix] = segments.as_slice() else {
                anyhow::bail!("invalid event topic: {}", msg.topic);
            };

            match EventName::from_suffix(suffix) {
                Some(EventName::UserRegistered) => {
                    let event: UserRegisteredEvent = serde_json::from_slice(&msg.data)?;
                    svc.user_registered(&event).await?;
                }
                Some(EventName::UserActivated) => {
                    let event: UserActivatedEvent = serde_json::from_slice(&msg.data)?;
                    svc.user_activated(&event).await?;
                }
                Some(EventName::UserSocialAccountAdded) => {
                    let event: UserSocialAccountAddedEvent = serde_json::from_slice(&msg.data)?;
                    svc.user_social_account_added(&event).await?;
                }
                None => anyhow::bail!("invalid event topic: {}", msg.topic),
            }

            Ok(())
        }
    })
}

/// Handler answering direct health probes
pub fn check_health_handler(svc: Arc<dyn IdentityService>) -> MessageHandler {
    handler(move |msg| {
        let svc = Arc::clone(&svc);
        async move {
            match svc.check_health().await {
                Ok(()) => msg.respond(Bytes::from_static(b"ok")).await?,
                Err(e) => msg.respond(Bytes::from(e.to_string())).await?,
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::pubsub::Replier;
    use crate::user::{SocialProvider, UserId};
    use std::sync::Mutex as StdMutex;

    struct StubService {
        calls: StdMutex<Vec<String>>,
        fail_sign_in: bool,
    }

    impl StubService {
        fn new(fail_sign_in: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                fail_sign_in,
            })
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdentityService for StubService {
        async fn register(&self, username: &str, name: &str, email: &str) -> Result<User> {
            Ok(User::new(username, name, email))
        }

        async fn otp_verify(&self, _otp: &str, _id: UserId) -> Result<User> {
            Err(Error::UserNotFound)
        }

        async fn sign_in(&self, _credential: &str, _provider: SocialProvider) -> Result<User> {
            self.record("sign_in");
            if self.fail_sign_in {
                Err(Error::ProviderNotSupported)
            } else {
                Ok(User::new("remote", "Remote", "remote@example.com"))
            }
        }

        async fn add_social_account(
            &self,
            _credential: &str,
            _provider: SocialProvider,
            _id: UserId,
        ) -> Result<User> {
            Err(Error::UserNotFound)
        }

        async fn check_health(&self) -> Result<()> {
            Ok(())
        }

        async fn user_registered(&self, _event: &UserRegisteredEvent) -> Result<()> {
            self.record("user_registered");
            Ok(())
        }

        async fn user_activated(&self, _event: &UserActivatedEvent) -> Result<()> {
            self.record("user_activated");
            Ok(())
        }

        async fn user_social_account_added(
            &self,
            _event: &UserSocialAccountAddedEvent,
        ) -> Result<()> {
            self.record("user_social_account_added");
            Ok(())
        }
    }

    fn capture_replier() -> (Replier, tokio::sync::mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let replier: Replier = Arc::new(move |data| {
            let tx = tx.clone();
            Box::pin(async move {
                tx.send(data).ok();
                Ok(())
            })
        });
        (replier, rx)
    }

    #[tokio::test]
    async fn sign_in_handler_replies_success_envelope() {
        let svc = StubService::new(false);
        let handle = sign_in_handler(svc.clone());

        let request = SignInRequest {
            credential: "token".into(),
            provider: SocialProvider::Google,
        };
        let (replier, mut rx) = capture_replier();
        let msg = Message::new(
            "identity.svc-1.signin",
            Bytes::from(serde_json::to_vec(&request).unwrap()),
        )
        .with_replier(replier);

        handle(msg).await.unwrap();

        let reply: Reply = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        let user: User = reply.decode().unwrap();
        assert_eq!(user.username, "remote");
        assert_eq!(svc.calls(), vec!["sign_in"]);
    }

    #[tokio::test]
    async fn sign_in_handler_replies_failure_envelope() {
        let svc = StubService::new(true);
        let handle = sign_in_handler(svc);

        let request = SignInRequest {
            credential: "token".into(),
            provider: SocialProvider::Line,
        };
        let (replier, mut rx) = capture_replier();
        let msg = Message::new(
            "identity.svc-1.signin",
            Bytes::from(serde_json::to_vec(&request).unwrap()),
        )
        .with_replier(replier);

        handle(msg).await.unwrap();

        let reply: Reply = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        let err = reply.decode::<User>().unwrap_err();
        match err {
            TransportError::Remote(msg) => assert_eq!(msg, "provider not supported"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn event_handler_dispatches_by_topic_suffix() {
        let svc = StubService::new(false);
        let handle = event_handler(svc.clone());

        let user = User::new("mirror", "Mirror", "mirror@example.com");
        let event = &user.event_store().events()[0];
        let payload = serde_json::to_vec(event).unwrap();

        let msg = Message::new(
            format!("users.{}.registered", user.id),
            Bytes::from(payload),
        );
        handle(msg).await.unwrap();

        assert_eq!(svc.calls(), vec!["user_registered"]);
    }

    #[tokio::test]
    async fn event_handler_rejects_malformed_topics() {
        let svc = StubService::new(false);
        let handle = event_handler(svc.clone());

        let msg = Message::new("orders.42.created", Bytes::from_static(b"{}"));
        assert!(handle(msg).await.is_err());

        let msg = Message::new("users.42.renamed", Bytes::from_static(b"{}"));
        assert!(handle(msg).await.is_err());

        assert!(svc.calls().is_empty());
    }

    #[tokio::test]
    async fn check_health_handler_answers_ok() {
        let svc = StubService::new(false);
        let handle = check_health_handler(svc);

        let (replier, mut rx) = capture_replier();
        let msg = Message::new("identity.svc-1.health", Bytes::new()).with_replier(replier);

        handle(msg).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"ok"));
    }
}
