// Copyright 2025 Cowboy AI, LLC.

//! Shared test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Mutex;

use cim_identity::pubsub::MessageHandler;
use cim_identity::{
    CredentialVerifier, IdentityClaims, PubSub, PubSubError, Result, SignInEndpoint,
    SignInRequest, User,
};

/// Bus double recording every publish, optionally failing chosen topics
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<(String, Bytes)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_topic(&self, topic: &str) {
        self.failing.lock().unwrap().insert(topic.to_string());
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_topics(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|(topic, _)| topic)
            .collect()
    }
}

#[async_trait]
impl PubSub for RecordingBus {
    async fn publish(&self, topic: &str, data: Bytes) -> std::result::Result<(), PubSubError> {
        if self.failing.lock().unwrap().contains(topic) {
            return Err(PubSubError::PublishFailed(format!("injected: {topic}")));
        }

        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), data));
        Ok(())
    }

    async fn subscribe(
        &self,
        _topic: &str,
        _handler: MessageHandler,
    ) -> std::result::Result<(), PubSubError> {
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), PubSubError> {
        Ok(())
    }
}

/// Verifier double returning fixed claims
pub struct StubVerifier {
    pub claims: IdentityClaims,
}

impl StubVerifier {
    pub fn new(subject: &str, email: &str, name: &str) -> Self {
        Self {
            claims: IdentityClaims {
                subject: subject.to_string(),
                email: Some(email.to_string()),
                name: Some(name.to_string()),
                picture: None,
            },
        }
    }
}

#[async_trait]
impl CredentialVerifier for StubVerifier {
    async fn verify(&self, _credential: &str) -> Result<IdentityClaims> {
        Ok(self.claims.clone())
    }
}

/// Sign-in endpoint double answering with a fixed username and counting
/// invocations
pub struct StubEndpoint {
    pub username: String,
    pub calls: Mutex<usize>,
}

impl StubEndpoint {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SignInEndpoint for StubEndpoint {
    async fn call(&self, _request: SignInRequest) -> Result<User> {
        *self.calls.lock().unwrap() += 1;
        Ok(User::new(
            self.username.clone(),
            self.username.clone(),
            format!("{}@example.com", self.username),
        ))
    }
}
