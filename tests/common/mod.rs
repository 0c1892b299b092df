//! Shared fixtures for the HTTP integration tests

#![allow(dead_code)]

use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use story_api::prelude::*;

pub const PASSWORD: &str = "password";

/// A running test server and the host behind it
pub struct TestApp {
    pub server: TestServer,
    pub host: Arc<ServerHost>,
}

/// Authenticated identity: profile and bearer token
pub struct Session {
    pub user: Value,
    pub token: String,
}

impl Session {
    pub fn id(&self) -> &str {
        self.user["_id"].as_str().unwrap_or_default()
    }
}

/// Argon2 with minimal costs keeps the suite fast
pub fn cheap_hasher() -> Argon2Hasher {
    Argon2Hasher::with_costs(8, 1, 1).expect("valid argon2 params")
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(ServerBuilder::new().with_store(InMemoryStore::new()))
}

pub fn create_test_app_with(builder: ServerBuilder) -> TestApp {
    let host = Arc::new(
        builder
            .with_hasher(cheap_hasher())
            .register_default_resources()
            .build_host()
            .expect("Failed to build host"),
    );
    let server = TestServer::new(build_router(host.clone()));
    TestApp { server, host }
}

/// Unique email per call
pub fn next_email() -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("test@domain{}.com", COUNTER.fetch_add(1, Ordering::SeqCst))
}

impl TestApp {
    pub fn services(&self) -> &Services {
        &self.host.services
    }

    /// Save a user straight through the store
    pub async fn create_user(&self, admin: bool, quota: Option<u64>) -> User {
        let mut user = User::new(next_email(), PASSWORD)
            .with_admin(admin)
            .with_quota(quota);
        user.save(self.services()).await.expect("Failed to save user");
        user
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Session {
        let response = self
            .server
            .post("/api/auth")
            .json(&json!({"email": email, "password": password}))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        Session {
            user: body["user"].clone(),
            token: body["token"].as_str().unwrap_or_default().to_string(),
        }
    }

    pub async fn create_user_and_authenticate(&self, quota: Option<u64>) -> Session {
        let user = self.create_user(false, quota).await;
        self.authenticate(user.email.as_deref().unwrap_or_default(), PASSWORD)
            .await
    }

    pub async fn create_admin_and_authenticate(&self) -> Session {
        let user = self.create_user(true, None).await;
        self.authenticate(user.email.as_deref().unwrap_or_default(), PASSWORD)
            .await
    }

    /// Create a story through the API, returning its JSON
    pub async fn post_story(&self, session: &Session, body: &str) -> Value {
        let response = self
            .server
            .post("/api/stories")
            .authorization_bearer(&session.token)
            .json(&json!({"body": body}))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.services()
            .store
            .count(collection, &Filter::new())
            .await
            .expect("count failed")
    }
}
