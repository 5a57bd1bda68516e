#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use medialog::clock::{Clock, ManualClock};
use medialog::configuration::{
    ApplicationSettings, DatabaseSettings, JwtSettings, SessionSettings, Settings,
};
use medialog::database::MemoryStore;
use medialog::startup::{run, AppServices};
use serde_json::{json, Value};

pub const ACCESS_TOKEN_EXPIRY: i64 = 3600;
pub const REFRESH_TOKEN_EXPIRY: i64 = 5_184_000;

pub struct TestApp {
    pub address: String,
    pub clock: ManualClock,
    pub store: Arc<MemoryStore>,
    pub api_client: reqwest::Client,
}

pub fn test_settings() -> Settings {
    Settings {
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            in_memory_store: true,
        },
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "medialog".to_string(),
        },
        jwt: JwtSettings {
            secret: "integration-test-secret".to_string(),
            issuer: "medialog".to_string(),
            access_token_expiry: ACCESS_TOKEN_EXPIRY,
            refresh_token_expiry: REFRESH_TOKEN_EXPIRY,
            leeway_seconds: 0,
        },
        session: SessionSettings {
            password_hash_cost: 4,
            ..SessionSettings::default()
        },
    }
}

pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryStore::new());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let services = AppServices::build(&test_settings(), store.clone(), shared_clock)
        .expect("Failed to build services");
    let server = run(listener, services).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        clock,
        store,
        api_client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/users", &self.address))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": password,
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/auth/login", &self.address))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register and log in, returning the login body.
    pub async fn signed_in(&self, username: &str, password: &str) -> Value {
        assert_eq!(201, self.register(username, password).await.status().as_u16());
        let response = self.login(username, password).await;
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse login response")
    }

    pub async fn post_with_bearer(&self, path: &str, token: &str) -> reqwest::Response {
        self.api_client
            .post(&format!("{}{}", &self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_me(&self, access_token: &str) -> reqwest::Response {
        self.api_client
            .get(&format!("{}/users/me", &self.address))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub fn token(body: &Value, field: &str) -> String {
    body[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing {} in {}", field, body))
        .to_string()
}
