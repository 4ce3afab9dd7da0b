//! Shared harness: the real server on a random port, backed by in-memory stores

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use reqwest::Response;
use serde_json::{json, Value};
use user_accounts::configuration::{get_configuration, Settings};
use user_accounts::startup::{run, AppState};
use user_accounts::store::{InMemoryRevocationRegistry, InMemoryUserStore};

pub const COOKIE_NAME: &str = "refresh_token";

pub struct TestApp {
    pub address: String,
    pub settings: Settings,
    pub revocations: Arc<InMemoryRevocationRegistry>,
    pub client: reqwest::Client,
}

pub fn test_settings() -> Settings {
    let mut settings = get_configuration().expect("Failed to read configuration.");
    settings.password.hash_cost = 4;
    settings.cookie.secure = false;
    settings.cookie.name = COOKIE_NAME.to_string();
    settings.jwt.secret = "integration-test-secret-that-is-long-enough".to_string();
    settings.jwt.rotate_refresh_tokens = true;
    settings
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_settings())
}

pub fn spawn_app_with(settings: Settings) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let users = Arc::new(InMemoryUserStore::new());
    let revocations = Arc::new(InMemoryRevocationRegistry::new());
    let state = AppState::new(&settings, users, revocations.clone())
        .expect("Failed to build application state");

    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        settings,
        revocations,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn register(&self, email: &str, password: &str) -> Response {
        self.post_json(
            "/register",
            &json!({ "email": email, "userName": "Test User", "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.post_json("/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// POST to a cookie-driven endpoint, optionally presenting a refresh token
    pub async fn post_with_cookie(&self, path: &str, refresh_token: Option<&str>) -> Response {
        let mut request = self.client.post(self.url(path));
        if let Some(token) = refresh_token {
            request = request.header("Cookie", format!("{}={}", COOKIE_NAME, token));
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn refresh(&self, refresh_token: Option<&str>) -> Response {
        self.post_with_cookie("/refresh", refresh_token).await
    }

    pub async fn logout(&self, refresh_token: Option<&str>) -> Response {
        self.post_with_cookie("/logout", refresh_token).await
    }

    /// Register and log in; returns (access token, refresh token)
    pub async fn signed_in(&self, email: &str, password: &str) -> (String, String) {
        assert_eq!(201, self.register(email, password).await.status().as_u16());

        let response = self.login(email, password).await;
        assert_eq!(200, response.status().as_u16());

        let refresh_token = refresh_cookie(&response).expect("login must set the refresh cookie");
        let body: Value = response.json().await.unwrap();
        let access_token = body["access_token"].as_str().unwrap().to_string();
        (access_token, refresh_token)
    }
}

/// The raw `Set-Cookie` header for the refresh token, if any
pub fn set_cookie_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{}=", COOKIE_NAME)))
        .map(str::to_string)
}

/// The refresh token value from `Set-Cookie`, if a non-empty one was set
pub fn refresh_cookie(response: &Response) -> Option<String> {
    let header = set_cookie_header(response)?;
    let pair = header.split(';').next()?;
    let value = pair.split_once('=')?.1.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub async fn error_code(response: Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse error body");
    assert_eq!(body["success"], false);
    body["code"].as_str().unwrap_or_default().to_string()
}
