//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use contactdesk::data::ProviderIdentity;
use contactdesk::error::AppError;
use contactdesk::{AppState, auth::IdentityProvider, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Authorization code the fake provider accepts
pub const GOOD_CODE: &str = "good-code";

/// Provider id of the identity returned for [`GOOD_CODE`]
pub const FAKE_PROVIDER_ID: &str = "fb-1001";

/// Identity provider that never leaves the process
pub struct FakeProvider;

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://identity.test/dialog/oauth?client_id=test-app&state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<ProviderIdentity, AppError> {
        if code != GOOD_CODE {
            return Err(AppError::AuthExchange(format!("unknown code {code}")));
        }

        Ok(ProviderIdentity {
            provider_id: FAKE_PROVIDER_ID.to_string(),
            display_name: "Ada Lovelace".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            image_url: None,
        })
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    /// Client that does not follow redirects and keeps no cookies
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost:3000".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
                facebook: config::FacebookOAuthConfig {
                    app_id: "test-app".to_string(),
                    app_secret: "test-app-secret".to_string(),
                    dialog_url: "https://identity.test/dialog/oauth".to_string(),
                    graph_url: "https://identity.test/graph".to_string(),
                },
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::with_provider(config, Arc::new(FakeProvider))
            .await
            .unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = contactdesk::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Start a login and return the session cookie plus the CSRF state
    /// handed to the provider
    pub async fn begin_login(&self) -> (String, String) {
        let response = self
            .client
            .get(self.url("/auth/facebook"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_redirection());

        let cookie = session_cookie(&response).expect("login start sets a session cookie");
        let location = location(&response);
        let state = url::Url::parse(&location)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state in authorize URL");

        (cookie, state)
    }

    /// Run the whole login flow and return the signed-in session cookie
    pub async fn login(&self) -> String {
        let (cookie, state) = self.begin_login().await;

        let response = self
            .client
            .get(self.url("/auth/facebook/callback"))
            .query(&[("code", GOOD_CODE), ("state", state.as_str())])
            .header("cookie", &cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(location(&response), "/profile");

        session_cookie(&response).expect("login rotates the session cookie")
    }

    /// Id of the stored session a `sid=...` cookie names
    pub fn session_id(&self, cookie: &str) -> String {
        let token = cookie.strip_prefix("sid=").expect("sid cookie");
        contactdesk::auth::verify_session_token(token, &self.state.config.auth.session_secret)
            .unwrap()
    }

    /// GET a path carrying the given cookie header
    pub async fn get_with_cookie(&self, path: &str, cookie: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("cookie", cookie)
            .send()
            .await
            .unwrap()
    }
}

/// `sid=...` pair from the response's Set-Cookie headers, if any
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("sid="))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

/// Raw Set-Cookie header for the session cookie, attributes included
pub fn session_set_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("sid="))
        .map(str::to_string)
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}
