//! Identity providers
//!
//! The OAuth 2.0 authorization code flow is delegated to an
//! [`IdentityProvider`] chosen at startup. [`FacebookProvider`] talks to the
//! Facebook dialog and Graph API.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::AppConfig;
use crate::data::ProviderIdentity;
use crate::error::AppError;

/// External OAuth provider able to authenticate a browser user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Consent screen URL the browser is redirected to
    ///
    /// # Arguments
    /// * `state` - CSRF state echoed back on the callback
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a verified identity
    ///
    /// # Errors
    /// Returns `AuthExchange` when the provider rejects the code or its
    /// answers cannot be understood
    async fn exchange(&self, code: &str) -> Result<ProviderIdentity, AppError>;
}

/// Facebook OAuth adapter
pub struct FacebookProvider {
    app_id: String,
    app_secret: String,
    dialog_url: String,
    graph_url: String,
    redirect_uri: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FacebookTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: String,
}

impl FacebookProvider {
    pub fn new(config: &AppConfig, http_client: reqwest::Client) -> Self {
        let facebook = &config.auth.facebook;
        Self {
            app_id: facebook.app_id.clone(),
            app_secret: facebook.app_secret.clone(),
            dialog_url: facebook.dialog_url.clone(),
            graph_url: facebook.graph_url.trim_end_matches('/').to_string(),
            redirect_uri: config.oauth_callback_url(),
            http_client,
        }
    }

    fn graph_endpoint(&self, path: &str) -> Result<Url, AppError> {
        Url::parse(&format!("{}/{}", self.graph_url, path))
            .map_err(|e| AppError::Config(format!("invalid auth.facebook.graph_url: {e}")))
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String, AppError> {
        let mut url = self.graph_endpoint("oauth/access_token")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("client_secret", &self.app_secret)
            .append_pair("code", code);

        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::AuthExchange(format!(
                "token endpoint answered {}",
                response.status()
            )));
        }

        let token: FacebookTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::AuthExchange(format!("malformed token response: {e}")))?;
        Ok(token.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<FacebookProfile, AppError> {
        let mut url = self.graph_endpoint("me")?;
        url.query_pairs_mut()
            .append_pair("fields", "id,name,email,first_name,last_name,picture")
            .append_pair("access_token", access_token);

        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::AuthExchange(format!(
                "profile endpoint answered {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::AuthExchange(format!("malformed profile response: {e}")))
    }
}

impl From<FacebookProfile> for ProviderIdentity {
    fn from(profile: FacebookProfile) -> Self {
        let display_name = profile
            .name
            .clone()
            .or_else(|| {
                let joined = [profile.first_name.as_deref(), profile.last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            })
            .unwrap_or_else(|| profile.id.clone());

        Self {
            provider_id: profile.id,
            display_name,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            image_url: profile.picture.map(|picture| picture.data.url),
        }
    }
}

/// Network failures talking to the provider count as failed exchanges
fn transport_as_exchange(error: AppError) -> AppError {
    match error {
        AppError::HttpClient(e) => AppError::AuthExchange(e.to_string()),
        other => other,
    }
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn name(&self) -> &'static str {
        "facebook"
    }

    fn authorize_url(&self, state: &str) -> String {
        match Url::parse(&self.dialog_url) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("client_id", &self.app_id)
                    .append_pair("redirect_uri", &self.redirect_uri)
                    .append_pair("state", state)
                    .append_pair("scope", "email")
                    .append_pair("response_type", "code");
                url.into()
            }
            Err(error) => {
                tracing::error!(%error, dialog_url = %self.dialog_url, "Invalid OAuth dialog URL");
                "/".to_string()
            }
        }
    }

    async fn exchange(&self, code: &str) -> Result<ProviderIdentity, AppError> {
        let access_token = self
            .fetch_access_token(code)
            .await
            .map_err(transport_as_exchange)?;
        let profile = self
            .fetch_profile(&access_token)
            .await
            .map_err(transport_as_exchange)?;

        Ok(profile.into())
    }
}
