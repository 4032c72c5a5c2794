//! OAuth2 credentials for the Meet REST API.
//!
//! Only the refresh-token grant is performed here. The consent URL is
//! generated for the user to visit; exchanging the resulting code is left
//! to whoever provisions `GOOGLE_REFRESH_TOKEN`.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::GoogleConfig;
use crate::error::{MeetError, MeetResult};

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/meetings.space.created",
    "https://www.googleapis.com/auth/meetings.space.readonly",
];

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    error_description: Option<String>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

pub struct GoogleAuth {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: String,
    refresh_token: Option<String>,
    token_endpoint: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn from_config(config: &GoogleConfig) -> Self {
        let auth = Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            refresh_token: config.refresh_token.clone(),
            token_endpoint: config
                .token_endpoint
                .clone()
                .unwrap_or_else(|| TOKEN_ENDPOINT.to_string()),
            cached: Mutex::new(None),
        };

        if auth.is_authenticated() {
            info!("Google credentials configured with refresh token");
        } else {
            info!("Google OAuth2 client has no refresh token; authenticate to use the Meet API");
        }

        auth
    }

    pub fn is_authenticated(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Consent URL requesting offline access to the Meet scopes.
    pub fn authorization_url(&self) -> MeetResult<String> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            MeetError::Authentication(
                "Google OAuth2 credentials not configured. Please set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET".to_string(),
            )
        })?;

        let scope = SCOPES.join(" ");
        let url = reqwest::Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", client_id),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| MeetError::Authentication(format!("Invalid authorization URL: {}", e)))?;

        Ok(url.to_string())
    }

    /// A bearer token for API calls, refreshed when within a minute of expiry.
    pub async fn access_token(&self) -> MeetResult<String> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or(MeetError::NotAuthenticated)?;

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        let (client_id, client_secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
            _ => {
                return Err(MeetError::Authentication(
                    "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required to refresh tokens"
                        .to_string(),
                ))
            }
        };

        debug!("Refreshing Google access token");

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Token refresh failed with status {}: {}", status, body);
            let reason = serde_json::from_str::<TokenError>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or(body);
            return Err(MeetError::Authentication(reason));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| MeetError::Authentication(format!("Malformed token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        info!("Obtained Google access token (valid {}s)", token.expires_in);
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GoogleConfig {
        GoogleConfig {
            client_id: Some("client-123.apps.googleusercontent.com".into()),
            client_secret: Some("secret".into()),
            ..GoogleConfig::default()
        }
    }

    #[test]
    fn test_authorization_url() {
        let auth = GoogleAuth::from_config(&config());
        let url = reqwest::Url::parse(&auth.authorization_url().unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/oauth2callback");
        assert!(params["scope"].contains("meetings.space.created"));
        assert!(params["scope"].contains("meetings.space.readonly"));
    }

    #[test]
    fn test_authorization_url_requires_client_id() {
        let auth = GoogleAuth::from_config(&GoogleConfig::default());
        assert!(auth.authorization_url().unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn test_access_token_without_refresh_token() {
        let auth = GoogleAuth::from_config(&config());
        assert!(!auth.is_authenticated());
        assert!(matches!(
            auth.access_token().await,
            Err(MeetError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_access_token_without_client_secret() {
        let auth = GoogleAuth::from_config(&GoogleConfig {
            refresh_token: Some("1//refresh".into()),
            ..GoogleConfig::default()
        });
        assert!(auth.is_authenticated());
        assert!(matches!(
            auth.access_token().await,
            Err(MeetError::Authentication(_))
        ));
    }
}
