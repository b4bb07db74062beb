//! Identity provider integration: OAuth authorization-code flow with PKCE and token resolution.

use std::{env, sync::Arc};

use futures::future::BoxFuture;
use rand::{Rng, distr::Alphanumeric};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

const CODE_VERIFIER_LEN: usize = 64;
const DEFAULT_PROVIDER: &str = "google";

/// Failures reported by an [`IdentityProvider`].
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No identity service configured on the server.
    #[error("authentication is not configured")]
    NotConfigured,
    /// The access token is unknown, expired or revoked.
    #[error("session is invalid or expired")]
    InvalidToken,
    /// The authorization code could not be exchanged.
    #[error("sign-in was rejected by the identity provider ({status})")]
    ExchangeRejected {
        /// HTTP status returned by the provider.
        status: StatusCode,
    },
    /// The configured base URL cannot be used to build requests.
    #[error("invalid identity service URL `{url}`")]
    InvalidBaseUrl {
        /// Offending URL.
        url: String,
    },
    /// The request could not be sent.
    #[error("failed to reach identity service")]
    RequestSend {
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The provider answered with an unexpected status.
    #[error("unexpected identity service response status {status}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
    },
    /// The response payload could not be decoded.
    #[error("failed to decode identity service response")]
    DecodeResponse {
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
}

/// User resolved from a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Stable user identifier; every record is scoped by it.
    pub id: String,
    /// Contact e-mail, when the provider shares it.
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued by a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionTokens {
    /// Bearer token used on subsequent requests.
    pub access_token: String,
    /// Token used to renew the session.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Signed-in user.
    pub user: AuthenticatedUser,
}

/// Browser session establishment and the "who is calling" lookup.
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to in order to sign in.
    fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> Result<String, IdentityError>;
    /// Exchange the authorization code returned on the callback.
    fn exchange_code(
        &self,
        code: String,
        code_verifier: String,
    ) -> BoxFuture<'static, Result<SessionTokens, IdentityError>>;
    /// Resolve the user owning an access token.
    fn resolve_user(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, Result<AuthenticatedUser, IdentityError>>;
    /// Revoke the session behind an access token.
    fn sign_out(&self, access_token: String) -> BoxFuture<'static, Result<(), IdentityError>>;
}

/// Random PKCE code verifier. With the `plain` method the challenge equals the verifier.
pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// [`IdentityProvider`] backed by a GoTrue-compatible HTTP identity service.
#[derive(Clone)]
pub struct GoTrueIdentity {
    client: Client,
    base_url: Arc<str>,
    anon_key: Arc<str>,
    provider: Arc<str>,
}

impl GoTrueIdentity {
    /// Create a provider for the service rooted at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            anon_key: Arc::from(anon_key.into()),
            provider: Arc::from(provider.into()),
        }
    }

    /// Build from `AUTH_BASE_URL`, `AUTH_ANON_KEY` and `AUTH_PROVIDER`; `None` when unset.
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("AUTH_BASE_URL").ok()?;
        let anon_key = env::var("AUTH_ANON_KEY").ok()?;
        let provider = env::var("AUTH_PROVIDER").unwrap_or_else(|_| DEFAULT_PROVIDER.to_owned());
        Some(Self::new(base_url, anon_key, provider))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn exchange(&self, code: String, code_verifier: String) -> Result<SessionTokens, IdentityError> {
        let url = self.endpoint("token");
        let response = self
            .client
            .post(&url)
            .query(&[("grant_type", "pkce")])
            .header("apikey", self.anon_key.as_ref())
            .json(&json!({ "auth_code": code, "code_verifier": code_verifier }))
            .send()
            .await
            .map_err(|source| IdentityError::RequestSend { source })?;

        let status = response.status();
        if status.is_client_error() {
            warn!(%status, "authorization code exchange rejected");
            return Err(IdentityError::ExchangeRejected { status });
        }
        if !status.is_success() {
            return Err(IdentityError::UnexpectedStatus { status });
        }

        response
            .json::<SessionTokens>()
            .await
            .map_err(|source| IdentityError::DecodeResponse { source })
    }

    async fn user(&self, access_token: String) -> Result<AuthenticatedUser, IdentityError> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", self.anon_key.as_ref())
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|source| IdentityError::RequestSend { source })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidToken),
            status if status.is_success() => response
                .json::<AuthenticatedUser>()
                .await
                .map_err(|source| IdentityError::DecodeResponse { source }),
            status => Err(IdentityError::UnexpectedStatus { status }),
        }
    }

    async fn logout(&self, access_token: String) -> Result<(), IdentityError> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", self.anon_key.as_ref())
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|source| IdentityError::RequestSend { source })?;

        match response.status() {
            // Already revoked sessions count as signed out.
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(IdentityError::UnexpectedStatus { status }),
        }
    }
}

impl IdentityProvider for GoTrueIdentity {
    fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> Result<String, IdentityError> {
        let endpoint = self.endpoint("authorize");
        let url = Url::parse_with_params(
            &endpoint,
            &[
                ("provider", self.provider.as_ref()),
                ("redirect_to", redirect_to),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "plain"),
            ],
        )
        .map_err(|_| IdentityError::InvalidBaseUrl { url: endpoint })?;
        debug!(provider = %self.provider, "built authorize URL");
        Ok(url.into())
    }

    fn exchange_code(
        &self,
        code: String,
        code_verifier: String,
    ) -> BoxFuture<'static, Result<SessionTokens, IdentityError>> {
        let identity = self.clone();
        Box::pin(async move { identity.exchange(code, code_verifier).await })
    }

    fn resolve_user(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, Result<AuthenticatedUser, IdentityError>> {
        let identity = self.clone();
        Box::pin(async move { identity.user(access_token).await })
    }

    fn sign_out(&self, access_token: String) -> BoxFuture<'static, Result<(), IdentityError>> {
        let identity = self.clone();
        Box::pin(async move { identity.logout(access_token).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_verifier_is_long_and_alphanumeric() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), CODE_VERIFIER_LEN);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn authorize_url_carries_encoded_parameters() {
        let identity = GoTrueIdentity::new("https://id.example.com/", "anon", "google");
        let url = identity
            .authorize_url("https://app.example.com/auth/callback?next=/matches", "abc")
            .unwrap();

        assert!(url.starts_with("https://id.example.com/auth/v1/authorize?"));
        assert!(url.contains("provider=google"));
        assert!(url.contains("code_challenge=abc"));
        assert!(url.contains("code_challenge_method=plain"));
        assert!(url.contains("redirect_to=https%3A%2F%2Fapp.example.com%2Fauth%2Fcallback%3Fnext%3D%2Fmatches"));
    }
}
