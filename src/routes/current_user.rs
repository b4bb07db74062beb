//! Request-level authentication: resolves the caller from a bearer token or the session cookie.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::warn;

use crate::{
    error::{AppError, ServiceError},
    services::identity::{AuthenticatedUser, IdentityError},
    state::SharedState,
};

pub(crate) const ACCESS_COOKIE: &str = "sabre_access";
pub(crate) const REFRESH_COOKIE: &str = "sabre_refresh";
pub(crate) const VERIFIER_COOKIE: &str = "sabre_pkce";

/// Authenticated caller of a request. Every record a handler touches is scoped by its id.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthenticatedUser);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state
            .identity()
            .ok_or(ServiceError::Identity(IdentityError::NotConfigured))?;
        let token = access_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("sign in required".into()))?;

        match identity.resolve_user(token).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(err) => {
                warn!(error = %err, "rejecting request with unresolvable access token");
                Err(AppError::Unauthorized("session is invalid or expired".into()))
            }
        }
    }
}

/// Access token from `Authorization: Bearer ...`, falling back to the session cookie.
pub(crate) fn access_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer
        .map(str::to_owned)
        .or_else(|| cookie_value(headers, ACCESS_COOKIE))
}

/// Value of the cookie `name`, searching every `Cookie` header.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sabre_access=cookie-token"));
        assert_eq!(access_token(&headers).as_deref(), Some("cookie-token"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(access_token(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn cookies_are_looked_up_by_exact_name() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sabre_access_old=x"),
        );
        headers.append(header::COOKIE, HeaderValue::from_static("sabre_pkce=abc123"));

        assert_eq!(cookie_value(&headers, VERIFIER_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, ACCESS_COOKIE), None);
        assert_eq!(access_token(&headers), None);
    }
}
