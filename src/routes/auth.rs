use std::env;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect},
    routing::{get, post},
};
use reqwest::Url;
use tracing::{info, warn};

use crate::{
    dto::{
        ApiResponse,
        auth::{CallbackQuery, LoginQuery, UserView},
    },
    error::{AppError, ServiceError},
    routes::current_user::{
        ACCESS_COOKIE, CurrentUser, REFRESH_COOKIE, VERIFIER_COOKIE, access_token, cookie_value,
    },
    services::identity::{IdentityError, IdentityProvider, generate_code_verifier},
    state::SharedState,
};

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_ACCESS_MAX_AGE: u64 = 3600;
const REFRESH_MAX_AGE: u64 = 60 * 60 * 24 * 30;
const VERIFIER_MAX_AGE: u64 = 600;

/// Sign-in, callback and sign-out routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/signout", post(sign_out))
        .route("/auth/me", get(me))
}

/// Redirect the browser to the identity provider.
#[utoipa::path(
    get,
    path = "/auth/login",
    tag = "auth",
    params(LoginQuery),
    responses(
        (status = 303, description = "Redirect to the identity provider"),
        (status = 503, description = "Sign-in is not configured")
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Query(query): Query<LoginQuery>,
) -> Result<impl IntoResponse, AppError> {
    let identity = require_identity(&state)?;
    let next = safe_next(query.next.as_deref());

    let base = public_base_url();
    let callback = Url::parse_with_params(&format!("{base}/auth/callback"), &[("next", next)])
        .map_err(|_| {
            AppError::from(ServiceError::Identity(IdentityError::InvalidBaseUrl {
                url: base.clone(),
            }))
        })?;

    let verifier = generate_code_verifier();
    let url = identity
        .authorize_url(callback.as_str(), &verifier)
        .map_err(ServiceError::from)?;

    Ok((
        AppendHeaders([(
            SET_COOKIE,
            session_cookie(VERIFIER_COOKIE, &verifier, VERIFIER_MAX_AGE),
        )]),
        Redirect::to(&url),
    ))
}

/// Exchange the authorization code and start the browser session.
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = "auth",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Signed in; redirect to `next`"),
        (status = 400, description = "Missing code or verifier"),
        (status = 401, description = "The provider refused the sign-in")
    )
)]
pub async fn callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    let identity = require_identity(&state)?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        warn!(%error, %description, "identity provider reported a sign-in error");
        return Err(AppError::Unauthorized(format!("sign-in failed: {error}")));
    }
    let code = query
        .code
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;
    let verifier = cookie_value(&headers, VERIFIER_COOKIE)
        .ok_or_else(|| AppError::BadRequest("sign-in verifier expired; start again".into()))?;

    let tokens = identity
        .exchange_code(code, verifier)
        .await
        .map_err(ServiceError::from)?;
    info!(user_id = %tokens.user.id, "user signed in");

    let access_max_age = tokens.expires_in.unwrap_or(DEFAULT_ACCESS_MAX_AGE);
    let refresh = match tokens.refresh_token.as_deref() {
        Some(refresh) => session_cookie(REFRESH_COOKIE, refresh, REFRESH_MAX_AGE),
        None => cleared_cookie(REFRESH_COOKIE),
    };

    Ok((
        AppendHeaders([
            (
                SET_COOKIE,
                session_cookie(ACCESS_COOKIE, &tokens.access_token, access_max_age),
            ),
            (SET_COOKIE, refresh),
            (SET_COOKIE, cleared_cookie(VERIFIER_COOKIE)),
        ]),
        Redirect::to(safe_next(query.next.as_deref())),
    ))
}

/// Revoke the session and clear the session cookies.
#[utoipa::path(
    post,
    path = "/auth/signout",
    tag = "auth",
    responses((status = 204, description = "Signed out"))
)]
pub async fn sign_out(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    if let (Some(identity), Some(token)) = (state.identity(), access_token(&headers)) {
        // Cookies are cleared even when revocation fails.
        if let Err(err) = identity.sign_out(token).await {
            warn!(error = %err, "failed to revoke session at the identity provider");
        }
    }

    (
        StatusCode::NO_CONTENT,
        AppendHeaders([
            (SET_COOKIE, cleared_cookie(ACCESS_COOKIE)),
            (SET_COOKIE, cleared_cookie(REFRESH_COOKIE)),
        ]),
    )
}

/// Signed-in user.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserView>),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me(user: CurrentUser) -> Json<ApiResponse<UserView>> {
    Json(ApiResponse::new(user.0.into()))
}

fn require_identity(state: &SharedState) -> Result<&dyn IdentityProvider, AppError> {
    state
        .identity()
        .map(|identity| &**identity)
        .ok_or_else(|| ServiceError::Identity(IdentityError::NotConfigured).into())
}

fn public_base_url() -> String {
    env::var("PUBLIC_BASE_URL")
        .ok()
        .map(|url| url.trim_end_matches('/').to_owned())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_owned())
}

/// Relative path to land on after sign-in. Anything that could leave the site becomes `/`.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') =>
        {
            path
        }
        _ => "/",
    }
}

fn session_cookie(name: &str, value: &str, max_age: u64) -> String {
    let secure = if public_base_url().starts_with("https://") {
        "; Secure"
    } else {
        ""
    };
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}")
}

fn cleared_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_stay_on_site() {
        assert_eq!(safe_next(Some("/matches/42")), "/matches/42");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = cleared_cookie(ACCESS_COOKIE);
        assert!(cookie.starts_with("sabre_access=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
