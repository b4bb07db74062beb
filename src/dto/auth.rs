use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::services::identity::AuthenticatedUser;

/// Query of the sign-in entry point.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// Relative path to land on after signing in.
    pub next: Option<String>,
}

/// Query the identity provider appends when redirecting back.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// Authorization code to exchange.
    pub code: Option<String>,
    /// Relative path to land on after signing in.
    pub next: Option<String>,
    /// Error reported by the provider instead of a code.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Signed-in user.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    pub id: String,
    pub email: Option<String>,
}

impl From<AuthenticatedUser> for UserView {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}
