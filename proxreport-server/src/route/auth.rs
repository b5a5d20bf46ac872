use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_auth::AuthBasic;
use tracing::debug;

use crate::AppState;

const REALM: &str = r#"Basic realm="proxreport", charset="UTF-8""#;

/// A request carrying valid HTTP Basic credentials.
#[derive(Clone, Debug)]
pub struct AuthedUser(pub String);

#[derive(Debug, thiserror::Error)]
pub enum AuthRejection {
    #[error("Authentication required")]
    MissingCredentials,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Failed to verify credentials")]
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
            _ => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, REALM)],
                self.to_string(),
            )
                .into_response(),
        }
    }
}

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthBasic((username, password)) = AuthBasic::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRejection::MissingCredentials)?;

        // argon2 verification is CPU bound
        let users = state.users.clone();
        let checked_name = username.clone();
        let valid = tokio::task::spawn_blocking(move || {
            users.verify(&checked_name, password.as_deref().unwrap_or_default())
        })
        .await
        .map_err(|_| AuthRejection::Internal)?;

        if !valid {
            debug!(%username, "rejected credentials");
            return Err(AuthRejection::InvalidCredentials);
        }

        Ok(AuthedUser(username))
    }
}
