use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use color_eyre::eyre::eyre;
use db::users::User;
use uuid::Uuid;

use crate::{http_server::ServerError, AppState};

const TOKEN_SCHEME: &str = "token";

fn unauthorized(message: &'static str) -> ServerError {
    ServerError(eyre!(message), StatusCode::UNAUTHORIZED)
}

/// The key from an `Authorization: Token <key>` header, if one was sent.
fn token_from_parts(parts: &Parts) -> Result<Option<&str>, ServerError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header
        .to_str()
        .map_err(|_| unauthorized("Invalid token header."))?;

    let mut words = header.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(scheme), Some(key), None) if scheme.eq_ignore_ascii_case(TOKEN_SCHEME) => Ok(Some(key)),
        (Some(scheme), None, None) if scheme.eq_ignore_ascii_case(TOKEN_SCHEME) => {
            Err(unauthorized("Invalid token header. No credentials provided."))
        }
        (Some(scheme), _, _) if scheme.eq_ignore_ascii_case(TOKEN_SCHEME) => Err(unauthorized(
            "Invalid token header. Token string should not contain spaces.",
        )),
        _ => Ok(None),
    }
}

async fn user_from_parts(parts: &Parts, state: &AppState) -> Result<Option<User>, ServerError> {
    let Some(token) = token_from_parts(parts)? else {
        return Ok(None);
    };

    let user = User::get_by_token(state.db(), token)
        .await?
        .ok_or_else(|| unauthorized("Invalid token."))?;

    tracing::Span::current().record("user_id", tracing::field::display(user.user_id));

    Ok(Some(user))
}

/// An authenticated user. Requests without a token are rejected.
pub(crate) struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.user_id
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        user_from_parts(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| unauthorized("Authentication credentials were not provided."))
    }
}

/// The requesting user when a token was sent. A token that matches nobody
/// is still an error.
pub(crate) struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|user| user.user_id)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        user_from_parts(parts, state).await.map(MaybeUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().uri("/api/recipes");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }

        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_reads_token_header() {
        let parts = parts(Some("Token 9944b09199c62bcf9418ad846dd0e4bbdfc6ee4b"));

        assert_eq!(
            token_from_parts(&parts).unwrap(),
            Some("9944b09199c62bcf9418ad846dd0e4bbdfc6ee4b")
        );
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let parts = parts(Some("token abc"));

        assert_eq!(token_from_parts(&parts).unwrap(), Some("abc"));
    }

    #[test]
    fn test_missing_or_foreign_header_is_anonymous() {
        assert_eq!(token_from_parts(&parts(None)).unwrap(), None);
        assert_eq!(token_from_parts(&parts(Some("Bearer abc"))).unwrap(), None);
    }

    #[test]
    fn test_malformed_token_header_is_rejected() {
        let err = token_from_parts(&parts(Some("Token"))).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = token_from_parts(&parts(Some("Token a b"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid token header. Token string should not contain spaces."
        );
    }
}
