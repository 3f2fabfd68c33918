use std::fmt::{Debug, Display};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use color_eyre::Report;
use serde_json::json;

use crate::validation::ValidationErrors;

/// An error report paired with the status code it should be served with.
pub struct ServerError(pub(crate) Report, pub(crate) StatusCode);

impl ServerError {
    pub fn status(&self) -> StatusCode {
        self.1
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Status Code: {}", self.1)?;

        Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Some(errors) = self.0.downcast_ref::<ValidationErrors>() {
            tracing::debug!(?errors, "Rejected invalid payload");

            return (self.1, Json(errors)).into_response();
        }

        if self.1.is_server_error() {
            sentry::capture_error(&self);
            tracing::error!(error = ?self, "ServerError");

            return (self.1, Json(json!({ "detail": "Internal server error." }))).into_response();
        }

        tracing::info!(status = %self.1, error = %self.0, "Request failed");

        (self.1, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<Report> for ServerError {
    fn from(err: Report) -> Self {
        ServerError(err, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub trait WithStatus<T> {
    fn with_status(self, status: StatusCode) -> Result<T, ServerError>;
}

impl<T, E> WithStatus<T> for Result<T, E>
where
    E: Into<Report>,
{
    fn with_status(self, status: StatusCode) -> Result<T, ServerError> {
        self.map_err(|e| ServerError(e.into(), status))
    }
}

/// Shorthand for a 404 with the usual message.
pub fn not_found() -> ServerError {
    ServerError(
        color_eyre::eyre::eyre!("Not found."),
        StatusCode::NOT_FOUND,
    )
}

#[cfg(test)]
mod tests {
    use color_eyre::eyre::eyre;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_client_errors_expose_their_message() {
        let response = Err::<(), _>(eyre!("Recipe not found"))
            .with_status(StatusCode::NOT_FOUND)
            .unwrap_err()
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "detail": "Recipe not found" }));
    }

    #[tokio::test]
    async fn test_server_errors_hide_their_message() {
        let response = ServerError::from(eyre!("connection refused")).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Internal server error." })
        );
    }

    #[tokio::test]
    async fn test_validation_errors_render_as_field_map() {
        let mut errors = ValidationErrors::default();
        errors.add("title", "title must be at least 2 characters long.");
        errors.add("images", "Wrong number of covers. A recipe must have exactly one cover.");

        let response = Err::<(), _>(errors)
            .with_status(StatusCode::BAD_REQUEST)
            .unwrap_err()
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({
                "images": ["Wrong number of covers. A recipe must have exactly one cover."],
                "title": ["title must be at least 2 characters long."],
            })
        );
    }
}
