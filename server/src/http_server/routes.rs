use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::services::ServeDir;

use super::api::{catalog, recipes, selections};
use crate::{AppConfig, AppState};

pub(crate) fn make_router(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .route("/_", get(versions))
        .nest("/api", api_routes())
        .nest_service(&config.media_url, ServeDir::new(&config.media_root))
        .fallback(fallback)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/recipes",
            get(recipes::list_recipes).post(recipes::create_recipe),
        )
        .route("/recipes/random", get(recipes::random_recipe))
        .route(
            "/recipes/{id}",
            get(recipes::get_recipe)
                .patch(recipes::update_recipe)
                .delete(recipes::delete_recipe),
        )
        .route("/recipes/{id}/ingredients", get(recipes::recipe_ingredients))
        .route(
            "/recipes/{id}/favorite",
            post(recipes::favorite_recipe).delete(recipes::unfavorite_recipe),
        )
        .route(
            "/recipes/{id}/recommend",
            post(recipes::recommend_recipe).delete(recipes::unrecommend_recipe),
        )
        .route("/recipes/{id}/reviews", post(recipes::create_review))
        .route(
            "/selections",
            get(selections::list_selections).post(selections::create_selection),
        )
        .route(
            "/selections/{id}",
            get(selections::get_selection)
                .patch(selections::update_selection)
                .delete(selections::delete_selection),
        )
        .route(
            "/selections/{id}/random-recipe",
            get(selections::random_recipe_from_selection),
        )
        .route(
            "/selections/{id}/favorite",
            post(selections::favorite_selection).delete(selections::unfavorite_selection),
        )
        .route(
            "/selections/{id}/recommend",
            post(selections::recommend_selection).delete(selections::unrecommend_selection),
        )
        .route("/ingredients", get(catalog::list_ingredients))
        .route("/ingredients/{id}", get(catalog::get_ingredient))
        .route("/tags", get(catalog::list_tags))
        .route("/cuisines", get(catalog::list_cuisines))
        .route("/equipment", get(catalog::list_equipment))
}

async fn versions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.versions)
}

async fn fallback() -> impl IntoResponse {
    super::errors::not_found()
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use serde_json::{json, Value};
    use tower::ServiceExt as _;

    use super::*;
    use crate::http_server::test_helpers::{lazy_test_app, response_body_json};

    #[tokio::test]
    async fn test_versions_endpoint() {
        let media = tempfile::tempdir().unwrap();
        let app = lazy_test_app(media.path());

        let response = app
            .oneshot(Request::get("/_").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response_body_json(response).await;
        assert_eq!(body["name"], "server");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let media = tempfile::tempdir().unwrap();
        let app = lazy_test_app(media.path());

        let response = app
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response_body_json(response).await;
        assert_eq!(body, json!({"detail": "Not found."}));
    }

    #[tokio::test]
    async fn test_writes_need_credentials() {
        let media = tempfile::tempdir().unwrap();
        let app = lazy_test_app(media.path());

        let response = app
            .oneshot(
                Request::post("/api/recipes")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response_body_json(response).await;
        assert_eq!(
            body["detail"],
            "Authentication credentials were not provided."
        );
    }

    #[tokio::test]
    async fn test_serves_stored_media() {
        let media = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(media.path().join("recipes/images")).unwrap();
        std::fs::write(media.path().join("recipes/images/bread.png"), b"png").unwrap();
        let app = lazy_test_app(media.path());

        let response = app
            .oneshot(
                Request::get("/media/recipes/images/bread.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"png");
    }
}
