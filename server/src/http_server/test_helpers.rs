use std::path::Path;

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use db::{
    cooking::{Ingredient, NewIngredient},
    users::{AuthToken, NewUser, User},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use url::Url;
use uuid::Uuid;

use crate::{state::VersionInfo, AppConfig, AppState};

fn test_config(media_root: &Path) -> AppConfig {
    AppConfig {
        base_url: Url::parse("http://localhost:3000").unwrap(),
        port: 3000,
        media_root: media_root.to_path_buf(),
        media_url: "/media".to_string(),
    }
}

fn app_with_pool(pool: PgPool, media_root: &Path) -> Router {
    let state = AppState {
        app: test_config(media_root),
        versions: VersionInfo::from_env(),
        db: pool,
    };

    crate::http_server::routes::make_router(&state.app).with_state(state)
}

pub async fn create_test_app(pool: PgPool, media_root: &Path) -> Router {
    app_with_pool(pool, media_root)
}

/// An app whose pool never connects, for routes that don't reach the database.
pub fn lazy_test_app(media_root: &Path) -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();

    app_with_pool(pool, media_root)
}

/// Creates a user and an API token for them.
pub async fn create_user_with_token(pool: &PgPool, username: &str) -> (User, String) {
    let mut conn = pool.acquire().await.unwrap();
    let user = User::create(
        &mut conn,
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            name: username.to_string(),
            surname: "Tester".to_string(),
            ..NewUser::default()
        },
    )
    .await
    .unwrap();

    let token = Uuid::new_v4().simple().to_string();
    AuthToken::create(&mut conn, user.user_id, &token)
        .await
        .unwrap();

    (user, token)
}

pub async fn seed_ingredient(pool: &PgPool, name: &str, is_flavoring: bool) -> Uuid {
    let mut conn = pool.acquire().await.unwrap();

    Ingredient::create(
        &mut conn,
        NewIngredient {
            name: name.to_string(),
            is_flavoring,
            ..NewIngredient::default()
        },
    )
    .await
    .unwrap()
    .ingredient_id
}

/// Builds a request with an optional token. `Value::Null` sends no body.
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
    }

    let body = if body.is_null() {
        Body::empty()
    } else {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(body.to_string())
    };

    builder.body(body).unwrap()
}

pub async fn response_body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}
