//! Read-only reference data: ingredients, tags, cuisines and equipment.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use color_eyre::eyre::Context;
use db::cooking::{Cuisine, Equipment, Ingredient, Tag};
use serde::Serialize;
use uuid::Uuid;

use super::{parse_id, QueryParams};
use crate::{
    http_server::{
        auth::MaybeUser,
        errors::not_found,
        repr::{CuisineRepr, EquipmentRepr, IngredientDetailRepr, IngredientRepr, ReprContext},
        ResponseResult,
    },
    AppState,
};

#[derive(Debug, Serialize)]
struct TagRepr {
    id: Uuid,
    name: String,
}

impl From<Tag> for TagRepr {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.tag_id,
            name: tag.name,
        }
    }
}

#[axum_macros::debug_handler]
pub async fn list_ingredients(
    State(state): State<AppState>,
    params: QueryParams,
) -> ResponseResult<impl IntoResponse> {
    let prefix = params.get("name").map(str::trim).filter(|p| !p.is_empty());

    let ingredients = Ingredient::list(state.db(), prefix)
        .await
        .context("Failed to list ingredients")?;

    Ok(Json(
        ingredients
            .iter()
            .map(|ingredient| IngredientRepr::new(&state.app, ingredient))
            .collect::<Vec<_>>(),
    ))
}

#[axum_macros::debug_handler]
pub async fn get_ingredient(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    let ingredient_id = parse_id(&id)?;
    let ingredient = Ingredient::get_by_id(state.db(), ingredient_id)
        .await
        .context("Failed to fetch ingredient")?
        .ok_or_else(not_found)?;

    let ctx = ReprContext::new(&state, user.id());

    Ok(Json(IngredientDetailRepr::load(ctx, &ingredient).await?))
}

#[axum_macros::debug_handler]
pub async fn list_tags(State(state): State<AppState>) -> ResponseResult<impl IntoResponse> {
    let tags = Tag::list_all(state.db())
        .await
        .context("Failed to list tags")?;

    Ok(Json(tags.into_iter().map(TagRepr::from).collect::<Vec<_>>()))
}

#[axum_macros::debug_handler]
pub async fn list_cuisines(State(state): State<AppState>) -> ResponseResult<impl IntoResponse> {
    let cuisines = Cuisine::list_all(state.db())
        .await
        .context("Failed to list cuisines")?;

    Ok(Json(
        cuisines.into_iter().map(CuisineRepr::from).collect::<Vec<_>>(),
    ))
}

#[axum_macros::debug_handler]
pub async fn list_equipment(State(state): State<AppState>) -> ResponseResult<impl IntoResponse> {
    let equipment = Equipment::list_all(state.db())
        .await
        .context("Failed to list equipment")?;

    Ok(Json(
        equipment
            .into_iter()
            .map(|item| EquipmentRepr::new(&state.app, item))
            .collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::Value;
    use sqlx::PgPool;
    use tower::ServiceExt as _;

    use crate::http_server::test_helpers::{create_test_app, response_body_json, seed_ingredient};

    #[sqlx::test(migrations = "../db/migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_ingredients_filter_by_name_prefix(pool: PgPool) {
        let media = tempfile::tempdir().unwrap();
        let app = create_test_app(pool.clone(), media.path()).await;
        seed_ingredient(&pool, "Salt", true).await;
        seed_ingredient(&pool, "Sugar", false).await;
        seed_ingredient(&pool, "Flour", false).await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/ingredients?name=s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response_body_json(response).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Salt", "Sugar"]);
        assert_eq!(body[0]["type"], "flavoring");
    }

    #[sqlx::test(migrations = "../db/migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_ingredient_detail(pool: PgPool) {
        let media = tempfile::tempdir().unwrap();
        let app = create_test_app(pool.clone(), media.path()).await;
        let flour = seed_ingredient(&pool, "Flour", false).await;

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/ingredients/{flour}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response_body_json(response).await;
        assert_eq!(body["recipes_amount"], 0);

        let response = app
            .oneshot(
                Request::get("/api/ingredients/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
