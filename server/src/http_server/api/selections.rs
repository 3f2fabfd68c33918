use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use color_eyre::eyre::{eyre, Context};
use db::cooking::{
    Category, NewSelection, Recipe, Selection, SelectionChanges, SelectionReaction,
};
use rand::seq::SliceRandom;
use uuid::Uuid;

use super::{all_exist, bad_request, forbidden, parse_id, JsonBody, QueryParams};
use crate::{
    http_server::{
        auth::{CurrentUser, MaybeUser},
        errors::{not_found, WithStatus as _},
        repr::{RecipeListRepr, ReprContext, SelectionDetailRepr, SelectionListRepr},
        ResponseResult,
    },
    validation::{Mode, SelectionPayload, ValidSelection},
    AppState,
};

const COVERS_DIR: &str = "selections/covers";

async fn find_selection(state: &AppState, raw_id: &str) -> ResponseResult<Selection> {
    let selection_id = parse_id(raw_id)?;

    Selection::get_by_id(state.db(), selection_id)
        .await
        .context("Failed to fetch selection")
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or_else(not_found)
}

fn ensure_author(user: &CurrentUser, selection: &Selection) -> ResponseResult<()> {
    if selection.author_user_id == user.id() {
        Ok(())
    } else {
        Err(forbidden())
    }
}

async fn check_recipes(state: &AppState, valid: &ValidSelection) -> ResponseResult<()> {
    let Some(ids) = &valid.recipes else {
        return Ok(());
    };

    if all_exist(Recipe::count_existing(state.db(), ids).await?, ids) {
        Ok(())
    } else {
        Err(bad_request("Some of the recipes do not exist."))
    }
}

#[axum_macros::debug_handler]
pub async fn list_selections(
    State(state): State<AppState>,
    user: MaybeUser,
) -> ResponseResult<impl IntoResponse> {
    let selections = Selection::list_all(state.db())
        .await
        .context("Failed to list selections")?;

    let ctx = ReprContext::new(&state, user.id());
    let mut results = Vec::with_capacity(selections.len());
    for selection in &selections {
        results.push(SelectionListRepr::load(ctx, selection).await?);
    }

    Ok(Json(results))
}

#[axum_macros::debug_handler]
pub async fn get_selection(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    let selection = find_selection(&state, &id).await?;
    let ctx = ReprContext::new(&state, user.id());

    Ok(Json(SelectionDetailRepr::load(ctx, &selection).await?))
}

async fn insert_selection(
    state: &AppState,
    author_user_id: Uuid,
    valid: ValidSelection,
    cover: Option<String>,
) -> color_eyre::Result<Selection> {
    let Some(title) = valid.title else {
        return Err(eyre!("Validated selection is missing its title"));
    };

    let mut tx = state.db().begin().await?;

    let category = match &valid.category {
        Some(name) => Category::get_or_create(&mut *tx, name).await?,
        None => Category::fallback(&mut *tx).await?,
    };
    let selection = Selection::create(
        &mut *tx,
        NewSelection {
            title,
            description: valid.description.unwrap_or_default(),
            cover,
            author_user_id,
            category_id: category.category_id,
        },
    )
    .await?;

    if let Some(recipes) = &valid.recipes {
        Selection::set_recipes(&mut *tx, selection.selection_id, recipes).await?;
    }
    tx.commit().await?;

    Ok(selection)
}

#[axum_macros::debug_handler]
pub async fn create_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(payload): JsonBody<SelectionPayload>,
) -> ResponseResult<impl IntoResponse> {
    let mut valid = payload
        .validate(Mode::Create)
        .with_status(StatusCode::BAD_REQUEST)?;
    check_recipes(&state, &valid).await?;

    let media = state.app.media();
    let cover = match valid.cover.take().flatten() {
        Some(upload) => Some(media.save(COVERS_DIR, &upload).await?),
        None => None,
    };

    let inserted = insert_selection(&state, user.id(), valid, cover.clone()).await;
    let selection = match inserted {
        Ok(selection) => selection,
        Err(e) => {
            media.remove_all(&cover).await;
            return Err(e.into());
        }
    };

    tracing::info!(selection_id = %selection.selection_id, author = %user.id(), "Created selection");

    let ctx = ReprContext::new(&state, Some(user.id()));

    Ok((
        StatusCode::CREATED,
        Json(SelectionDetailRepr::load(ctx, &selection).await?),
    ))
}

async fn apply_update(
    state: &AppState,
    selection: &Selection,
    valid: ValidSelection,
    cover: Option<Option<String>>,
) -> color_eyre::Result<Selection> {
    let mut tx = state.db().begin().await?;

    let category_id = match &valid.category {
        Some(name) => Some(Category::get_or_create(&mut *tx, name).await?.category_id),
        None => None,
    };
    let changes = SelectionChanges {
        title: valid.title,
        description: valid.description,
        cover,
        category_id,
    };

    let updated = Selection::update(&mut *tx, selection.selection_id, changes).await?;
    if let Some(recipes) = &valid.recipes {
        Selection::set_recipes(&mut *tx, selection.selection_id, recipes).await?;
    }
    tx.commit().await?;

    Ok(updated)
}

#[axum_macros::debug_handler]
pub async fn update_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<SelectionPayload>,
) -> ResponseResult<impl IntoResponse> {
    let selection = find_selection(&state, &id).await?;
    ensure_author(&user, &selection)?;

    let mut valid = payload
        .validate(Mode::Update)
        .with_status(StatusCode::BAD_REQUEST)?;
    check_recipes(&state, &valid).await?;

    let media = state.app.media();
    let cover = match valid.cover.take() {
        Some(Some(upload)) => Some(Some(media.save(COVERS_DIR, &upload).await?)),
        Some(None) => Some(None),
        None => None,
    };
    let new_cover = cover.clone().flatten();

    let updated = match apply_update(&state, &selection, valid, cover.clone()).await {
        Ok(updated) => updated,
        Err(e) => {
            media.remove_all(&new_cover).await;
            return Err(e.into());
        }
    };

    if cover.is_some() {
        media.remove_all(&selection.cover).await;
    }

    tracing::info!(selection_id = %updated.selection_id, "Updated selection");

    let ctx = ReprContext::new(&state, Some(user.id()));

    Ok(Json(SelectionDetailRepr::load(ctx, &updated).await?))
}

#[axum_macros::debug_handler]
pub async fn delete_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    let selection = find_selection(&state, &id).await?;
    ensure_author(&user, &selection)?;

    if let Some(cover) = Selection::delete(state.db(), selection.selection_id).await? {
        state.app.media().remove_all(&cover).await;
        tracing::info!(selection_id = %selection.selection_id, "Deleted selection");
    }

    Ok(StatusCode::NO_CONTENT)
}

#[axum_macros::debug_handler]
pub async fn random_recipe_from_selection(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    params: QueryParams,
) -> ResponseResult<impl IntoResponse> {
    let selection = find_selection(&state, &id).await?;
    let filter = params.recipe_filter()?;

    let mut ids = Selection::recipe_ids(state.db(), selection.selection_id).await?;
    if !filter.is_empty() {
        let matching: HashSet<Uuid> = Recipe::matching_ids(state.db(), &filter)
            .await?
            .into_iter()
            .collect();
        ids.retain(|recipe_id| matching.contains(recipe_id));
    }

    let picked = ids.choose(&mut rand::thread_rng()).copied();
    let recipe = match picked {
        Some(recipe_id) => Recipe::get_by_id(state.db(), recipe_id).await?,
        None => None,
    }
    .ok_or_else(not_found)?;

    let ctx = ReprContext::new(&state, user.id()).with_servings(params.servings()?);

    Ok(Json(RecipeListRepr::load(ctx, &recipe).await?))
}

async fn add_reaction(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
    reaction: SelectionReaction,
) -> ResponseResult<(StatusCode, Json<SelectionListRepr>)> {
    let selection = find_selection(state, id).await?;

    if !reaction.add(state.db(), user.id(), selection.selection_id).await? {
        return Err(bad_request(match reaction {
            SelectionReaction::Favorite => "You have already added this selection to favorites.",
            SelectionReaction::Recommend => "You have already recommended this selection.",
        }));
    }

    let ctx = ReprContext::new(state, Some(user.id()));

    Ok((
        StatusCode::CREATED,
        Json(SelectionListRepr::load(ctx, &selection).await?),
    ))
}

async fn remove_reaction(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
    reaction: SelectionReaction,
) -> ResponseResult<StatusCode> {
    let selection = find_selection(state, id).await?;

    if !reaction
        .remove(state.db(), user.id(), selection.selection_id)
        .await?
    {
        return Err(bad_request(match reaction {
            SelectionReaction::Favorite => "This selection is no longer in your favorites.",
            SelectionReaction::Recommend => "You have not recommended this selection.",
        }));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[axum_macros::debug_handler]
pub async fn favorite_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    add_reaction(&state, &user, &id, SelectionReaction::Favorite).await
}

#[axum_macros::debug_handler]
pub async fn unfavorite_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    remove_reaction(&state, &user, &id, SelectionReaction::Favorite).await
}

#[axum_macros::debug_handler]
pub async fn recommend_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    add_reaction(&state, &user, &id, SelectionReaction::Recommend).await
}

#[axum_macros::debug_handler]
pub async fn unrecommend_selection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    remove_reaction(&state, &user, &id, SelectionReaction::Recommend).await
}
