use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use color_eyre::eyre::{eyre, Context};
use db::cooking::{
    recipe::DEFAULT_ENDING_PHRASE, Cuisine, Equipment, Ingredient, NewRecipe, NewRecipeImage,
    NewRecipeIngredient, Recipe, RecipeChanges, RecipeEquipment, RecipeImage, RecipeIngredient,
    RecipeReaction, RecipeReview, RecipeStep, RecipeTag, Selection, Tag,
};
use rand::seq::SliceRandom;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{all_exist, bad_request, forbidden, parse_id, JsonBody, PageRepr, QueryParams};
use crate::{
    http_server::{
        auth::{CurrentUser, MaybeUser},
        errors::{not_found, WithStatus as _},
        media::{DataUri, MediaStore},
        repr::{
            DetailLimits, RecipeDetailRepr, RecipeIngredientRepr, RecipeListRepr, ReprContext,
            ReviewRepr,
        },
        ResponseResult,
    },
    validation::{
        ImageSource, Mode, RecipeContext, RecipePayload, ReviewPayload, ValidImage, ValidRecipe,
        ValidationErrors,
    },
    AppState,
};

const RECIPES_PATH: &str = "/api/recipes";
const IMAGES_DIR: &str = "recipes/images";
const VIDEOS_DIR: &str = "recipes/videos";

pub(crate) async fn find_recipe(state: &AppState, raw_id: &str) -> ResponseResult<Recipe> {
    let recipe_id = parse_id(raw_id)?;

    Recipe::get_by_id(state.db(), recipe_id)
        .await
        .context("Failed to fetch recipe")
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or_else(not_found)
}

fn ensure_author(user: &CurrentUser, recipe: &Recipe) -> ResponseResult<()> {
    if recipe.author_user_id == user.id() {
        Ok(())
    } else {
        Err(forbidden())
    }
}

#[axum_macros::debug_handler]
pub async fn list_recipes(
    State(state): State<AppState>,
    user: MaybeUser,
    params: QueryParams,
) -> ResponseResult<impl IntoResponse> {
    let filter = params.recipe_filter()?;
    let page_request = params.page_request()?;

    let page = Recipe::list(state.db(), &filter, &page_request)
        .await
        .context("Failed to list recipes")?;

    let ctx = ReprContext::new(&state, user.id()).with_servings(params.servings()?);
    let results = RecipeListRepr::load_many(ctx, &page.items).await?;

    Ok(Json(PageRepr::new(
        &state.app,
        RECIPES_PATH,
        &params,
        &page,
        results,
    )))
}

#[axum_macros::debug_handler]
pub async fn random_recipe(
    State(state): State<AppState>,
    user: MaybeUser,
    params: QueryParams,
) -> ResponseResult<impl IntoResponse> {
    let filter = params.recipe_filter()?;
    let ids = Recipe::matching_ids(state.db(), &filter).await?;

    let picked = ids.choose(&mut rand::thread_rng()).copied();
    let recipe = match picked {
        Some(recipe_id) => Recipe::get_by_id(state.db(), recipe_id).await?,
        None => None,
    }
    .ok_or_else(not_found)?;

    let ctx = ReprContext::new(&state, user.id()).with_servings(params.servings()?);

    Ok(Json(RecipeListRepr::load(ctx, &recipe).await?))
}

#[axum_macros::debug_handler]
pub async fn get_recipe(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    params: QueryParams,
) -> ResponseResult<impl IntoResponse> {
    let recipe = find_recipe(&state, &id).await?;
    let ctx = ReprContext::new(&state, user.id()).with_servings(params.servings()?);

    Ok(Json(
        RecipeDetailRepr::load(ctx, &recipe, params.detail_limits()?).await?,
    ))
}

#[axum_macros::debug_handler]
pub async fn recipe_ingredients(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    params: QueryParams,
) -> ResponseResult<impl IntoResponse> {
    let recipe = find_recipe(&state, &id).await?;
    let ctx = ReprContext::new(&state, user.id()).with_servings(params.servings()?);

    Ok(Json(RecipeIngredientRepr::load_for_recipe(ctx, &recipe).await?))
}

/// Loads what validation needs to know about the ingredients a payload
/// mentions and, for updates, what the recipe already stores.
async fn recipe_context(
    state: &AppState,
    payload: &RecipePayload,
    existing: Option<&Recipe>,
) -> color_eyre::Result<RecipeContext> {
    let ingredients = Ingredient::get_by_ids(state.db(), &payload.referenced_ingredients())
        .await?
        .into_iter()
        .map(|ingredient| (ingredient.ingredient_id, ingredient))
        .collect();

    let Some(recipe) = existing else {
        return Ok(RecipeContext {
            mode: Mode::Create,
            ingredients,
            ..RecipeContext::default()
        });
    };

    let mut conn = state.db().acquire().await?;
    let stored_ingredient_ids =
        RecipeIngredient::ingredient_ids_for_recipe(&mut *conn, recipe.recipe_id).await?;
    let stored_images = RecipeImage::paths_for_recipe(&mut *conn, recipe.recipe_id).await?;

    Ok(RecipeContext {
        mode: Mode::Update,
        ingredients,
        stored_ingredient_ids,
        stored_images,
    })
}

/// Checks the references validation can't see without the database and
/// resolves the cuisine name.
async fn resolve_references(
    state: &AppState,
    valid: &ValidRecipe,
) -> ResponseResult<Option<Option<Uuid>>> {
    let pool = state.db();
    let mut errors = ValidationErrors::default();

    let cuisine_id = match &valid.cuisine {
        Some(Some(name)) => match Cuisine::get_by_name(pool, name).await? {
            Some(cuisine) => Some(Some(cuisine.cuisine_id)),
            None => {
                errors.add("cuisine", format!("Object with name={name} does not exist."));
                None
            }
        },
        Some(None) => Some(None),
        None => None,
    };

    if let Some(ids) = &valid.selections {
        if !all_exist(Selection::count_existing(pool, ids).await?, ids) {
            errors.add("selections", "Some of the selections do not exist.");
        }
    }
    if let Some(ids) = &valid.equipment {
        if !all_exist(Equipment::count_existing(pool, ids).await?, ids) {
            errors.add("equipment", "Some of the equipment does not exist.");
        }
    }

    errors
        .into_result(cuisine_id)
        .with_status(StatusCode::BAD_REQUEST)
}

/// Files written while handling one request, so a failed request can take
/// them back.
struct Uploads<'a> {
    media: &'a MediaStore,
    saved: Vec<String>,
}

impl<'a> Uploads<'a> {
    fn new(media: &'a MediaStore) -> Self {
        Self {
            media,
            saved: Vec::new(),
        }
    }

    async fn save(&mut self, dir: &str, upload: &DataUri) -> color_eyre::Result<String> {
        let path = self.media.save(dir, upload).await?;
        self.saved.push(path.clone());

        Ok(path)
    }

    async fn images(&mut self, images: Vec<ValidImage>) -> color_eyre::Result<Vec<NewRecipeImage>> {
        let mut stored = Vec::with_capacity(images.len());
        for image in images {
            let path = match image.source {
                ImageSource::Upload(upload) => self.save(IMAGES_DIR, &upload).await?,
                ImageSource::Existing(path) => path,
            };

            stored.push(NewRecipeImage {
                image: path,
                is_cover: image.is_cover,
            });
        }

        Ok(stored)
    }

    async fn discard(self) {
        self.media.remove_all(&self.saved).await;
    }
}

/// Replaces the recipe's related rows that were sent. Returns media paths
/// that are no longer referenced.
async fn write_relations(
    conn: &mut PgConnection,
    recipe_id: Uuid,
    valid: ValidRecipe,
    images: Option<Vec<NewRecipeImage>>,
) -> color_eyre::Result<Vec<String>> {
    if let Some(names) = valid.tags {
        let tags = Tag::get_or_create_by_names(conn, &names).await?;
        let tag_ids: Vec<Uuid> = tags.iter().map(|tag| tag.tag_id).collect();
        RecipeTag::set_for_recipe(conn, recipe_id, &tag_ids).await?;
    }

    if let Some(lines) = valid.ingredients {
        let lines = lines
            .into_iter()
            .map(|line| NewRecipeIngredient {
                ingredient_id: line.ingredient_id,
                amount: line.amount,
                measurement_unit: line.measurement_unit,
                cup_grams: line.cup_grams,
            })
            .collect();
        RecipeIngredient::replace_for_recipe(conn, recipe_id, lines).await?;
    }

    if let Some(steps) = valid.steps {
        RecipeStep::replace_for_recipe(conn, recipe_id, steps).await?;
    }

    if let Some(equipment) = valid.equipment {
        RecipeEquipment::set_for_recipe(conn, recipe_id, &equipment).await?;
    }

    if let Some(selections) = valid.selections {
        Selection::set_for_recipe(conn, recipe_id, &selections).await?;
    }

    match images {
        Some(images) => RecipeImage::replace_for_recipe(conn, recipe_id, images).await,
        None => Ok(Vec::new()),
    }
}

async fn insert_recipe(
    state: &AppState,
    uploads: &mut Uploads<'_>,
    author_user_id: Uuid,
    mut valid: ValidRecipe,
    cuisine_id: Option<Uuid>,
) -> color_eyre::Result<Recipe> {
    let (Some(title), Some(cooking_time)) = (valid.title.take(), valid.cooking_time) else {
        return Err(eyre!("Validated recipe is missing its title or cooking time"));
    };

    let images = match valid.images.take() {
        Some(images) => Some(uploads.images(images).await?),
        None => None,
    };
    let video = match valid.video.take().flatten() {
        Some(upload) => Some(uploads.save(VIDEOS_DIR, &upload).await?),
        None => None,
    };

    let mut tx = state.db().begin().await?;

    let recipe = Recipe::create(
        &mut *tx,
        NewRecipe {
            title,
            description: valid.description.take().unwrap_or_default(),
            servings: valid.servings.unwrap_or(1),
            cooking_time,
            ending_phrase: valid
                .ending_phrase
                .take()
                .filter(|phrase| !phrase.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDING_PHRASE.to_string()),
            video,
            cuisine_id,
            author_user_id,
        },
    )
    .await?;

    write_relations(&mut *tx, recipe.recipe_id, valid, images).await?;
    tx.commit().await?;

    Ok(recipe)
}

#[axum_macros::debug_handler]
pub async fn create_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(payload): JsonBody<RecipePayload>,
) -> ResponseResult<impl IntoResponse> {
    let ctx = recipe_context(&state, &payload, None).await?;
    let valid = payload
        .validate(&ctx)
        .with_status(StatusCode::BAD_REQUEST)?;
    let cuisine_id = resolve_references(&state, &valid).await?.flatten();

    let media = state.app.media();
    let mut uploads = Uploads::new(&media);
    let inserted = insert_recipe(&state, &mut uploads, user.id(), valid, cuisine_id).await;
    let recipe = match inserted {
        Ok(recipe) => recipe,
        Err(e) => {
            uploads.discard().await;
            return Err(e.into());
        }
    };

    tracing::info!(recipe_id = %recipe.recipe_id, author = %user.id(), "Created recipe");

    let ctx = ReprContext::new(&state, Some(user.id()));
    let repr = RecipeDetailRepr::load(ctx, &recipe, DetailLimits::default()).await?;

    Ok((StatusCode::CREATED, Json(repr)))
}

/// Applies an update and returns the updated recipe along with media paths
/// to delete once the change is committed.
async fn apply_update(
    state: &AppState,
    uploads: &mut Uploads<'_>,
    recipe: &Recipe,
    mut valid: ValidRecipe,
    cuisine_id: Option<Option<Uuid>>,
) -> color_eyre::Result<(Recipe, Vec<String>)> {
    let images = match valid.images.take() {
        Some(images) => Some(uploads.images(images).await?),
        None => None,
    };
    let video = match valid.video.take() {
        Some(Some(upload)) => Some(Some(uploads.save(VIDEOS_DIR, &upload).await?)),
        Some(None) => Some(None),
        None => None,
    };

    let mut unreferenced = Vec::new();
    if let (Some(_), Some(old)) = (&video, &recipe.video) {
        unreferenced.push(old.clone());
    }

    let changes = RecipeChanges {
        title: valid.title.take(),
        description: valid.description.take(),
        servings: valid.servings,
        cooking_time: valid.cooking_time,
        ending_phrase: valid.ending_phrase.take(),
        video,
        cuisine_id,
    };

    let mut tx = state.db().begin().await?;
    let updated = Recipe::update(&mut *tx, recipe.recipe_id, changes).await?;
    unreferenced.extend(write_relations(&mut *tx, recipe.recipe_id, valid, images).await?);
    tx.commit().await?;

    Ok((updated, unreferenced))
}

#[axum_macros::debug_handler]
pub async fn update_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<RecipePayload>,
) -> ResponseResult<impl IntoResponse> {
    let recipe = find_recipe(&state, &id).await?;
    ensure_author(&user, &recipe)?;

    let ctx = recipe_context(&state, &payload, Some(&recipe)).await?;
    let valid = payload
        .validate(&ctx)
        .with_status(StatusCode::BAD_REQUEST)?;
    let cuisine_id = resolve_references(&state, &valid).await?;

    let media = state.app.media();
    let mut uploads = Uploads::new(&media);
    let applied = apply_update(&state, &mut uploads, &recipe, valid, cuisine_id).await;
    let (updated, unreferenced) = match applied {
        Ok(result) => result,
        Err(e) => {
            uploads.discard().await;
            return Err(e.into());
        }
    };
    media.remove_all(&unreferenced).await;

    tracing::info!(recipe_id = %updated.recipe_id, "Updated recipe");

    let ctx = ReprContext::new(&state, Some(user.id()));
    let repr = RecipeDetailRepr::load(ctx, &updated, DetailLimits::default()).await?;

    Ok(Json(repr))
}

#[axum_macros::debug_handler]
pub async fn delete_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    let recipe = find_recipe(&state, &id).await?;
    ensure_author(&user, &recipe)?;

    let mut files = {
        let mut conn = state
            .db()
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        RecipeImage::paths_for_recipe(&mut *conn, recipe.recipe_id).await?
    };
    files.extend(recipe.video.clone());

    if Recipe::delete(state.db(), recipe.recipe_id).await? {
        state.app.media().remove_all(&files).await;
        tracing::info!(recipe_id = %recipe.recipe_id, "Deleted recipe");
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn add_reaction(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
    reaction: RecipeReaction,
) -> ResponseResult<(StatusCode, Json<RecipeListRepr>)> {
    let recipe = find_recipe(state, id).await?;

    if !reaction.add(state.db(), user.id(), recipe.recipe_id).await? {
        return Err(bad_request(match reaction {
            RecipeReaction::Favorite => "You have already added this recipe to favorites.",
            RecipeReaction::Recommend => "You have already recommended this recipe.",
        }));
    }

    let ctx = ReprContext::new(state, Some(user.id()));

    Ok((
        StatusCode::CREATED,
        Json(RecipeListRepr::load(ctx, &recipe).await?),
    ))
}

async fn remove_reaction(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
    reaction: RecipeReaction,
) -> ResponseResult<StatusCode> {
    let recipe = find_recipe(state, id).await?;

    if !reaction.remove(state.db(), user.id(), recipe.recipe_id).await? {
        return Err(bad_request(match reaction {
            RecipeReaction::Favorite => "This recipe is no longer in your favorites.",
            RecipeReaction::Recommend => "You have not recommended this recipe.",
        }));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[axum_macros::debug_handler]
pub async fn favorite_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    add_reaction(&state, &user, &id, RecipeReaction::Favorite).await
}

#[axum_macros::debug_handler]
pub async fn unfavorite_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    remove_reaction(&state, &user, &id, RecipeReaction::Favorite).await
}

#[axum_macros::debug_handler]
pub async fn recommend_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    add_reaction(&state, &user, &id, RecipeReaction::Recommend).await
}

#[axum_macros::debug_handler]
pub async fn unrecommend_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ResponseResult<impl IntoResponse> {
    remove_reaction(&state, &user, &id, RecipeReaction::Recommend).await
}

#[axum_macros::debug_handler]
pub async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<ReviewPayload>,
) -> ResponseResult<impl IntoResponse> {
    let recipe = find_recipe(&state, &id).await?;
    let comment = payload.validate().with_status(StatusCode::BAD_REQUEST)?;

    let review = RecipeReview::create(state.db(), recipe.recipe_id, user.id(), &comment)
        .await
        .context("Failed to save review")?;

    let ctx = ReprContext::new(&state, Some(user.id()));

    Ok((StatusCode::CREATED, Json(ReviewRepr::load(ctx, review).await?)))
}
