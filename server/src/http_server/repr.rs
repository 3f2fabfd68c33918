//! JSON representations returned by the API.
//!
//! Each `load` gathers what a representation needs from the database, relative
//! to the requesting user (for `is_favorited` and friends).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use db::{
    cooking::{
        measurement::{other_measures, scale_for_servings, ConvertedMeasure},
        Cuisine, Equipment, Ingredient, MeasurementUnit, Recipe, RecipeEquipment, RecipeImage,
        RecipeIngredient, RecipeReaction, RecipeReview, RecipeStats, RecipeStep, RecipeTag,
        Selection, SelectionStats, StepIngredient,
    },
    users::{Follow, User},
};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{validation::CookingTime, AppConfig, AppState};

pub const REVIEWS_LIMIT_DEFAULT: i64 = 10;
pub const RECOMMENDED_BY_LIMIT_DEFAULT: i64 = 5;

/// Who is asking, and for how many servings.
#[derive(Clone, Copy)]
pub(crate) struct ReprContext<'a> {
    pub state: &'a AppState,
    pub viewer: Option<Uuid>,
    pub servings: Option<i64>,
}

impl<'a> ReprContext<'a> {
    pub fn new(state: &'a AppState, viewer: Option<Uuid>) -> Self {
        Self {
            state,
            viewer,
            servings: None,
        }
    }

    pub fn with_servings(self, servings: Option<i64>) -> Self {
        Self { servings, ..self }
    }

    fn pool(&self) -> &PgPool {
        self.state.db()
    }

    fn config(&self) -> &AppConfig {
        &self.state.app
    }
}

fn media_url(config: &AppConfig, path: Option<&str>) -> Option<String> {
    path.filter(|p| !p.is_empty()).map(|p| config.media_file_url(p))
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorRepr {
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub username: String,
    pub image: Option<String>,
    pub is_subscribed: bool,
    pub recipes_count: i64,
}

impl AuthorRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, user: User) -> Result<Self> {
        let is_subscribed = match ctx.viewer {
            Some(viewer) => Follow::exists(ctx.pool(), viewer, user.user_id).await?,
            None => false,
        };
        let recipes_count = User::recipes_count(ctx.pool(), user.user_id).await?;

        Ok(Self {
            id: user.user_id,
            image: media_url(ctx.config(), user.image.as_deref()),
            name: user.name,
            surname: user.surname,
            username: user.username,
            is_subscribed,
            recipes_count,
        })
    }

    pub(crate) async fn load_by_id(ctx: ReprContext<'_>, user_id: Uuid) -> Result<Self> {
        let user = User::get_by_id(ctx.pool(), user_id)
            .await?
            .ok_or_else(|| eyre!("User {user_id} does not exist"))?;

        Self::load(ctx, user).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRepr {
    pub image: String,
    pub is_cover: bool,
}

impl ImageRepr {
    pub fn new(config: &AppConfig, image: &RecipeImage) -> Self {
        Self {
            image: config.media_file_url(&image.image),
            is_cover: image.is_cover,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientRepr {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub name: String,
    pub species: String,
    pub image: Option<String>,
    pub description: String,
    pub is_flavoring: bool,
}

impl IngredientRepr {
    pub fn new(config: &AppConfig, ingredient: &Ingredient) -> Self {
        Self {
            kind: if ingredient.is_flavoring {
                "flavoring"
            } else {
                "ingredient"
            },
            id: ingredient.ingredient_id,
            name: ingredient.name.clone(),
            species: ingredient.species.clone(),
            image: media_url(config, ingredient.image.as_deref()),
            description: ingredient.description.clone(),
            is_flavoring: ingredient.is_flavoring,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientDetailRepr {
    #[serde(flatten)]
    pub ingredient: IngredientRepr,
    pub one_piece_weight: Option<String>,
    pub recipes_amount: i64,
}

impl IngredientDetailRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, ingredient: &Ingredient) -> Result<Self> {
        Ok(Self {
            ingredient: IngredientRepr::new(ctx.config(), ingredient),
            one_piece_weight: ingredient.one_piece_weight.as_ref().map(ToString::to_string),
            recipes_amount: Ingredient::recipes_amount(ctx.pool(), ingredient.ingredient_id).await?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredientRepr {
    pub ingredient: IngredientRepr,
    pub amount: String,
    pub measurement_unit: MeasurementUnit,
    pub measurement_unit_full: &'static str,
    pub other_measures: Vec<ConvertedMeasure>,
}

impl RecipeIngredientRepr {
    /// `servings` rescales the stored amount, written for `recipe_servings`.
    pub fn build(
        config: &AppConfig,
        line: &RecipeIngredient,
        ingredient: &Ingredient,
        recipe_servings: i16,
        servings: Option<i64>,
    ) -> Result<Self> {
        let unit = line.unit()?;
        let stored = line.amount_fraction()?;
        let amount = match servings {
            Some(requested) => scale_for_servings(stored, requested, i64::from(recipe_servings))
                .ok_or_else(|| eyre!("Can't scale {stored} to {requested} servings"))?,
            None => stored,
        };

        Ok(Self {
            ingredient: IngredientRepr::new(config, ingredient),
            amount: amount.to_string(),
            measurement_unit: unit,
            measurement_unit_full: unit.full_name(),
            other_measures: other_measures(
                amount,
                unit,
                ingredient.one_piece_weight_fraction(),
                line.cup_grams_fraction(),
            ),
        })
    }

    pub(crate) async fn load_for_recipe(ctx: ReprContext<'_>, recipe: &Recipe) -> Result<Vec<Self>> {
        let lines = RecipeIngredient::get_by_recipe(ctx.pool(), recipe.recipe_id).await?;
        let ids: Vec<Uuid> = lines.iter().map(|line| line.ingredient_id).collect();
        let ingredients: HashMap<Uuid, Ingredient> = Ingredient::get_by_ids(ctx.pool(), &ids)
            .await?
            .into_iter()
            .map(|ingredient| (ingredient.ingredient_id, ingredient))
            .collect();

        lines
            .iter()
            .map(|line| {
                let ingredient = ingredients
                    .get(&line.ingredient_id)
                    .ok_or_else(|| eyre!("Ingredient {} does not exist", line.ingredient_id))?;

                Self::build(ctx.config(), line, ingredient, recipe.servings, ctx.servings)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepIngredientRepr {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRepr {
    pub serial_num: i32,
    pub title: String,
    pub description: String,
    pub note: String,
    pub ingredients: Vec<StepIngredientRepr>,
}

impl StepRepr {
    pub(crate) async fn load_for_recipe(ctx: ReprContext<'_>, recipe_id: Uuid) -> Result<Vec<Self>> {
        let steps = RecipeStep::get_by_recipe(ctx.pool(), recipe_id).await?;
        let mut by_step: HashMap<Uuid, Vec<StepIngredientRepr>> = HashMap::new();
        for used in StepIngredient::get_by_recipe(ctx.pool(), recipe_id).await? {
            let name = if used.species.is_empty() {
                used.name
            } else {
                format!("{} ({})", used.name, used.species)
            };

            by_step.entry(used.step_id).or_default().push(StepIngredientRepr {
                name,
                image: media_url(ctx.config(), used.image.as_deref()),
            });
        }

        Ok(steps
            .into_iter()
            .map(|step| Self {
                ingredients: by_step.remove(&step.step_id).unwrap_or_default(),
                serial_num: step.serial_num,
                title: step.title,
                description: step.description,
                note: step.note,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EquipmentRepr {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub description: String,
}

impl EquipmentRepr {
    pub fn new(config: &AppConfig, equipment: Equipment) -> Self {
        Self {
            kind: "equipment",
            id: equipment.equipment_id,
            image: media_url(config, equipment.image.as_deref()),
            name: equipment.name,
            description: equipment.description,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewRepr {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub user: AuthorRepr,
    pub comment: String,
    pub created: DateTime<Utc>,
}

impl ReviewRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, review: RecipeReview) -> Result<Self> {
        Ok(Self {
            kind: "review",
            id: review.review_id,
            user: AuthorRepr::load_by_id(ctx, review.user_id).await?,
            comment: review.comment,
            created: review.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CuisineRepr {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

impl From<Cuisine> for CuisineRepr {
    fn from(cuisine: Cuisine) -> Self {
        Self {
            id: cuisine.cuisine_id,
            name: cuisine.name,
            description: cuisine.description,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeListRepr {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub servings: i16,
    pub cooking_time: CookingTime,
    pub cuisine: Option<String>,
    pub images: Vec<ImageRepr>,
    pub tags: Vec<String>,
    pub ingredients_amount: i64,
    pub ingredients: Vec<RecipeIngredientRepr>,
    pub steps_amount: i64,
    pub author: AuthorRepr,
    pub is_favorited: bool,
    pub favorited_by_amount: i64,
}

impl RecipeListRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, recipe: &Recipe) -> Result<Self> {
        Ok(Self::load_with_stats(ctx, recipe).await?.0)
    }

    pub(crate) async fn load_many(ctx: ReprContext<'_>, recipes: &[Recipe]) -> Result<Vec<Self>> {
        let mut reprs = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            reprs.push(Self::load(ctx, recipe).await?);
        }

        Ok(reprs)
    }

    async fn load_with_stats(ctx: ReprContext<'_>, recipe: &Recipe) -> Result<(Self, RecipeStats)> {
        let pool = ctx.pool();
        let stats = RecipeStats::get(pool, recipe.recipe_id, ctx.viewer).await?;

        let cuisine = match recipe.cuisine_id {
            Some(cuisine_id) => Cuisine::get_by_id(pool, cuisine_id).await?.map(|c| c.name),
            None => None,
        };
        let images = RecipeImage::get_by_recipe(pool, recipe.recipe_id)
            .await?
            .iter()
            .map(|image| ImageRepr::new(ctx.config(), image))
            .collect();
        let tags = RecipeTag::get_by_recipe(pool, recipe.recipe_id)
            .await?
            .into_iter()
            .map(|tag| tag.name)
            .collect();

        let repr = Self {
            kind: "recipe",
            id: recipe.recipe_id,
            title: recipe.title.clone(),
            description: recipe.description.clone(),
            servings: recipe.servings,
            cooking_time: CookingTime::from_minutes(i64::from(recipe.cooking_time)),
            cuisine,
            images,
            tags,
            ingredients_amount: stats.ingredients_amount,
            ingredients: RecipeIngredientRepr::load_for_recipe(ctx, recipe).await?,
            steps_amount: stats.steps_amount,
            author: AuthorRepr::load_by_id(ctx, recipe.author_user_id).await?,
            is_favorited: stats.is_favorited,
            favorited_by_amount: stats.favorited_by_amount,
        };

        Ok((repr, stats))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetailLimits {
    pub reviews: i64,
    pub recommended_by: i64,
}

impl Default for DetailLimits {
    fn default() -> Self {
        Self {
            reviews: REVIEWS_LIMIT_DEFAULT,
            recommended_by: RECOMMENDED_BY_LIMIT_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetailRepr {
    #[serde(flatten)]
    pub recipe: RecipeListRepr,
    pub ending_phrase: String,
    pub video: Option<String>,
    pub selections: Vec<SelectionListRepr>,
    pub steps: Vec<StepRepr>,
    pub equipment: Vec<EquipmentRepr>,
    pub created: DateTime<Utc>,
    pub recipes_from_author: Vec<RecipeListRepr>,
    pub is_recommended: bool,
    pub recommended_by: Vec<AuthorRepr>,
    pub reviews: Vec<ReviewRepr>,
}

impl RecipeDetailRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, recipe: &Recipe, limits: DetailLimits) -> Result<Self> {
        let pool = ctx.pool();
        let (list, stats) = RecipeListRepr::load_with_stats(ctx, recipe).await?;

        let selections = Selection::list_for_recipe(pool, recipe.recipe_id).await?;
        let mut selection_reprs = Vec::with_capacity(selections.len());
        for selection in &selections {
            selection_reprs.push(SelectionListRepr::load(ctx, selection).await?);
        }

        let equipment = RecipeEquipment::get_by_recipe(pool, recipe.recipe_id)
            .await?
            .into_iter()
            .map(|e| EquipmentRepr::new(ctx.config(), e))
            .collect();

        let from_author =
            Recipe::list_by_author(pool, recipe.author_user_id, Some(recipe.recipe_id)).await?;

        let mut recommended_by = Vec::new();
        for user in RecipeReaction::Recommend
            .users(pool, recipe.recipe_id, limits.recommended_by)
            .await?
        {
            recommended_by.push(AuthorRepr::load(ctx, user).await?);
        }

        let mut reviews = Vec::new();
        for review in RecipeReview::get_by_recipe(pool, recipe.recipe_id, limits.reviews).await? {
            reviews.push(ReviewRepr::load(ctx, review).await?);
        }

        Ok(Self {
            recipe: list,
            ending_phrase: recipe.ending_phrase.clone(),
            video: media_url(ctx.config(), recipe.video.as_deref()),
            selections: selection_reprs,
            steps: StepRepr::load_for_recipe(ctx, recipe.recipe_id).await?,
            equipment,
            created: recipe.created_at,
            recipes_from_author: RecipeListRepr::load_many(ctx, &from_author).await?,
            is_recommended: stats.is_recommended,
            recommended_by,
            reviews,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionListRepr {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub title: String,
    pub author: AuthorRepr,
    pub cover: Option<String>,
    pub is_favorited: bool,
    pub recipes_count: i64,
    pub favorited_by_amount: i64,
}

impl SelectionListRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, selection: &Selection) -> Result<Self> {
        let stats = SelectionStats::get(ctx.pool(), selection.selection_id, ctx.viewer).await?;

        Ok(Self {
            kind: "selection",
            id: selection.selection_id,
            title: selection.title.clone(),
            author: AuthorRepr::load_by_id(ctx, selection.author_user_id).await?,
            cover: media_url(ctx.config(), selection.cover.as_deref()),
            is_favorited: stats.is_favorited,
            recipes_count: stats.recipes_count,
            favorited_by_amount: stats.favorited_by_amount,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionDetailRepr {
    #[serde(flatten)]
    pub selection: SelectionListRepr,
    pub description: String,
    pub category: Option<String>,
    pub recipes: Vec<RecipeListRepr>,
}

impl SelectionDetailRepr {
    pub(crate) async fn load(ctx: ReprContext<'_>, selection: &Selection) -> Result<Self> {
        let category = db::cooking::Category::get_by_id(ctx.pool(), selection.category_id)
            .await?
            .map(|c| c.name);
        let recipes = Recipe::list_in_selection(ctx.pool(), selection.selection_id).await?;

        Ok(Self {
            selection: SelectionListRepr::load(ctx, selection).await?,
            description: selection.description.clone(),
            category,
            recipes: RecipeListRepr::load_many(ctx, &recipes).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, str::FromStr};

    use bigdecimal::BigDecimal;
    use url::Url;

    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            base_url: Url::parse("https://cook.example.com").unwrap(),
            port: 3000,
            media_root: PathBuf::from("media"),
            media_url: "/media".to_string(),
        }
    }

    fn ingredient(is_flavoring: bool, one_piece_weight: Option<&str>) -> Ingredient {
        Ingredient {
            ingredient_id: Uuid::from_u128(7),
            name: "Egg".to_string(),
            description: String::new(),
            species: "chicken".to_string(),
            image: Some("ingredients/egg.png".to_string()),
            is_flavoring,
            one_piece_weight: one_piece_weight.map(|w| BigDecimal::from_str(w).unwrap()),
            created_at: Utc::now(),
        }
    }

    fn line(amount: &str, unit: &str) -> RecipeIngredient {
        RecipeIngredient {
            recipe_ingredient_id: Uuid::from_u128(1),
            recipe_id: Uuid::from_u128(2),
            ingredient_id: Uuid::from_u128(7),
            amount: BigDecimal::from_str(amount).unwrap(),
            measurement_unit: unit.to_string(),
            cup_grams: None,
            display_order: 0,
        }
    }

    #[test]
    fn test_ingredient_type_follows_flavoring_flag() {
        let repr = IngredientRepr::new(&config(), &ingredient(false, None));
        assert_eq!(repr.kind, "ingredient");
        assert_eq!(
            repr.image.as_deref(),
            Some("https://cook.example.com/media/ingredients/egg.png")
        );

        let repr = IngredientRepr::new(&config(), &ingredient(true, None));
        assert_eq!(repr.kind, "flavoring");
    }

    #[test]
    fn test_recipe_ingredient_scales_with_servings() {
        let repr = RecipeIngredientRepr::build(
            &config(),
            &line("300", "g"),
            &ingredient(false, None),
            4,
            Some(2),
        )
        .unwrap();

        assert_eq!(repr.amount, "150");
        assert_eq!(repr.measurement_unit, MeasurementUnit::Gram);
        assert_eq!(repr.measurement_unit_full, "gram");
    }

    #[test]
    fn test_recipe_ingredient_lists_other_measures() {
        let repr = RecipeIngredientRepr::build(
            &config(),
            &line("2", "pc"),
            &ingredient(false, Some("50")),
            1,
            None,
        )
        .unwrap();

        assert_eq!(repr.amount, "2");
        let grams = &repr.other_measures[0];
        assert_eq!(grams.measure, MeasurementUnit::Gram);
        assert_eq!(grams.amount.to_string(), "100");
    }

    #[test]
    fn test_recipe_ingredient_without_weight_has_no_conversions() {
        let repr = RecipeIngredientRepr::build(
            &config(),
            &line("2", "pc"),
            &ingredient(false, None),
            1,
            None,
        )
        .unwrap();

        assert!(repr.other_measures.is_empty());
    }

    #[test]
    fn test_image_repr_points_at_media_url() {
        let image = RecipeImage {
            recipe_image_id: Uuid::from_u128(1),
            recipe_id: Uuid::from_u128(2),
            image: "recipes/images/cover.png".to_string(),
            is_cover: true,
        };

        assert_eq!(
            ImageRepr::new(&config(), &image),
            ImageRepr {
                image: "https://cook.example.com/media/recipes/images/cover.png".to_string(),
                is_cover: true,
            }
        );
    }

    #[test]
    fn test_cooking_time_serializes_as_hours_and_minutes() {
        let value = serde_json::to_value(CookingTime::from_minutes(95)).unwrap();

        assert_eq!(value, serde_json::json!({"hours": 1, "minutes": 35}));
    }
}
