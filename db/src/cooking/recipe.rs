use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::filters::RecipeFilter;
use crate::pagination::{CursorKey, Page, PageRequest};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipe {
    pub recipe_id: Uuid,
    pub title: String,
    pub description: String,
    pub servings: i16,
    pub cooking_time: i16, // minutes
    pub ending_phrase: String,
    pub video: Option<String>,
    pub cuisine_id: Option<Uuid>,
    pub author_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CursorKey for Recipe {
    fn cursor_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.recipe_id)
    }
}

pub const DEFAULT_ENDING_PHRASE: &str = "Bon appetit!";

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub description: String,
    pub servings: i16,
    pub cooking_time: i16,
    pub ending_phrase: String,
    pub video: Option<String>,
    pub cuisine_id: Option<Uuid>,
    pub author_user_id: Uuid,
}

/// Columns to overwrite on update. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub servings: Option<i16>,
    pub cooking_time: Option<i16>,
    pub ending_phrase: Option<String>,
    pub video: Option<Option<String>>,
    pub cuisine_id: Option<Option<Uuid>>,
}

/// Aggregates shown next to a recipe, relative to an optional viewer.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct RecipeStats {
    pub ingredients_amount: i64,
    pub steps_amount: i64,
    pub favorited_by_amount: i64,
    pub is_favorited: bool,
    pub is_recommended: bool,
}

const RECIPE_COLUMNS: &str = "
    r.recipe_id,
    r.title,
    r.description,
    r.servings,
    r.cooking_time,
    r.ending_phrase,
    r.video,
    r.cuisine_id,
    r.author_user_id,
    r.created_at,
    r.updated_at
";

impl Recipe {
    #[tracing::instrument(skip_all, err)]
    pub async fn create(conn: &mut PgConnection, new: NewRecipe) -> Result<Self> {
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "
            INSERT INTO recipes AS r (
                title, description, servings, cooking_time,
                ending_phrase, video, cuisine_id, author_user_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RECIPE_COLUMNS}
            "
        ))
        .bind(new.title)
        .bind(new.description)
        .bind(new.servings)
        .bind(new.cooking_time)
        .bind(new.ending_phrase)
        .bind(new.video)
        .bind(new.cuisine_id)
        .bind(new.author_user_id)
        .fetch_one(conn)
        .await?;

        Ok(recipe)
    }

    pub async fn get_by_id(pool: &PgPool, recipe_id: Uuid) -> Result<Option<Self>> {
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.recipe_id = $1"
        ))
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?;

        Ok(recipe)
    }

    /// Other recipes by the same author, newest first.
    pub async fn list_by_author(
        pool: &PgPool,
        author_user_id: Uuid,
        excluding: Option<Uuid>,
    ) -> Result<Vec<Self>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "
            SELECT {RECIPE_COLUMNS}
            FROM recipes r
            WHERE r.author_user_id = $1
              AND ($2::UUID IS NULL OR r.recipe_id <> $2)
            ORDER BY r.created_at DESC, r.recipe_id DESC
            "
        ))
        .bind(author_user_id)
        .bind(excluding)
        .fetch_all(pool)
        .await?;

        Ok(recipes)
    }

    pub async fn list_in_selection(pool: &PgPool, selection_id: Uuid) -> Result<Vec<Self>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "
            SELECT {RECIPE_COLUMNS}
            FROM recipes r
            JOIN selection_recipes sr ON sr.recipe_id = r.recipe_id
            WHERE sr.selection_id = $1
            ORDER BY sr.created_at, r.recipe_id
            "
        ))
        .bind(selection_id)
        .fetch_all(pool)
        .await?;

        Ok(recipes)
    }

    /// One page of recipes matching `filter`.
    #[tracing::instrument(skip_all, err)]
    pub async fn list(pool: &PgPool, filter: &RecipeFilter, page: &PageRequest) -> Result<Page<Self>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE TRUE"
        ));
        filter.push_conditions(&mut qb);
        page.push_keyset(&mut qb, "r.created_at", "r.recipe_id");
        page.push_order_and_limit(&mut qb, "r.created_at", "r.recipe_id");

        let rows = qb.build_query_as::<Recipe>().fetch_all(pool).await?;

        Ok(page.finish(rows))
    }

    /// Ids of every recipe matching `filter`, used to pick one at random.
    pub async fn matching_ids(pool: &PgPool, filter: &RecipeFilter) -> Result<Vec<Uuid>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT r.recipe_id FROM recipes r WHERE TRUE");
        filter.push_conditions(&mut qb);

        let ids = qb.build_query_scalar::<Uuid>().fetch_all(pool).await?;

        Ok(ids)
    }

    #[tracing::instrument(skip_all, err)]
    pub async fn update(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        changes: RecipeChanges,
    ) -> Result<Self> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE recipes AS r SET updated_at = NOW()");

        if let Some(title) = changes.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = changes.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(servings) = changes.servings {
            qb.push(", servings = ").push_bind(servings);
        }
        if let Some(cooking_time) = changes.cooking_time {
            qb.push(", cooking_time = ").push_bind(cooking_time);
        }
        if let Some(ending_phrase) = changes.ending_phrase {
            qb.push(", ending_phrase = ").push_bind(ending_phrase);
        }
        if let Some(video) = changes.video {
            qb.push(", video = ").push_bind(video);
        }
        if let Some(cuisine_id) = changes.cuisine_id {
            qb.push(", cuisine_id = ").push_bind(cuisine_id);
        }

        qb.push(" WHERE r.recipe_id = ")
            .push_bind(recipe_id)
            .push(format!(" RETURNING {RECIPE_COLUMNS}"));

        let recipe = qb.build_query_as::<Recipe>().fetch_one(conn).await?;

        Ok(recipe)
    }

    pub async fn delete(pool: &PgPool, recipe_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recipes WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// How many of `recipe_ids` exist.
    pub async fn count_existing(pool: &PgPool, recipe_ids: &[Uuid]) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE recipe_id = ANY($1)")
            .bind(recipe_ids)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    pub async fn count(pool: &PgPool) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

impl RecipeStats {
    pub async fn get(pool: &PgPool, recipe_id: Uuid, viewer: Option<Uuid>) -> Result<Self> {
        let stats = sqlx::query_as::<_, RecipeStats>(
            "
            SELECT
                (SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = $1) AS ingredients_amount,
                (SELECT COUNT(*) FROM recipe_steps WHERE recipe_id = $1) AS steps_amount,
                (SELECT COUNT(*) FROM favorite_recipes WHERE recipe_id = $1) AS favorited_by_amount,
                EXISTS (
                    SELECT 1 FROM favorite_recipes WHERE recipe_id = $1 AND user_id = $2
                ) AS is_favorited,
                EXISTS (
                    SELECT 1 FROM recommend_recipes WHERE recipe_id = $1 AND user_id = $2
                ) AS is_recommended
            ",
        )
        .bind(recipe_id)
        .bind(viewer)
        .fetch_one(pool)
        .await?;

        Ok(stats)
    }
}
