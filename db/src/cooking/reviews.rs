use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipeReview {
    pub review_id: Uuid,
    pub recipe_id: Uuid,
    pub user_id: Uuid,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl RecipeReview {
    pub async fn create(pool: &PgPool, recipe_id: Uuid, user_id: Uuid, comment: &str) -> Result<Self> {
        let review = sqlx::query_as::<_, RecipeReview>(
            "
            INSERT INTO recipe_reviews (recipe_id, user_id, comment)
            VALUES ($1, $2, $3)
            RETURNING review_id, recipe_id, user_id, comment, created_at
            ",
        )
        .bind(recipe_id)
        .bind(user_id)
        .bind(comment)
        .fetch_one(pool)
        .await?;

        Ok(review)
    }

    /// Newest reviews first.
    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid, limit: i64) -> Result<Vec<Self>> {
        let reviews = sqlx::query_as::<_, RecipeReview>(
            "
            SELECT review_id, recipe_id, user_id, comment, created_at
            FROM recipe_reviews
            WHERE recipe_id = $1
            ORDER BY created_at DESC, review_id DESC
            LIMIT $2
            ",
        )
        .bind(recipe_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(reviews)
    }
}
