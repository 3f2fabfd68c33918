use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipeImage {
    pub recipe_image_id: Uuid,
    pub recipe_id: Uuid,
    pub image: String,
    pub is_cover: bool,
}

#[derive(Debug, Clone)]
pub struct NewRecipeImage {
    pub image: String,
    pub is_cover: bool,
}

impl RecipeImage {
    /// Cover first, then in upload order.
    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Self>> {
        let images = sqlx::query_as::<_, RecipeImage>(
            "
            SELECT recipe_image_id, recipe_id, image, is_cover
            FROM recipe_images
            WHERE recipe_id = $1
            ORDER BY is_cover DESC, created_at, recipe_image_id
            ",
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(images)
    }

    /// Stored paths of every image attached to a recipe.
    pub async fn paths_for_recipe(conn: &mut PgConnection, recipe_id: Uuid) -> Result<Vec<String>> {
        let paths = sqlx::query_scalar("SELECT image FROM recipe_images WHERE recipe_id = $1")
            .bind(recipe_id)
            .fetch_all(conn)
            .await?;

        Ok(paths)
    }

    /// Swaps the recipe's images for `images`, returning the paths that are
    /// no longer referenced.
    pub async fn replace_for_recipe(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        images: Vec<NewRecipeImage>,
    ) -> Result<Vec<String>> {
        let removed: Vec<String> =
            sqlx::query_scalar("DELETE FROM recipe_images WHERE recipe_id = $1 RETURNING image")
                .bind(recipe_id)
                .fetch_all(&mut *conn)
                .await?;

        for image in &images {
            Self::insert(conn, recipe_id, image).await?;
        }

        Ok(removed
            .into_iter()
            .filter(|path| !images.iter().any(|image| &image.image == path))
            .collect())
    }

    pub async fn insert(conn: &mut PgConnection, recipe_id: Uuid, image: &NewRecipeImage) -> Result<Self> {
        let saved = sqlx::query_as::<_, RecipeImage>(
            "
            INSERT INTO recipe_images (recipe_id, image, is_cover)
            VALUES ($1, $2, $3)
            RETURNING recipe_image_id, recipe_id, image, is_cover
            ",
        )
        .bind(recipe_id)
        .bind(&image.image)
        .bind(image.is_cover)
        .fetch_one(conn)
        .await?;

        Ok(saved)
    }
}
