//! Favorites and recommendations: per-user marks on recipes and selections.

use color_eyre::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::users::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeReaction {
    Favorite,
    Recommend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReaction {
    Favorite,
    Recommend,
}

impl RecipeReaction {
    fn table(self) -> &'static str {
        match self {
            RecipeReaction::Favorite => "favorite_recipes",
            RecipeReaction::Recommend => "recommend_recipes",
        }
    }

    /// Returns `false` when the user had already reacted.
    pub async fn add(self, pool: &PgPool, user_id: Uuid, recipe_id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            self.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns `false` when there was nothing to remove.
    pub async fn remove(self, pool: &PgPool, user_id: Uuid, recipe_id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            self.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Most recent users to react, newest first.
    pub async fn users(self, pool: &PgPool, recipe_id: Uuid, limit: i64) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "
            SELECT
                u.user_id,
                u.username,
                u.email,
                u.name,
                u.surname,
                u.image,
                u.background_image,
                u.created_at,
                u.updated_at
            FROM users u
            JOIN {} x ON x.user_id = u.user_id
            WHERE x.recipe_id = $1
            ORDER BY x.created_at DESC
            LIMIT $2
            ",
            self.table()
        ))
        .bind(recipe_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }
}

impl SelectionReaction {
    fn table(self) -> &'static str {
        match self {
            SelectionReaction::Favorite => "favorite_selections",
            SelectionReaction::Recommend => "recommend_selections",
        }
    }

    pub async fn add(self, pool: &PgPool, user_id: Uuid, selection_id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (user_id, selection_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            self.table()
        ))
        .bind(user_id)
        .bind(selection_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn remove(self, pool: &PgPool, user_id: Uuid, selection_id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND selection_id = $2",
            self.table()
        ))
        .bind(user_id)
        .bind(selection_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooking::recipe::{NewRecipe, Recipe};
    use crate::users::NewUser;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn reacting_twice_is_reported(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let user = User::create(
            &mut conn,
            NewUser {
                username: "fan".to_string(),
                email: "fan@example.com".to_string(),
                name: "Sam".to_string(),
                surname: "Lee".to_string(),
                ..NewUser::default()
            },
        )
        .await
        .unwrap();
        let recipe = Recipe::create(
            &mut conn,
            NewRecipe {
                title: "Pancakes".to_string(),
                description: String::new(),
                servings: 2,
                cooking_time: 20,
                ending_phrase: "Enjoy".to_string(),
                video: None,
                cuisine_id: None,
                author_user_id: user.user_id,
            },
        )
        .await
        .unwrap();
        drop(conn);

        let favorite = RecipeReaction::Favorite;
        assert!(favorite.add(&pool, user.user_id, recipe.recipe_id).await.unwrap());
        assert!(!favorite.add(&pool, user.user_id, recipe.recipe_id).await.unwrap());

        let fans = favorite.users(&pool, recipe.recipe_id, 5).await.unwrap();
        assert_eq!(fans.len(), 1);

        assert!(favorite.remove(&pool, user.user_id, recipe.recipe_id).await.unwrap());
        assert!(!favorite.remove(&pool, user.user_id, recipe.recipe_id).await.unwrap());
    }
}
