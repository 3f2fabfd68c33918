use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Selections whose category is deleted fall back to this one.
pub const FALLBACK_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub category_id: Uuid,
    pub name: String,
    pub description: String,
}

impl Category {
    pub async fn get_or_create(conn: &mut PgConnection, name: &str) -> Result<Self> {
        let category = sqlx::query_as::<_, Category>(
            "
            INSERT INTO categories (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING category_id, name, description
            ",
        )
        .bind(name)
        .fetch_one(conn)
        .await?;

        Ok(category)
    }

    /// Creates the category or overwrites the description of an existing one.
    pub async fn upsert(conn: &mut PgConnection, name: &str, description: &str) -> Result<Self> {
        let category = sqlx::query_as::<_, Category>(
            "
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
            RETURNING category_id, name, description
            ",
        )
        .bind(name)
        .bind(description)
        .fetch_one(conn)
        .await?;

        Ok(category)
    }

    pub async fn get_by_id(pool: &PgPool, category_id: Uuid) -> Result<Option<Self>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT category_id, name, description FROM categories WHERE category_id = $1",
        )
        .bind(category_id)
        .fetch_optional(pool)
        .await?;

        Ok(category)
    }

    pub async fn fallback(conn: &mut PgConnection) -> Result<Self> {
        Self::get_or_create(conn, FALLBACK_CATEGORY).await
    }

    /// Deletes a category, moving its selections to the fallback category.
    #[tracing::instrument(skip(pool), err)]
    pub async fn delete(pool: &PgPool, category_id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await?;
        let fallback = Self::fallback(&mut tx).await?;

        if fallback.category_id == category_id {
            return Err(eyre!("The {FALLBACK_CATEGORY} category can not be deleted"));
        }

        sqlx::query("UPDATE selections SET category_id = $1 WHERE category_id = $2")
            .bind(fallback.category_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM categories WHERE category_id = $1")
            .bind(category_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Selection {
    pub selection_id: Uuid,
    pub title: String,
    pub description: String,
    pub cover: Option<String>,
    pub author_user_id: Uuid,
    pub category_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSelection {
    pub title: String,
    pub description: String,
    pub cover: Option<String>,
    pub author_user_id: Uuid,
    pub category_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover: Option<Option<String>>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct SelectionStats {
    pub recipes_count: i64,
    pub favorited_by_amount: i64,
    pub is_favorited: bool,
}

const SELECTION_COLUMNS: &str = "
    s.selection_id,
    s.title,
    s.description,
    s.cover,
    s.author_user_id,
    s.category_id,
    s.created_at
";

impl Selection {
    pub async fn create(conn: &mut PgConnection, new: NewSelection) -> Result<Self> {
        let selection = sqlx::query_as::<_, Selection>(&format!(
            "
            INSERT INTO selections AS s (title, description, cover, author_user_id, category_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SELECTION_COLUMNS}
            "
        ))
        .bind(new.title)
        .bind(new.description)
        .bind(new.cover)
        .bind(new.author_user_id)
        .bind(new.category_id)
        .fetch_one(conn)
        .await?;

        Ok(selection)
    }

    pub async fn get_by_id(pool: &PgPool, selection_id: Uuid) -> Result<Option<Self>> {
        let selection = sqlx::query_as::<_, Selection>(&format!(
            "SELECT {SELECTION_COLUMNS} FROM selections s WHERE s.selection_id = $1"
        ))
        .bind(selection_id)
        .fetch_optional(pool)
        .await?;

        Ok(selection)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        let selections = sqlx::query_as::<_, Selection>(&format!(
            "SELECT {SELECTION_COLUMNS} FROM selections s ORDER BY s.created_at DESC, s.selection_id DESC"
        ))
        .fetch_all(pool)
        .await?;

        Ok(selections)
    }

    pub async fn list_for_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Self>> {
        let selections = sqlx::query_as::<_, Selection>(&format!(
            "
            SELECT {SELECTION_COLUMNS}
            FROM selections s
            JOIN selection_recipes sr ON sr.selection_id = s.selection_id
            WHERE sr.recipe_id = $1
            ORDER BY s.title
            "
        ))
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(selections)
    }

    /// How many of `selection_ids` exist.
    pub async fn count_existing(pool: &PgPool, selection_ids: &[Uuid]) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM selections WHERE selection_id = ANY($1)")
            .bind(selection_ids)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    pub async fn update(
        conn: &mut PgConnection,
        selection_id: Uuid,
        changes: SelectionChanges,
    ) -> Result<Self> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE selections AS s SET ");
        let mut set = qb.separated(", ");
        let mut changed = false;

        if let Some(title) = changes.title {
            set.push("title = ").push_bind_unseparated(title);
            changed = true;
        }
        if let Some(description) = changes.description {
            set.push("description = ").push_bind_unseparated(description);
            changed = true;
        }
        if let Some(cover) = changes.cover {
            set.push("cover = ").push_bind_unseparated(cover);
            changed = true;
        }
        if let Some(category_id) = changes.category_id {
            set.push("category_id = ").push_bind_unseparated(category_id);
            changed = true;
        }

        if !changed {
            let selection = sqlx::query_as::<_, Selection>(&format!(
                "SELECT {SELECTION_COLUMNS} FROM selections s WHERE s.selection_id = $1"
            ))
            .bind(selection_id)
            .fetch_one(conn)
            .await?;

            return Ok(selection);
        }

        qb.push(" WHERE s.selection_id = ")
            .push_bind(selection_id)
            .push(format!(" RETURNING {SELECTION_COLUMNS}"));

        let selection = qb.build_query_as::<Selection>().fetch_one(conn).await?;

        Ok(selection)
    }

    /// Deletes the selection and returns its cover path, if any.
    pub async fn delete(pool: &PgPool, selection_id: Uuid) -> Result<Option<Option<String>>> {
        let cover = sqlx::query_scalar("DELETE FROM selections WHERE selection_id = $1 RETURNING cover")
            .bind(selection_id)
            .fetch_optional(pool)
            .await?;

        Ok(cover)
    }

    pub async fn set_recipes(conn: &mut PgConnection, selection_id: Uuid, recipe_ids: &[Uuid]) -> Result<()> {
        sqlx::query("DELETE FROM selection_recipes WHERE selection_id = $1")
            .bind(selection_id)
            .execute(&mut *conn)
            .await?;

        Self::add_recipes(conn, selection_id, recipe_ids).await
    }

    pub async fn add_recipes(conn: &mut PgConnection, selection_id: Uuid, recipe_ids: &[Uuid]) -> Result<()> {
        sqlx::query(
            "
            INSERT INTO selection_recipes (selection_id, recipe_id)
            SELECT $1, UNNEST($2::UUID[])
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(selection_id)
        .bind(recipe_ids)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Puts a recipe in exactly the given selections.
    pub async fn set_for_recipe(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        selection_ids: &[Uuid],
    ) -> Result<()> {
        sqlx::query("DELETE FROM selection_recipes WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "
            INSERT INTO selection_recipes (selection_id, recipe_id)
            SELECT UNNEST($1::UUID[]), $2
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(selection_ids)
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn recipe_ids(pool: &PgPool, selection_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT recipe_id FROM selection_recipes WHERE selection_id = $1")
            .bind(selection_id)
            .fetch_all(pool)
            .await?;

        Ok(ids)
    }
}

impl SelectionStats {
    pub async fn get(pool: &PgPool, selection_id: Uuid, viewer: Option<Uuid>) -> Result<Self> {
        let stats = sqlx::query_as::<_, SelectionStats>(
            "
            SELECT
                (SELECT COUNT(*) FROM selection_recipes WHERE selection_id = $1) AS recipes_count,
                (SELECT COUNT(*) FROM favorite_selections WHERE selection_id = $1) AS favorited_by_amount,
                EXISTS (
                    SELECT 1 FROM favorite_selections WHERE selection_id = $1 AND user_id = $2
                ) AS is_favorited
            ",
        )
        .bind(selection_id)
        .bind(viewer)
        .fetch_one(pool)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{NewUser, User};

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn deleting_a_category_moves_selections_to_fallback(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let author = User::create(
            &mut conn,
            NewUser {
                username: "curator".to_string(),
                email: "curator@example.com".to_string(),
                name: "Ada".to_string(),
                surname: "Moss".to_string(),
                ..NewUser::default()
            },
        )
        .await
        .unwrap();
        let desserts = Category::get_or_create(&mut conn, "Desserts").await.unwrap();
        let selection = Selection::create(
            &mut conn,
            NewSelection {
                title: "Summer sweets".to_string(),
                description: String::new(),
                cover: None,
                author_user_id: author.user_id,
                category_id: desserts.category_id,
            },
        )
        .await
        .unwrap();
        drop(conn);

        Category::delete(&pool, desserts.category_id).await.unwrap();

        let moved = Selection::get_by_id(&pool, selection.selection_id)
            .await
            .unwrap()
            .unwrap();
        let category = Category::get_by_id(&pool, moved.category_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(category.name, FALLBACK_CATEGORY);

        let mut conn = pool.acquire().await.unwrap();
        let fallback = Category::fallback(&mut conn).await.unwrap();
        drop(conn);
        assert!(Category::delete(&pool, fallback.category_id).await.is_err());
    }
}
