use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub tag_id: Uuid,
    pub name: String,
}

impl Tag {
    /// Looks up tags by name, creating the ones that don't exist yet.
    /// Returned in the order the names were given.
    pub async fn get_or_create_by_names(conn: &mut PgConnection, names: &[String]) -> Result<Vec<Self>> {
        let mut tags = Vec::with_capacity(names.len());

        for name in names {
            let tag = sqlx::query_as::<_, Tag>(
                "
                INSERT INTO tags (name)
                VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING tag_id, name
                ",
            )
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

            tags.push(tag);
        }

        Ok(tags)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT tag_id, name FROM tags ORDER BY name")
            .fetch_all(pool)
            .await?;

        Ok(tags)
    }
}

pub struct RecipeTag;

impl RecipeTag {
    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            "
            SELECT t.tag_id, t.name
            FROM tags t
            JOIN recipe_tags rt ON rt.tag_id = t.tag_id
            WHERE rt.recipe_id = $1
            ORDER BY t.name
            ",
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(tags)
    }

    pub async fn set_for_recipe(conn: &mut PgConnection, recipe_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "
            INSERT INTO recipe_tags (recipe_id, tag_id)
            SELECT $1, UNNEST($2::UUID[])
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(recipe_id)
        .bind(tag_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
