use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipeStep {
    pub step_id: Uuid,
    pub recipe_id: Uuid,
    pub serial_num: i32,
    pub title: String,
    pub description: String,
    pub note: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewStep {
    pub title: String,
    pub description: String,
    pub note: String,
    pub ingredient_ids: Vec<Uuid>,
}

/// An ingredient referenced by a step, with the bits the step view shows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StepIngredient {
    pub step_id: Uuid,
    pub ingredient_id: Uuid,
    pub name: String,
    pub species: String,
    pub image: Option<String>,
}

impl RecipeStep {
    /// Replaces the recipe's steps. Serial numbers follow the given order,
    /// starting at one.
    pub async fn replace_for_recipe(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        steps: Vec<NewStep>,
    ) -> Result<Vec<Self>> {
        sqlx::query("DELETE FROM recipe_steps WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *conn)
            .await?;

        let mut saved_steps = Vec::with_capacity(steps.len());

        for (serial_num, step) in (1_i32..).zip(steps) {
            let saved = sqlx::query_as::<_, RecipeStep>(
                "
                INSERT INTO recipe_steps (recipe_id, serial_num, title, description, note)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING step_id, recipe_id, serial_num, title, description, note
                ",
            )
            .bind(recipe_id)
            .bind(serial_num)
            .bind(step.title)
            .bind(step.description)
            .bind(step.note)
            .fetch_one(&mut *conn)
            .await?;

            sqlx::query(
                "
                INSERT INTO step_ingredients (step_id, ingredient_id)
                SELECT $1, UNNEST($2::UUID[])
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(saved.step_id)
            .bind(&step.ingredient_ids)
            .execute(&mut *conn)
            .await?;

            saved_steps.push(saved);
        }

        Ok(saved_steps)
    }

    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Self>> {
        let steps = sqlx::query_as::<_, RecipeStep>(
            "
            SELECT step_id, recipe_id, serial_num, title, description, note
            FROM recipe_steps
            WHERE recipe_id = $1
            ORDER BY serial_num
            ",
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(steps)
    }
}

impl StepIngredient {
    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Self>> {
        let ingredients = sqlx::query_as::<_, StepIngredient>(
            "
            SELECT si.step_id, i.ingredient_id, i.name, i.species, i.image
            FROM step_ingredients si
            JOIN recipe_steps s ON s.step_id = si.step_id
            JOIN ingredients i ON i.ingredient_id = si.ingredient_id
            WHERE s.recipe_id = $1
            ORDER BY s.serial_num, i.name
            ",
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(ingredients)
    }
}
