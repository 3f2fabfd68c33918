use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Equipment {
    pub equipment_id: Uuid,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEquipment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image: Option<String>,
}

impl Equipment {
    pub async fn create(conn: &mut PgConnection, new: NewEquipment) -> Result<Self> {
        let equipment = sqlx::query_as::<_, Equipment>(
            "
            INSERT INTO equipment (name, description, image)
            VALUES ($1, $2, $3)
            RETURNING equipment_id, name, description, image, created_at
            ",
        )
        .bind(new.name)
        .bind(new.description)
        .bind(new.image)
        .fetch_one(conn)
        .await?;

        Ok(equipment)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        let equipment = sqlx::query_as::<_, Equipment>(
            "SELECT equipment_id, name, description, image, created_at FROM equipment ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        Ok(equipment)
    }

    /// How many of `equipment_ids` exist.
    pub async fn count_existing(pool: &PgPool, equipment_ids: &[Uuid]) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM equipment WHERE equipment_id = ANY($1)",
        )
        .bind(equipment_ids)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

pub struct RecipeEquipment;

impl RecipeEquipment {
    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Equipment>> {
        let equipment = sqlx::query_as::<_, Equipment>(
            "
            SELECT e.equipment_id, e.name, e.description, e.image, e.created_at
            FROM equipment e
            JOIN recipe_equipment re ON re.equipment_id = e.equipment_id
            WHERE re.recipe_id = $1
            ORDER BY e.name
            ",
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(equipment)
    }

    pub async fn set_for_recipe(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        equipment_ids: &[Uuid],
    ) -> Result<()> {
        sqlx::query("DELETE FROM recipe_equipment WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "
            INSERT INTO recipe_equipment (recipe_id, equipment_id)
            SELECT $1, UNNEST($2::UUID[])
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(recipe_id)
        .bind(equipment_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
