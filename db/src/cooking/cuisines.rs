use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cuisine {
    pub cuisine_id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Cuisine {
    pub async fn create(conn: &mut PgConnection, name: &str, description: &str) -> Result<Self> {
        let cuisine = sqlx::query_as::<_, Cuisine>(
            "
            INSERT INTO cuisines (name, description)
            VALUES ($1, $2)
            RETURNING cuisine_id, name, description, created_at
            ",
        )
        .bind(name)
        .bind(description)
        .fetch_one(conn)
        .await?;

        Ok(cuisine)
    }

    pub async fn get_by_id(pool: &PgPool, cuisine_id: Uuid) -> Result<Option<Self>> {
        let cuisine = sqlx::query_as::<_, Cuisine>(
            "SELECT cuisine_id, name, description, created_at FROM cuisines WHERE cuisine_id = $1",
        )
        .bind(cuisine_id)
        .fetch_optional(pool)
        .await?;

        Ok(cuisine)
    }

    pub async fn get_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>> {
        let cuisine = sqlx::query_as::<_, Cuisine>(
            "SELECT cuisine_id, name, description, created_at FROM cuisines WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(cuisine)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        let cuisines = sqlx::query_as::<_, Cuisine>(
            "SELECT cuisine_id, name, description, created_at FROM cuisines ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        Ok(cuisines)
    }
}
