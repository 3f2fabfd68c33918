use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub image: Option<String>,
    pub background_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub image: Option<String>,
    pub background_image: Option<String>,
}

const USER_COLUMNS: &str = "
    user_id,
    username,
    email,
    name,
    surname,
    image,
    background_image,
    created_at,
    updated_at
";

impl User {
    pub async fn create(conn: &mut PgConnection, new: NewUser) -> Result<Self> {
        let user = sqlx::query_as::<_, User>(&format!(
            "
            INSERT INTO users (username, email, name, surname, image, background_image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.name)
        .bind(new.surname)
        .bind(new.image)
        .bind(new.background_image)
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    pub async fn get_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_ids(pool: &PgPool, user_ids: &[Uuid]) -> Result<Vec<Self>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ANY($1) ORDER BY created_at DESC"
        ))
        .bind(user_ids)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// Resolves an API token to its owner.
    #[tracing::instrument(skip_all, err)]
    pub async fn get_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>(
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
            JOIN auth_tokens t ON t.user_id = u.user_id
            WHERE t.token = $1
            ",
        )
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn count(pool: &PgPool) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    pub async fn recipes_count(pool: &PgPool, user_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE author_user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

pub struct AuthToken;

impl AuthToken {
    pub async fn create(conn: &mut PgConnection, user_id: Uuid, token: &str) -> Result<()> {
        sqlx::query("INSERT INTO auth_tokens (token, user_id) VALUES ($1, $2)")
            .bind(token)
            .bind(user_id)
            .execute(conn)
            .await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub user_id: Uuid,
    pub following_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Follow {
    pub async fn exists(pool: &PgPool, user_id: Uuid, following_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND following_id = $2)",
        )
        .bind(user_id)
        .bind(following_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}
