use std::path::PathBuf;

use color_eyre::eyre::Context;
use db::setup_db_pool;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use url::Url;

use crate::http_server::media::MediaStore;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub base_url: Url,
    pub port: u16,
    pub media_root: PathBuf,
    /// Path prefix uploaded files are served under, e.g. `/media`.
    pub media_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    #[instrument(name = "AppConfig::from_env")]
    pub fn from_env() -> color_eyre::Result<Self> {
        let base_url = env_or("APP_BASE_URL", "http://localhost:3000");
        let base_url = Url::parse(&base_url).wrap_err("Invalid APP_BASE_URL not parsable")?;

        let port = env_or("PORT", "3000")
            .parse()
            .wrap_err("PORT must be a valid port number")?;

        let media_url = env_or("MEDIA_URL", "/media");
        let media_url = format!("/{}", media_url.trim_matches('/'));

        Ok(Self {
            base_url,
            port,
            media_root: PathBuf::from(env_or("MEDIA_ROOT", "media")),
            media_url,
        })
    }

    pub fn app_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();

        url.set_path(path);

        url
    }

    /// Absolute URL of a stored media file.
    pub fn media_file_url(&self, stored_path: &str) -> String {
        let path = format!("{}/{}", self.media_url, stored_path.trim_start_matches('/'));

        self.app_url(&path).into()
    }

    pub fn media(&self) -> MediaStore {
        MediaStore::new(self.media_root.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

impl VersionInfo {
    pub fn from_env() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AppState {
    pub app: AppConfig,
    pub versions: VersionInfo,
    pub db: PgPool,
}

impl AppState {
    #[instrument(name = "AppState::from_env", err)]
    pub async fn from_env() -> color_eyre::Result<Self> {
        let app_state = AppState {
            app: AppConfig::from_env()?,
            versions: VersionInfo::from_env(),
            db: setup_db_pool().await?,
        };

        Ok(app_state)
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            base_url: Url::parse("https://cook.example.com").unwrap(),
            port: 3000,
            media_root: PathBuf::from("media"),
            media_url: "/media".to_string(),
        }
    }

    #[test]
    fn test_media_file_url_joins_prefix_and_path() {
        assert_eq!(
            config().media_file_url("recipes/images/a.png"),
            "https://cook.example.com/media/recipes/images/a.png"
        );
    }

    #[test]
    fn test_app_url_replaces_path() {
        assert_eq!(
            config().app_url("/api/recipes").as_str(),
            "https://cook.example.com/api/recipes"
        );
    }
}
