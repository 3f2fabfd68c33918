use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use color_eyre::eyre::eyre;
use db::{
    cooking::{filters::is_servings_scale, RecipeFilter},
    pagination::{Cursor, Page, PageRequest},
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::{errors::WithStatus, repr::DetailLimits, ResponseResult, ServerError};
use crate::{
    validation::{MAX_SERVINGS, MIN_SERVINGS},
    AppConfig,
};

pub(crate) mod catalog;
pub(crate) mod recipes;
pub(crate) mod selections;

/// Query string pairs in the order they were sent.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryParams(Vec<(String, String)>);

impl<S: Send + Sync> FromRequestParts<S> for QueryParams {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::parse(parts.uri.query().unwrap_or_default())
    }
}

impl QueryParams {
    pub fn parse(query: &str) -> ResponseResult<Self> {
        serde_urlencoded::from_str(query)
            .map(QueryParams)
            .with_status(StatusCode::BAD_REQUEST)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn positive_int(&self, key: &str) -> ResponseResult<Option<i64>> {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<i64>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    ServerError(
                        eyre!("Invalid {key} value. Must be a positive integer."),
                        StatusCode::BAD_REQUEST,
                    )
                })
            })
            .transpose()
    }

    /// Servings to rescale amounts to. `servings=gt=2` style values are filters.
    pub fn servings(&self) -> ResponseResult<Option<i64>> {
        self.pairs()
            .find(|(key, raw)| *key == "servings" && is_servings_scale(raw))
            .map(|(_, raw)| {
                raw.trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|n| (MIN_SERVINGS..=MAX_SERVINGS).contains(n))
                    .ok_or_else(|| {
                        bad_request(format!(
                            "Invalid servings value. Must be an integer between {MIN_SERVINGS} and {MAX_SERVINGS}."
                        ))
                    })
            })
            .transpose()
    }

    pub fn detail_limits(&self) -> ResponseResult<DetailLimits> {
        let defaults = DetailLimits::default();

        Ok(DetailLimits {
            reviews: self.positive_int("reviews_limit")?.unwrap_or(defaults.reviews),
            recommended_by: self
                .positive_int("recommended_by_limit")?
                .unwrap_or(defaults.recommended_by),
        })
    }

    pub fn recipe_filter(&self) -> ResponseResult<RecipeFilter> {
        RecipeFilter::parse(self.pairs()).with_status(StatusCode::BAD_REQUEST)
    }

    pub fn page_request(&self) -> ResponseResult<PageRequest> {
        PageRequest::from_params(self.get("page_size"), self.get("cursor"), self.get("ordering"))
            .with_status(StatusCode::BAD_REQUEST)
    }

    /// Link to the same listing at another cursor.
    fn link(&self, config: &AppConfig, path: &str, cursor: &Cursor) -> String {
        let mut url = config.app_url(path);
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in self.pairs().filter(|(key, _)| *key != "cursor") {
                query.append_pair(key, value);
            }
            query.append_pair("cursor", &cursor.encode());
        }

        url.into()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PageRepr<T> {
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageRepr<T> {
    pub fn new<U>(config: &AppConfig, path: &str, params: &QueryParams, page: &Page<U>, results: Vec<T>) -> Self {
        Self {
            next: page.next.as_ref().map(|c| params.link(config, path, c)),
            previous: page.previous.as_ref().map(|c| params.link(config, path, c)),
            results,
        }
    }
}

/// `Json`, with rejections rendered in the API's error shape.
pub(crate) struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> ServerError {
    ServerError(eyre!(rejection.body_text()), rejection.status())
}

pub(crate) fn parse_id(raw: &str) -> ResponseResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| super::errors::not_found())
}

/// Whether a `COUNT(*)` over `ids` found every one of them.
pub(crate) fn all_exist(found: i64, ids: &[Uuid]) -> bool {
    usize::try_from(found).is_ok_and(|found| found == ids.len())
}

pub(crate) fn forbidden() -> ServerError {
    ServerError(
        eyre!("You do not have permission to perform this action."),
        StatusCode::FORBIDDEN,
    )
}

pub(crate) fn bad_request(message: impl Into<String>) -> ServerError {
    ServerError(eyre!(message.into()), StatusCode::BAD_REQUEST)
}
