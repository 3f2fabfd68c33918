//! Keyset ("cursor") pagination over `(created_at, id)`.
//!
//! Cursors are opaque to clients: URL-safe base64 of a small JSON payload
//! naming the boundary row and the direction to read in.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("Invalid cursor")]
    InvalidCursor,
    #[error("Invalid page size: {0}")]
    InvalidPageSize(String),
    #[error("Invalid ordering: {0}. Allowed: created, -created")]
    InvalidOrdering(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl std::str::FromStr for SortOrder {
    type Err = PaginationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-created" => Ok(SortOrder::NewestFirst),
            "created" => Ok(SortOrder::OldestFirst),
            _ => Err(PaginationError::InvalidOrdering(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "c")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "i")]
    pub id: Uuid,
    #[serde(rename = "r", default)]
    pub reverse: bool,
}

impl Cursor {
    pub fn encode(&self) -> String {
        // Serializing this struct can not fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| PaginationError::InvalidCursor)?;

        serde_json::from_slice(&bytes).map_err(|_| PaginationError::InvalidCursor)
    }
}

pub trait CursorKey {
    fn cursor_key(&self) -> (DateTime<Utc>, Uuid);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: i64,
    pub cursor: Option<Cursor>,
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
            order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
    pub previous: Option<Cursor>,
}

impl PageRequest {
    pub fn from_params(
        page_size: Option<&str>,
        cursor: Option<&str>,
        ordering: Option<&str>,
    ) -> Result<Self, PaginationError> {
        let page_size = match page_size {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| PaginationError::InvalidPageSize(raw.to_string()))?
                .min(MAX_PAGE_SIZE),
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            page_size,
            cursor: cursor.map(Cursor::decode).transpose()?,
            order: ordering.map(str::parse).transpose()?.unwrap_or_default(),
        })
    }

    fn reads_descending(&self) -> bool {
        let reverse = self.cursor.is_some_and(|c| c.reverse);
        matches!(self.order, SortOrder::NewestFirst) != reverse
    }

    /// Appends the keyset condition. The builder must already be inside a
    /// `WHERE` clause.
    pub fn push_keyset(&self, qb: &mut QueryBuilder<'_, Postgres>, created_col: &str, id_col: &str) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let op = if self.reads_descending() { "<" } else { ">" };

        qb.push(format!(" AND ({created_col}, {id_col}) {op} ("))
            .push_bind(cursor.created_at)
            .push(", ")
            .push_bind(cursor.id)
            .push(")");
    }

    /// Appends `ORDER BY ... LIMIT`, fetching one extra row to detect more pages.
    pub fn push_order_and_limit(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
        created_col: &str,
        id_col: &str,
    ) {
        let dir = if self.reads_descending() { "DESC" } else { "ASC" };

        qb.push(format!(" ORDER BY {created_col} {dir}, {id_col} {dir} LIMIT "))
            .push_bind(self.page_size + 1);
    }

    pub fn finish<T: CursorKey>(&self, mut rows: Vec<T>) -> Page<T> {
        let limit = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let reverse = self.cursor.is_some_and(|c| c.reverse);
        if reverse {
            rows.reverse();
        }

        let forward_from = |row: &T| {
            let (created_at, id) = row.cursor_key();
            Cursor {
                created_at,
                id,
                reverse: false,
            }
        };
        let backward_from = |row: &T| {
            let (created_at, id) = row.cursor_key();
            Cursor {
                created_at,
                id,
                reverse: true,
            }
        };

        let (next, previous) = match self.cursor {
            None => (rows.last().filter(|_| has_more).map(forward_from), None),
            Some(c) if !c.reverse => (
                rows.last().filter(|_| has_more).map(forward_from),
                rows.first().map(backward_from),
            ),
            Some(_) => (
                rows.last().map(forward_from),
                rows.first().filter(|_| has_more).map(backward_from),
            ),
        };

        Page {
            items: rows,
            next,
            previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(i64);

    impl CursorKey for Row {
        fn cursor_key(&self) -> (DateTime<Utc>, Uuid) {
            (
                Utc.timestamp_opt(self.0, 0).unwrap(),
                Uuid::from_u128(u128::try_from(self.0).unwrap()),
            )
        }
    }

    fn cursor_for(secs: i64, reverse: bool) -> Cursor {
        let (created_at, id) = Row(secs).cursor_key();
        Cursor {
            created_at,
            id,
            reverse,
        }
    }

    #[test]
    fn cursor_survives_encoding() {
        let cursor = cursor_for(1_700_000_000, true);
        let token = cursor.encode();

        assert!(!token.contains('='));
        assert_eq!(Cursor::decode(&token).unwrap(), cursor);
        assert_eq!(Cursor::decode("not a cursor"), Err(PaginationError::InvalidCursor));
    }

    #[test]
    fn page_size_is_capped_and_validated() {
        let req = PageRequest::from_params(Some("500"), None, None).unwrap();
        assert_eq!(req.page_size, MAX_PAGE_SIZE);

        assert!(PageRequest::from_params(Some("0"), None, None).is_err());
        assert!(PageRequest::from_params(Some("ten"), None, None).is_err());
        assert_eq!(PageRequest::from_params(None, None, None).unwrap(), PageRequest::default());
    }

    #[test]
    fn ordering_accepts_only_created() {
        let req = PageRequest::from_params(None, None, Some("created")).unwrap();
        assert_eq!(req.order, SortOrder::OldestFirst);
        assert_eq!(
            PageRequest::from_params(None, None, Some("title")),
            Err(PaginationError::InvalidOrdering("title".to_string()))
        );
    }

    #[test]
    fn first_page_links_only_forward() {
        let req = PageRequest {
            page_size: 2,
            ..PageRequest::default()
        };
        let page = req.finish(vec![Row(5), Row(4), Row(3)]);

        assert_eq!(page.items, vec![Row(5), Row(4)]);
        assert_eq!(page.next, Some(cursor_for(4, false)));
        assert_eq!(page.previous, None);
    }

    #[test]
    fn backward_page_is_returned_in_display_order() {
        let req = PageRequest {
            page_size: 2,
            cursor: Some(cursor_for(3, true)),
            order: SortOrder::NewestFirst,
        };
        // Read ascending from the cursor: 4, 5, 6
        let page = req.finish(vec![Row(4), Row(5), Row(6)]);

        assert_eq!(page.items, vec![Row(5), Row(4)]);
        assert_eq!(page.next, Some(cursor_for(4, false)));
        assert_eq!(page.previous, Some(cursor_for(5, true)));
    }

    #[test]
    fn keyset_sql_follows_direction() {
        let req = PageRequest {
            page_size: 10,
            cursor: Some(cursor_for(3, false)),
            order: SortOrder::NewestFirst,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM recipes r WHERE TRUE");
        req.push_keyset(&mut qb, "r.created_at", "r.recipe_id");
        req.push_order_and_limit(&mut qb, "r.created_at", "r.recipe_id");

        assert_eq!(
            qb.sql(),
            "SELECT * FROM recipes r WHERE TRUE AND (r.created_at, r.recipe_id) < ($1, $2) \
             ORDER BY r.created_at DESC, r.recipe_id DESC LIMIT $3"
        );
    }
}
