//! Query-string filters for the recipe list.
//!
//! Every `key=value` pair names a filter and, optionally, a lookup prefix on
//! the value: `cooking_time=gt=30`, `ingredients.id=out=(a,b)`,
//! `title=*soup*`. Search patterns treat `*` as a wildcard and compare
//! case-insensitively.
//!
//! `servings` does double duty: `servings=gt=2` filters on the recipe's
//! servings, while a bare `servings=4` only rescales ingredient amounts.

use std::fmt;

use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

/// Query parameters that belong to pagination or representation, not filtering.
pub const RESERVED_PARAMS: [&str; 5] = [
    "ordering",
    "cursor",
    "page_size",
    "reviews_limit",
    "recommended_by_limit",
];

/// Whether a `servings` value asks to rescale amounts rather than filter.
pub fn is_servings_scale(raw: &str) -> bool {
    split_lookup(raw).0.is_none()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),
    #[error("Lookup `{lookup}` is not supported by filter `{filter}`")]
    UnsupportedLookup { filter: String, lookup: Lookup },
    #[error("Invalid value `{value}` for filter `{filter}`")]
    InvalidValue { filter: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Eq,
    Gt,
    Lt,
    In,
    Out,
    Search,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lookup::Eq => "eq",
            Lookup::Gt => "gt",
            Lookup::Lt => "lt",
            Lookup::In => "in",
            Lookup::Out => "out",
            Lookup::Search => "search",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Text,
    Number,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Title,
    Description,
    Author,
    CookingTime,
    Servings,
    CuisineId,
    CuisineName,
    IngredientId,
    IngredientName,
    EquipmentId,
    EquipmentName,
    TagId,
    TagName,
    SelectionTitle,
    SelectionDescription,
    Search,
}

impl FilterField {
    fn from_key(key: &str) -> Option<Self> {
        let field = match key {
            "title" => FilterField::Title,
            "description" => FilterField::Description,
            "author" => FilterField::Author,
            "cooking_time" => FilterField::CookingTime,
            "servings" => FilterField::Servings,
            "cuisine" | "cuisine.id" => FilterField::CuisineId,
            "cuisine.name" => FilterField::CuisineName,
            "ingredients.id" => FilterField::IngredientId,
            "ingredients.name" => FilterField::IngredientName,
            "equipment.id" => FilterField::EquipmentId,
            "equipment.name" => FilterField::EquipmentName,
            "tags.id" => FilterField::TagId,
            "tags.name" => FilterField::TagName,
            "selections.title" => FilterField::SelectionTitle,
            "selections.description" => FilterField::SelectionDescription,
            "search" => FilterField::Search,
            _ => return None,
        };
        Some(field)
    }

    fn kind(self) -> FilterKind {
        match self {
            FilterField::CookingTime | FilterField::Servings => FilterKind::Number,
            FilterField::CuisineId
            | FilterField::IngredientId
            | FilterField::EquipmentId
            | FilterField::TagId => FilterKind::Id,
            _ => FilterKind::Text,
        }
    }

    fn lookups(self) -> &'static [Lookup] {
        match self {
            FilterField::CookingTime | FilterField::Servings => &[Lookup::Eq, Lookup::Gt, Lookup::Lt],
            FilterField::CuisineId | FilterField::TagId => &[Lookup::In],
            FilterField::IngredientId | FilterField::EquipmentId => &[Lookup::In, Lookup::Out],
            _ => &[Lookup::Search],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Text(String),
    Number(i64),
    Ids(Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    field: FilterField,
    lookup: Lookup,
    value: FilterValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    conditions: Vec<Condition>,
}

fn split_lookup(raw: &str) -> (Option<Lookup>, &str) {
    let prefixes = [
        ("eq=", Lookup::Eq),
        ("gt=", Lookup::Gt),
        ("lt=", Lookup::Lt),
        ("in=", Lookup::In),
        ("out=", Lookup::Out),
    ];

    for (prefix, lookup) in prefixes {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return (Some(lookup), rest);
        }
    }

    (None, raw)
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    let inner = raw
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .unwrap_or(raw);

    inner.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Turns a `*`-wildcard pattern into an `ILIKE` pattern, escaping the
/// characters `ILIKE` treats specially.
fn like_pattern(raw: &str) -> String {
    let mut pattern = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '*' => pattern.push('%'),
            '%' | '_' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            _ => pattern.push(c),
        }
    }
    pattern
}

impl RecipeFilter {
    pub fn parse<'a>(
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, FilterError> {
        let mut conditions = Vec::new();

        for (key, raw) in params {
            if RESERVED_PARAMS.contains(&key) || (key == "servings" && is_servings_scale(raw)) {
                continue;
            }

            let field =
                FilterField::from_key(key).ok_or_else(|| FilterError::UnknownFilter(key.to_string()))?;
            let (explicit, raw_value) = split_lookup(raw);
            let lookup = explicit.unwrap_or(field.lookups()[0]);

            if !field.lookups().contains(&lookup) {
                return Err(FilterError::UnsupportedLookup {
                    filter: key.to_string(),
                    lookup,
                });
            }

            let invalid = || FilterError::InvalidValue {
                filter: key.to_string(),
                value: raw_value.to_string(),
            };

            let value = match field.kind() {
                FilterKind::Text => {
                    if field == FilterField::Search {
                        FilterValue::Text(format!("%{}%", like_pattern(raw_value)))
                    } else {
                        FilterValue::Text(like_pattern(raw_value))
                    }
                }
                FilterKind::Number => {
                    FilterValue::Number(raw_value.trim().parse().map_err(|_| invalid())?)
                }
                FilterKind::Id => {
                    let ids = split_list(raw_value)
                        .map(Uuid::parse_str)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| invalid())?;
                    if ids.is_empty() {
                        return Err(invalid());
                    }
                    FilterValue::Ids(ids)
                }
            };

            conditions.push(Condition {
                field,
                lookup,
                value,
            });
        }

        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Appends one `AND ...` clause per condition. Recipes must be aliased `r`.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for condition in &self.conditions {
            condition.push(qb);
        }
    }
}

impl Condition {
    fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match (&self.value, self.field) {
            (FilterValue::Text(pattern), field) => push_text(qb, field, pattern),
            (FilterValue::Number(n), FilterField::CookingTime) => {
                push_number(qb, "r.cooking_time", self.lookup, *n);
            }
            (FilterValue::Number(n), _) => push_number(qb, "r.servings", self.lookup, *n),
            (FilterValue::Ids(ids), FilterField::CuisineId) => {
                qb.push(" AND r.cuisine_id = ANY(").push_bind(ids.clone()).push(")");
            }
            (FilterValue::Ids(ids), field) => {
                let (table, column) = match field {
                    FilterField::IngredientId => ("recipe_ingredients", "ingredient_id"),
                    FilterField::EquipmentId => ("recipe_equipment", "equipment_id"),
                    _ => ("recipe_tags", "tag_id"),
                };
                let negate = if self.lookup == Lookup::Out { "NOT " } else { "" };

                qb.push(format!(
                    " AND {negate}EXISTS (SELECT 1 FROM {table} j WHERE j.recipe_id = r.recipe_id AND j.{column} = ANY("
                ))
                .push_bind(ids.clone())
                .push("))");
            }
        }
    }
}

fn push_number(qb: &mut QueryBuilder<'_, Postgres>, column: &str, lookup: Lookup, value: i64) {
    let op = match lookup {
        Lookup::Gt => ">",
        Lookup::Lt => "<",
        _ => "=",
    };
    qb.push(format!(" AND {column} {op} ")).push_bind(value);
}

/// Fields the `search` filter matches against, any of them.
const SEARCH_FIELDS: [FilterField; 9] = [
    FilterField::Title,
    FilterField::Description,
    FilterField::Author,
    FilterField::CuisineName,
    FilterField::IngredientName,
    FilterField::EquipmentName,
    FilterField::TagName,
    FilterField::SelectionTitle,
    FilterField::SelectionDescription,
];

fn push_text(qb: &mut QueryBuilder<'_, Postgres>, field: FilterField, pattern: &str) {
    if field == FilterField::Search {
        qb.push(" AND (");
        for (i, field) in SEARCH_FIELDS.into_iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            push_text_match(qb, field, pattern);
        }
        qb.push(")");
    } else {
        qb.push(" AND ");
        push_text_match(qb, field, pattern);
    }
}

/// Pushes a single `ILIKE` predicate for a text field.
fn push_text_match(qb: &mut QueryBuilder<'_, Postgres>, field: FilterField, pattern: &str) {
    let related = |table: &str, join: &str, column: &str| {
        format!("EXISTS (SELECT 1 FROM {table} JOIN {join} WHERE {column} ILIKE ")
    };

    match field {
        FilterField::Title => {
            qb.push("r.title ILIKE ").push_bind(pattern.to_string());
        }
        FilterField::Description => {
            qb.push("r.description ILIKE ").push_bind(pattern.to_string());
        }
        FilterField::Author => {
            qb.push("EXISTS (SELECT 1 FROM users u WHERE u.user_id = r.author_user_id AND (u.username ILIKE ")
                .push_bind(pattern.to_string())
                .push(" OR u.name ILIKE ")
                .push_bind(pattern.to_string())
                .push(" OR u.surname ILIKE ")
                .push_bind(pattern.to_string())
                .push("))");
        }
        FilterField::CuisineName => {
            qb.push("EXISTS (SELECT 1 FROM cuisines c WHERE c.cuisine_id = r.cuisine_id AND c.name ILIKE ")
                .push_bind(pattern.to_string())
                .push(")");
        }
        FilterField::IngredientName => {
            qb.push(related(
                "recipe_ingredients j",
                "ingredients i ON i.ingredient_id = j.ingredient_id AND j.recipe_id = r.recipe_id",
                "i.name",
            ))
            .push_bind(pattern.to_string())
            .push(")");
        }
        FilterField::EquipmentName => {
            qb.push(related(
                "recipe_equipment j",
                "equipment e ON e.equipment_id = j.equipment_id AND j.recipe_id = r.recipe_id",
                "e.name",
            ))
            .push_bind(pattern.to_string())
            .push(")");
        }
        FilterField::TagName => {
            qb.push(related(
                "recipe_tags j",
                "tags t ON t.tag_id = j.tag_id AND j.recipe_id = r.recipe_id",
                "t.name",
            ))
            .push_bind(pattern.to_string())
            .push(")");
        }
        FilterField::SelectionTitle | FilterField::SelectionDescription => {
            let column = if field == FilterField::SelectionTitle {
                "s.title"
            } else {
                "s.description"
            };
            qb.push(related(
                "selection_recipes j",
                "selections s ON s.selection_id = j.selection_id AND j.recipe_id = r.recipe_id",
                column,
            ))
            .push_bind(pattern.to_string())
            .push(")");
        }
        _ => {
            qb.push("TRUE");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(params: &[(&str, &str)]) -> String {
        let filter = RecipeFilter::parse(params.iter().copied()).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("WHERE TRUE");
        filter.push_conditions(&mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn reserved_params_are_skipped() {
        let filter =
            RecipeFilter::parse([("ordering", "-created"), ("servings", "4"), ("cursor", "abc")])
                .unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn numeric_lookups_render_comparisons() {
        assert_eq!(
            sql_for(&[("cooking_time", "gt=30"), ("servings", "eq=4")]),
            "WHERE TRUE AND r.cooking_time > $1 AND r.servings = $2"
        );
        assert_eq!(
            sql_for(&[("servings", "lt=3"), ("servings", "6")]),
            "WHERE TRUE AND r.servings < $1"
        );
    }

    #[test]
    fn bare_servings_only_rescale() {
        assert!(is_servings_scale("4"));
        assert!(is_servings_scale("many"));
        assert!(!is_servings_scale("gt=2"));
        assert!(!is_servings_scale("eq=4"));
    }

    #[test]
    fn wildcards_become_ilike_patterns() {
        let filter = RecipeFilter::parse([("title", "*so_up*")]).unwrap();
        assert_eq!(
            filter.conditions[0].value,
            FilterValue::Text("%so\\_up%".to_string())
        );
        assert_eq!(sql_for(&[("title", "*soup*")]), "WHERE TRUE AND r.title ILIKE $1");
    }

    #[test]
    fn id_lists_accept_parenthesised_values() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let raw = format!("out=({a},{b})");
        let filter = RecipeFilter::parse([("ingredients.id", raw.as_str())]).unwrap();

        assert_eq!(filter.conditions[0].lookup, Lookup::Out);
        assert_eq!(filter.conditions[0].value, FilterValue::Ids(vec![a, b]));
        assert_eq!(
            sql_for(&[("ingredients.id", raw.as_str())]),
            "WHERE TRUE AND NOT EXISTS (SELECT 1 FROM recipe_ingredients j \
             WHERE j.recipe_id = r.recipe_id AND j.ingredient_id = ANY($1))"
        );
    }

    #[test]
    fn search_spans_every_text_field() {
        let filter = RecipeFilter::parse([("search", "pie")]).unwrap();
        assert_eq!(filter.conditions[0].value, FilterValue::Text("%pie%".to_string()));

        let sql = sql_for(&[("search", "pie")]);
        assert!(sql.starts_with("WHERE TRUE AND (r.title ILIKE $1 OR r.description ILIKE $2 OR EXISTS"));
        assert!(sql.contains("u.surname ILIKE $5)) OR EXISTS (SELECT 1 FROM cuisines c"));
        assert!(sql.contains("c.name ILIKE $6)"));
        assert!(sql.contains("i.name ILIKE $7)"));
        assert!(sql.contains("e.name ILIKE $8)"));
        assert!(sql.contains("t.name ILIKE $9)"));
        assert!(sql.contains("s.title ILIKE $10)"));
        assert!(sql.ends_with("s.description ILIKE $11))"));
    }

    #[test]
    fn related_names_use_exists_subqueries() {
        assert_eq!(
            sql_for(&[("tags.name", "*vegan*")]),
            "WHERE TRUE AND EXISTS (SELECT 1 FROM recipe_tags j JOIN tags t \
             ON t.tag_id = j.tag_id AND j.recipe_id = r.recipe_id WHERE t.name ILIKE $1)"
        );
    }

    #[test]
    fn rejects_unknown_filters_and_lookups() {
        assert_eq!(
            RecipeFilter::parse([("calories", "100")]),
            Err(FilterError::UnknownFilter("calories".to_string()))
        );
        assert_eq!(
            RecipeFilter::parse([("tags.id", "out=(x)")]),
            Err(FilterError::UnsupportedLookup {
                filter: "tags.id".to_string(),
                lookup: Lookup::Out,
            })
        );
        assert!(matches!(
            RecipeFilter::parse([("servings", "gt=many")]),
            Err(FilterError::InvalidValue { .. })
        ));
        assert!(matches!(
            RecipeFilter::parse([("cuisine", "not-a-uuid")]),
            Err(FilterError::InvalidValue { .. })
        ));
    }
}
