use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::measurement::{Fraction, MeasurementUnit};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ingredient {
    pub ingredient_id: Uuid,
    pub name: String,
    pub description: String,
    pub species: String,
    pub image: Option<String>,
    pub is_flavoring: bool,
    pub one_piece_weight: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub species: String,
    pub image: Option<String>,
    #[serde(default)]
    pub is_flavoring: bool,
    pub one_piece_weight: Option<BigDecimal>,
}

const INGREDIENT_COLUMNS: &str = "
    ingredient_id,
    name,
    description,
    species,
    image,
    is_flavoring,
    one_piece_weight,
    created_at
";

pub(crate) fn decimal_to_fraction(value: &BigDecimal) -> Option<Fraction> {
    Fraction::from_decimal_str(&value.to_string()).ok()
}

impl Ingredient {
    /// `name (species)`, or just the name when no species is recorded.
    pub fn display_name(&self) -> String {
        if self.species.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.species)
        }
    }

    pub fn one_piece_weight_fraction(&self) -> Option<Fraction> {
        self.one_piece_weight.as_ref().and_then(decimal_to_fraction)
    }

    pub async fn create(conn: &mut PgConnection, new: NewIngredient) -> Result<Self> {
        let ingredient = sqlx::query_as::<_, Ingredient>(&format!(
            "
            INSERT INTO ingredients (name, description, species, image, is_flavoring, one_piece_weight)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {INGREDIENT_COLUMNS}
            "
        ))
        .bind(new.name)
        .bind(new.description)
        .bind(new.species)
        .bind(new.image)
        .bind(new.is_flavoring)
        .bind(new.one_piece_weight)
        .fetch_one(conn)
        .await?;

        Ok(ingredient)
    }

    pub async fn get_by_id(pool: &PgPool, ingredient_id: Uuid) -> Result<Option<Self>> {
        let ingredient = sqlx::query_as::<_, Ingredient>(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE ingredient_id = $1"
        ))
        .bind(ingredient_id)
        .fetch_optional(pool)
        .await?;

        Ok(ingredient)
    }

    pub async fn get_by_ids(pool: &PgPool, ingredient_ids: &[Uuid]) -> Result<Vec<Self>> {
        let ingredients = sqlx::query_as::<_, Ingredient>(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE ingredient_id = ANY($1)"
        ))
        .bind(ingredient_ids)
        .fetch_all(pool)
        .await?;

        Ok(ingredients)
    }

    /// Lists ingredients alphabetically, optionally only those whose name
    /// starts with `name_prefix` (case-insensitive).
    pub async fn list(pool: &PgPool, name_prefix: Option<&str>) -> Result<Vec<Self>> {
        let pattern = name_prefix.map(|prefix| {
            let escaped = prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("{escaped}%")
        });

        let ingredients = sqlx::query_as::<_, Ingredient>(&format!(
            "
            SELECT {INGREDIENT_COLUMNS}
            FROM ingredients
            WHERE $1::TEXT IS NULL OR name ILIKE $1
            ORDER BY name, species
            "
        ))
        .bind(pattern)
        .fetch_all(pool)
        .await?;

        Ok(ingredients)
    }

    pub async fn recipes_amount(pool: &PgPool, ingredient_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT recipe_id) FROM recipe_ingredients WHERE ingredient_id = $1",
        )
        .bind(ingredient_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn count(pool: &PgPool) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM ingredients")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipeIngredient {
    pub recipe_ingredient_id: Uuid,
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    pub amount: BigDecimal,
    pub measurement_unit: String,
    pub cup_grams: Option<BigDecimal>,
    pub display_order: i32,
}

#[derive(Debug, Clone)]
pub struct NewRecipeIngredient {
    pub ingredient_id: Uuid,
    pub amount: BigDecimal,
    pub measurement_unit: MeasurementUnit,
    pub cup_grams: Option<BigDecimal>,
}

const RECIPE_INGREDIENT_COLUMNS: &str = "
    recipe_ingredient_id,
    recipe_id,
    ingredient_id,
    amount,
    measurement_unit,
    cup_grams,
    display_order
";

impl RecipeIngredient {
    pub fn unit(&self) -> Result<MeasurementUnit> {
        self.measurement_unit
            .parse()
            .map_err(|e: String| eyre!("Stored measurement unit is invalid: {e}"))
    }

    pub fn amount_fraction(&self) -> Result<Fraction> {
        decimal_to_fraction(&self.amount)
            .ok_or_else(|| eyre!("Stored amount is not a decimal: {}", self.amount))
    }

    pub fn cup_grams_fraction(&self) -> Option<Fraction> {
        self.cup_grams.as_ref().and_then(decimal_to_fraction)
    }

    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Self>> {
        let ingredients = sqlx::query_as::<_, RecipeIngredient>(&format!(
            "
            SELECT {RECIPE_INGREDIENT_COLUMNS}
            FROM recipe_ingredients
            WHERE recipe_id = $1
            ORDER BY display_order
            "
        ))
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(ingredients)
    }

    pub async fn ingredient_ids_for_recipe(
        conn: &mut PgConnection,
        recipe_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT ingredient_id FROM recipe_ingredients WHERE recipe_id = $1",
        )
        .bind(recipe_id)
        .fetch_all(conn)
        .await?;

        Ok(ids)
    }

    /// Replaces every ingredient line of a recipe, keeping the given order.
    pub async fn replace_for_recipe(
        conn: &mut PgConnection,
        recipe_id: Uuid,
        lines: Vec<NewRecipeIngredient>,
    ) -> Result<()> {
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *conn)
            .await?;

        for (display_order, line) in (0_i32..).zip(lines) {
            // Cup weights only mean something for cup measures
            let cup_grams = if line.measurement_unit == MeasurementUnit::Cup {
                line.cup_grams
            } else {
                None
            };

            sqlx::query(
                "
                INSERT INTO recipe_ingredients (
                    recipe_id, ingredient_id, amount, measurement_unit, cup_grams, display_order
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(recipe_id)
            .bind(line.ingredient_id)
            .bind(line.amount)
            .bind(line.measurement_unit.code())
            .bind(cup_grams)
            .bind(display_order)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn ingredient(name: &str, species: &str) -> Ingredient {
        Ingredient {
            ingredient_id: Uuid::nil(),
            name: name.to_string(),
            description: String::new(),
            species: species.to_string(),
            image: None,
            is_flavoring: false,
            one_piece_weight: Some(BigDecimal::from_str("55.50").unwrap()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_includes_species_when_present() {
        assert_eq!(ingredient("Apple", "Gala").display_name(), "Apple (Gala)");
        assert_eq!(ingredient("Salt", "").display_name(), "Salt");
    }

    #[test]
    fn decimals_convert_to_exact_fractions() {
        assert_eq!(
            ingredient("Egg", "").one_piece_weight_fraction(),
            Fraction::new(111, 2)
        );
    }

    #[test]
    fn stored_lines_expose_typed_values() {
        let line = RecipeIngredient {
            recipe_ingredient_id: Uuid::nil(),
            recipe_id: Uuid::nil(),
            ingredient_id: Uuid::nil(),
            amount: BigDecimal::from_str("1.5").unwrap(),
            measurement_unit: "cup".to_string(),
            cup_grams: Some(BigDecimal::from_str("240").unwrap()),
            display_order: 0,
        };

        assert_eq!(line.unit().unwrap(), MeasurementUnit::Cup);
        assert_eq!(line.amount_fraction().unwrap(), Fraction::new(3, 2).unwrap());
        assert_eq!(line.cup_grams_fraction(), Some(Fraction::from_integer(240)));

        let broken = RecipeIngredient {
            measurement_unit: "bucket".to_string(),
            ..line
        };
        assert!(broken.unit().is_err());
    }
}
