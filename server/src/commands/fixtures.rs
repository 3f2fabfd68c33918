//! Seeds an empty database from JSON fixture files.
//!
//! Records refer to each other by the `id` they carry in the files. Every
//! record gets a fresh UUID and references are translated as files load, so
//! files load in dependency order.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use bigdecimal::BigDecimal;
use color_eyre::eyre::{eyre, WrapErr};
use db::{
    cooking::{
        selections::FALLBACK_CATEGORY, Category, Cuisine, Equipment, Ingredient, MeasurementUnit,
        NewEquipment, NewIngredient, NewRecipe, NewRecipeImage, NewRecipeIngredient, NewSelection,
        Recipe, RecipeImage, RecipeIngredient, RecipeReaction, RecipeTag, Selection, Tag,
    },
    users::{AuthToken, NewUser, User},
    PgPool,
};
use serde::{de::DeserializeOwned, Deserialize};
use uuid::Uuid;

use crate::{
    http_server::media::{DataUri, MediaStore},
    AppConfig, Result,
};

pub(crate) async fn load_fixtures(dir: &Path) -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = db::setup_db_pool().await?;

    let mut loader = Loader::new(&pool, config.media(), dir);
    loader.load_all().await?;

    println!("Fixtures loaded from {}", dir.display());

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum FixtureId {
    Number(i64),
    Text(String),
}

impl fmt::Display for FixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureId::Number(n) => write!(f, "{n}"),
            FixtureId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserFixture {
    id: FixtureId,
    username: String,
    email: String,
    #[serde(default, alias = "first_name")]
    name: String,
    #[serde(default, alias = "last_name")]
    surname: String,
    image: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IngredientFixture {
    id: FixtureId,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    species: String,
    image: Option<String>,
    #[serde(default)]
    is_flavoring: bool,
    one_piece_weight: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
struct NamedFixture {
    id: FixtureId,
    name: String,
    #[serde(default)]
    description: String,
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectionFixture {
    id: FixtureId,
    title: String,
    #[serde(default)]
    description: String,
    cover: Option<String>,
    author: FixtureId,
    category: Option<FixtureId>,
}

fn default_servings() -> i16 {
    1
}

#[derive(Debug, Deserialize)]
struct RecipeFixture {
    id: FixtureId,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_servings")]
    servings: i16,
    cooking_time: i16,
    ending_phrase: Option<String>,
    author: FixtureId,
    cuisine: Option<FixtureId>,
    #[serde(default)]
    tags: Vec<FixtureId>,
}

#[derive(Debug, Deserialize)]
struct SelectionRecipeFixture {
    selection: FixtureId,
    recipe: FixtureId,
}

#[derive(Debug, Deserialize)]
struct RecipeImageFixture {
    recipe: FixtureId,
    image: String,
    #[serde(default)]
    is_cover: bool,
}

#[derive(Debug, Deserialize)]
struct RecipeIngredientFixture {
    recipe: FixtureId,
    ingredient: FixtureId,
    amount: BigDecimal,
    measurement_unit: String,
    cup_grams: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
struct FavoriteFixture {
    user: FixtureId,
    recipe: FixtureId,
}

/// Fixture ids of one kind, mapped to the UUIDs they were stored under.
#[derive(Debug)]
struct IdMap {
    kind: &'static str,
    ids: HashMap<FixtureId, Uuid>,
}

impl IdMap {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            ids: HashMap::new(),
        }
    }

    fn insert(&mut self, id: FixtureId, uuid: Uuid) {
        self.ids.insert(id, uuid);
    }

    fn get(&self, id: &FixtureId) -> Result<Uuid> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| eyre!("Unknown {} id {id} in fixtures", self.kind))
    }
}

struct Loader<'a> {
    pool: &'a PgPool,
    media: MediaStore,
    dir: PathBuf,
    users: IdMap,
    ingredients: IdMap,
    tags: IdMap,
    categories: IdMap,
    cuisines: IdMap,
    equipment: IdMap,
    selections: IdMap,
    recipes: IdMap,
}

impl<'a> Loader<'a> {
    fn new(pool: &'a PgPool, media: MediaStore, dir: &Path) -> Self {
        Self {
            pool,
            media,
            dir: dir.to_path_buf(),
            users: IdMap::new("user"),
            ingredients: IdMap::new("ingredient"),
            tags: IdMap::new("tag"),
            categories: IdMap::new("category"),
            cuisines: IdMap::new("cuisine"),
            equipment: IdMap::new("equipment"),
            selections: IdMap::new("selection"),
            recipes: IdMap::new("recipe"),
        }
    }

    async fn load_all(&mut self) -> Result<()> {
        self.load_users().await?;
        self.load_ingredients().await?;
        self.load_tags().await?;
        self.load_categories().await?;
        self.load_cuisines().await?;
        self.load_equipment().await?;
        self.load_selections().await?;
        self.load_recipes().await?;
        self.load_selection_recipes().await?;
        self.load_recipe_images().await?;
        self.load_recipe_ingredients().await?;
        self.load_favorites().await?;

        Ok(())
    }

    /// Reads `file` unless `table` already has rows or the file is missing.
    async fn records<T: DeserializeOwned>(&self, table: &str, file: &str) -> Result<Option<Vec<T>>> {
        let has_rows: bool = sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {table})"))
            .fetch_one(self.pool)
            .await?;
        if has_rows {
            tracing::warn!(table, "Table already has rows, skipping fixtures");
            return Ok(None);
        }

        read_fixture(&self.dir.join(file)).await
    }

    async fn save_image(&self, dir: &str, raw: Option<&str>) -> Result<Option<String>> {
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };

        let upload = DataUri::parse(raw).wrap_err_with(|| format!("Bad image in {dir} fixtures"))?;

        Ok(Some(self.media.save(dir, &upload).await?))
    }

    async fn load_users(&mut self) -> Result<()> {
        let Some(records) = self.records::<UserFixture>("users", "users.json").await? else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let image = self.save_image("users/images", record.image.as_deref()).await?;
            let user = User::create(
                &mut *tx,
                NewUser {
                    username: record.username.clone(),
                    email: record.email.clone(),
                    name: record.name.clone(),
                    surname: record.surname.clone(),
                    image,
                    background_image: None,
                },
            )
            .await
            .wrap_err_with(|| format!("Failed to create user {}", record.username))?;

            if let Some(token) = &record.token {
                AuthToken::create(&mut *tx, user.user_id, token).await?;
            }
            self.users.insert(record.id.clone(), user.user_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded users");

        Ok(())
    }

    async fn load_ingredients(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<IngredientFixture>("ingredients", "ingredients.json")
            .await?
        else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let image = self
                .save_image("ingredients/images", record.image.as_deref())
                .await?;
            let ingredient = Ingredient::create(
                &mut *tx,
                NewIngredient {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    species: record.species.clone(),
                    image,
                    is_flavoring: record.is_flavoring,
                    one_piece_weight: record.one_piece_weight.clone(),
                },
            )
            .await?;

            self.ingredients
                .insert(record.id.clone(), ingredient.ingredient_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded ingredients");

        Ok(())
    }

    async fn load_tags(&mut self) -> Result<()> {
        let Some(records) = self.records::<NamedFixture>("tags", "tags.json").await? else {
            return Ok(());
        };

        let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
        let mut conn = self.pool.acquire().await?;
        let tags = Tag::get_or_create_by_names(&mut conn, &names).await?;

        for (record, tag) in records.iter().zip(&tags) {
            self.tags.insert(record.id.clone(), tag.tag_id);
        }

        tracing::info!(count = tags.len(), "Loaded tags");

        Ok(())
    }

    /// The fallback category always exists, so categories are upserted by
    /// name instead of being skipped.
    async fn load_categories(&mut self) -> Result<()> {
        let Some(records) = read_fixture::<NamedFixture>(&self.dir.join("categories.json")).await?
        else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let category = Category::upsert(&mut *tx, &record.name, &record.description).await?;
            self.categories.insert(record.id.clone(), category.category_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded categories");

        Ok(())
    }

    async fn load_cuisines(&mut self) -> Result<()> {
        let Some(records) = self.records::<NamedFixture>("cuisines", "cuisines.json").await? else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let cuisine = Cuisine::create(&mut *tx, &record.name, &record.description).await?;
            self.cuisines.insert(record.id.clone(), cuisine.cuisine_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded cuisines");

        Ok(())
    }

    async fn load_equipment(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<NamedFixture>("equipment", "equipment.json")
            .await?
        else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let image = self
                .save_image("equipment/images", record.image.as_deref())
                .await?;
            let equipment = Equipment::create(
                &mut *tx,
                NewEquipment {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    image,
                },
            )
            .await?;

            self.equipment.insert(record.id.clone(), equipment.equipment_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded equipment");

        Ok(())
    }

    async fn load_selections(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<SelectionFixture>("selections", "selections.json")
            .await?
        else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let category_id = match &record.category {
                Some(id) => self.categories.get(id)?,
                None => Category::get_or_create(&mut *tx, FALLBACK_CATEGORY).await?.category_id,
            };
            let cover = self
                .save_image("selections/covers", record.cover.as_deref())
                .await?;

            let selection = Selection::create(
                &mut *tx,
                NewSelection {
                    title: record.title.clone(),
                    description: record.description.clone(),
                    cover,
                    author_user_id: self.users.get(&record.author)?,
                    category_id,
                },
            )
            .await?;

            self.selections
                .insert(record.id.clone(), selection.selection_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded selections");

        Ok(())
    }

    async fn load_recipes(&mut self) -> Result<()> {
        let Some(records) = self.records::<RecipeFixture>("recipes", "recipes.json").await? else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let cuisine_id = record
                .cuisine
                .as_ref()
                .map(|id| self.cuisines.get(id))
                .transpose()?;
            let tag_ids = record
                .tags
                .iter()
                .map(|id| self.tags.get(id))
                .collect::<Result<Vec<_>>>()?;

            let recipe = Recipe::create(
                &mut *tx,
                NewRecipe {
                    title: record.title.clone(),
                    description: record.description.clone(),
                    servings: record.servings,
                    cooking_time: record.cooking_time,
                    ending_phrase: record
                        .ending_phrase
                        .clone()
                        .unwrap_or_else(|| db::cooking::recipe::DEFAULT_ENDING_PHRASE.to_string()),
                    video: None,
                    cuisine_id,
                    author_user_id: self.users.get(&record.author)?,
                },
            )
            .await
            .wrap_err_with(|| format!("Failed to create recipe {}", record.title))?;

            RecipeTag::set_for_recipe(&mut *tx, recipe.recipe_id, &tag_ids).await?;
            self.recipes.insert(record.id.clone(), recipe.recipe_id);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded recipes");

        Ok(())
    }

    async fn load_selection_recipes(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<SelectionRecipeFixture>("selection_recipes", "selectionsrecipes.json")
            .await?
        else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let selection_id = self.selections.get(&record.selection)?;
            let recipe_id = self.recipes.get(&record.recipe)?;

            Selection::add_recipes(&mut *tx, selection_id, &[recipe_id]).await?;
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded selection recipes");

        Ok(())
    }

    async fn load_recipe_images(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<RecipeImageFixture>("recipe_images", "recipesimages.json")
            .await?
        else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for record in &records {
            let recipe_id = self.recipes.get(&record.recipe)?;
            let Some(image) = self
                .save_image("recipes/images", Some(record.image.as_str()))
                .await?
            else {
                tracing::warn!(recipe = %record.recipe, "Skipping recipe image without data");
                continue;
            };

            RecipeImage::insert(
                &mut *tx,
                recipe_id,
                &NewRecipeImage {
                    image,
                    is_cover: record.is_cover,
                },
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded recipe images");

        Ok(())
    }

    async fn load_recipe_ingredients(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<RecipeIngredientFixture>("recipe_ingredients", "recipesingreds.json")
            .await?
        else {
            return Ok(());
        };

        // Lines are grouped per recipe so each keeps its file order
        let mut lines: Vec<(Uuid, Vec<NewRecipeIngredient>)> = Vec::new();
        for record in &records {
            let recipe_id = self.recipes.get(&record.recipe)?;
            let measurement_unit = record
                .measurement_unit
                .parse::<MeasurementUnit>()
                .map_err(|e| eyre!("Bad measurement unit in fixtures: {e}"))?;
            let line = NewRecipeIngredient {
                ingredient_id: self.ingredients.get(&record.ingredient)?,
                amount: record.amount.clone(),
                measurement_unit,
                cup_grams: record.cup_grams.clone(),
            };

            match lines.iter_mut().find(|(id, _)| *id == recipe_id) {
                Some((_, recipe_lines)) => recipe_lines.push(line),
                None => lines.push((recipe_id, vec![line])),
            }
        }

        let mut tx = self.pool.begin().await?;
        for (recipe_id, recipe_lines) in lines {
            RecipeIngredient::replace_for_recipe(&mut *tx, recipe_id, recipe_lines).await?;
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Loaded recipe ingredients");

        Ok(())
    }

    async fn load_favorites(&mut self) -> Result<()> {
        let Some(records) = self
            .records::<FavoriteFixture>("favorite_recipes", "favorites.json")
            .await?
        else {
            return Ok(());
        };

        for record in &records {
            let user_id = self.users.get(&record.user)?;
            let recipe_id = self.recipes.get(&record.recipe)?;

            RecipeReaction::Favorite
                .add(self.pool, user_id, recipe_id)
                .await?;
        }

        tracing::info!(count = records.len(), "Loaded favorites");

        Ok(())
    }
}

async fn read_fixture<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Fixture file not found, skipping");
            return Ok(None);
        }
        Err(e) => {
            return Err(e).wrap_err_with(|| format!("Couldn't read {}", path.display()));
        }
    };

    let records = serde_json::from_str(&contents)
        .wrap_err_with(|| format!("Couldn't parse {}", path.display()))?;

    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fixture_ids_accept_numbers_and_strings() {
        let ids: Vec<FixtureId> = serde_json::from_value(json!([1, "chef"])).unwrap();

        assert_eq!(ids, [FixtureId::Number(1), FixtureId::Text("chef".to_string())]);
        assert_eq!(ids[0].to_string(), "1");
    }

    #[test]
    fn test_unknown_reference_names_the_kind() {
        let map = IdMap::new("recipe");

        let err = map.get(&FixtureId::Number(7)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown recipe id 7 in fixtures");
    }

    #[tokio::test]
    async fn test_missing_fixture_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();

        let records = read_fixture::<NamedFixture>(&dir.path().join("tags.json"))
            .await
            .unwrap();
        assert!(records.is_none());
    }

    fn write(dir: &Path, file: &str, value: &serde_json::Value) {
        std::fs::write(dir.join(file), value.to_string()).unwrap();
    }

    #[sqlx::test(migrations = "../db/migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_loads_related_fixtures(pool: PgPool) {
        let fixtures = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let dir = fixtures.path();

        write(dir, "users.json", &json!([
            {"id": 1, "username": "chef", "email": "chef@example.com", "first_name": "Ann", "token": "secret"}
        ]));
        write(dir, "ingredients.json", &json!([
            {"id": 1, "name": "Flour"},
            {"id": 2, "name": "Salt", "is_flavoring": true}
        ]));
        write(dir, "tags.json", &json!([{"id": 1, "name": "bread"}]));
        write(dir, "recipes.json", &json!([
            {"id": 10, "title": "Loaf", "cooking_time": 90, "author": 1, "tags": [1]}
        ]));
        write(dir, "recipesingreds.json", &json!([
            {"recipe": 10, "ingredient": 1, "amount": "500", "measurement_unit": "g"},
            {"recipe": 10, "ingredient": 2, "amount": 1, "measurement_unit": "pinch"}
        ]));
        write(dir, "recipesimages.json", &json!([
            {"recipe": 10, "image": "data:image/png;base64,aGVsbG8=", "is_cover": true}
        ]));
        write(dir, "favorites.json", &json!([{"user": 1, "recipe": 10}]));

        let mut loader = Loader::new(&pool, MediaStore::new(media.path().to_path_buf()), dir);
        loader.load_all().await.unwrap();

        let chef = User::get_by_token(&pool, "secret").await.unwrap().unwrap();
        assert_eq!(chef.username, "chef");

        let recipe_id = loader.recipes.get(&FixtureId::Number(10)).unwrap();
        let lines = RecipeIngredient::get_by_recipe(&pool, recipe_id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].measurement_unit, "pinch");

        let images = RecipeImage::get_by_recipe(&pool, recipe_id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert!(media.path().join(&images[0].image).exists());

        // A second run leaves the now populated tables alone
        let mut again = Loader::new(&pool, MediaStore::new(media.path().to_path_buf()), dir);
        again.load_all().await.unwrap();
        assert_eq!(User::count(&pool).await.unwrap(), 1);
    }
}
