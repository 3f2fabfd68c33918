//! Payload validation for recipes, selections and reviews.
//!
//! Errors collect into a [`ValidationErrors`] map of field path to messages
//! so a client sees every problem with a payload at once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use db::cooking::{
    measurement::{check_amount, parse_amount},
    Ingredient, MeasurementUnit, NewStep,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::http_server::media::DataUri;

pub const MIN_COOKING_TIME: i64 = 5;
pub const MAX_COOKING_TIME: i64 = 600;
pub const MAX_HOURS: i64 = MAX_COOKING_TIME / 60;
pub const MIN_SERVINGS: i64 = 1;
pub const MAX_SERVINGS: i64 = 10;
pub const MAX_TAGS_AMOUNT: usize = 10;
pub const MAX_IMAGES_AMOUNT: usize = 10;
pub const MAX_STEPS_AMOUNT: usize = 20;
pub const MAX_TAG_LENGTH: usize = 50;
pub const MIN_TITLE_LENGTH: usize = 2;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MIN_DESCRIPTION_LENGTH: usize = 8;
pub const MIN_NOTE_LENGTH: usize = 8;
pub const MIN_PHRASE_LENGTH: usize = 3;
pub const MIN_COMMENT_LENGTH: usize = 8;

const REQUIRED: &str = "This field is required.";

/// `recipe_ingredients.cup_grams` is `NUMERIC(7, 2)`.
const CUP_GRAMS_WHOLE_DIGITS: u32 = 5;
const CUP_GRAMS_DECIMAL_PLACES: i64 = 2;

fn parse_cup_grams(raw: &str) -> Result<BigDecimal, String> {
    let grams = BigDecimal::from_str(raw.trim())
        .ok()
        .filter(|grams| *grams > BigDecimal::from(0))
        .ok_or_else(|| "A valid positive number is required.".to_string())?
        .normalized();

    let (_, scale) = grams.as_bigint_and_exponent();
    if scale > CUP_GRAMS_DECIMAL_PLACES {
        return Err(format!(
            "Ensure that there are no more than {CUP_GRAMS_DECIMAL_PLACES} decimal places."
        ));
    }
    if grams >= BigDecimal::from(10_u64.pow(CUP_GRAMS_WHOLE_DIGITS)) {
        return Err(format!(
            "Ensure that there are no more than {CUP_GRAMS_WHOLE_DIGITS} digits before the decimal point."
        ));
    }

    Ok(grams)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "Invalid payload in: {}", fields.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing field (`None`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn too_short(name: &str, min: usize) -> String {
    format!("{name} must be at least {min} characters long.")
}

fn only_letters(name: &str) -> String {
    format!("{name} must not contain digits or symbols.")
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

fn is_letters_and_spaces(value: &str) -> bool {
    value.chars().all(|c| c.is_alphabetic() || c.is_whitespace())
}

/// Recipe and step titles: at least two characters, letters and whitespace only.
pub fn check_title(errors: &mut ValidationErrors, field: &str, value: &str) {
    if char_len(value) < MIN_TITLE_LENGTH {
        errors.add(field, too_short("title", MIN_TITLE_LENGTH));
    }
    if char_len(value) > MAX_TITLE_LENGTH {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_TITLE_LENGTH} characters."),
        );
    }
    if !is_letters_and_spaces(value) {
        errors.add(field, only_letters("title"));
    }
}

fn check_optional_min_len(errors: &mut ValidationErrors, field: &str, name: &str, value: &str, min: usize) {
    if !value.is_empty() && char_len(value) < min {
        errors.add(field, too_short(name, min));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CookingTime {
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
}

impl CookingTime {
    pub fn from_minutes(total: i64) -> Self {
        Self {
            hours: total / 60,
            minutes: total % 60,
        }
    }

    pub fn total_minutes(self) -> i64 {
        self.hours * 60 + self.minutes
    }

    fn validate(self, errors: &mut ValidationErrors) -> Option<i16> {
        let mut ok = true;

        if !(0..=MAX_HOURS).contains(&self.hours) {
            errors.add(
                "cooking_time.hours",
                format!("Ensure this value is between 0 and {MAX_HOURS}."),
            );
            ok = false;
        }
        if !(0..=59).contains(&self.minutes) {
            errors.add("cooking_time.minutes", "Ensure this value is between 0 and 59.");
            ok = false;
        }
        if !ok {
            return None;
        }

        let total = self.total_minutes();
        if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&total) {
            errors.add(
                "cooking_time",
                format!(
                    "cooking_time out of range. Must be between {MIN_COOKING_TIME} min and {MAX_HOURS} h."
                ),
            );
            return None;
        }

        i16::try_from(total).ok()
    }
}

/// An amount as sent by clients: either a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(serde_json::Number),
    Text(String),
}

impl RawAmount {
    fn as_string(&self) -> String {
        match self {
            RawAmount::Number(n) => n.to_string(),
            RawAmount::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagePayload {
    pub image: String,
    #[serde(default)]
    pub is_cover: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeIngredientPayload {
    pub ingredient: Uuid,
    pub measurement_unit: String,
    pub amount: RawAmount,
    pub cup_grams: Option<RawAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub ingredients: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipePayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub servings: Option<i64>,
    pub cooking_time: Option<CookingTime>,
    #[serde(default, deserialize_with = "double_option")]
    pub cuisine: Option<Option<String>>,
    pub ending_phrase: Option<String>,
    pub images: Option<Vec<ImagePayload>>,
    #[serde(default, deserialize_with = "double_option")]
    pub video: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub selections: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<RecipeIngredientPayload>>,
    pub steps: Option<Vec<StepPayload>>,
    pub equipment: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Create,
    Update,
}

/// Where a recipe image comes from after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Upload(DataUri),
    /// A path the recipe already stores, sent back unchanged.
    Existing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidImage {
    pub source: ImageSource,
    pub is_cover: bool,
}

#[derive(Debug, Clone)]
pub struct ValidIngredientLine {
    pub ingredient_id: Uuid,
    pub amount: BigDecimal,
    pub measurement_unit: MeasurementUnit,
    pub cup_grams: Option<BigDecimal>,
}

/// A validated recipe payload. `None` fields were not sent.
#[derive(Debug, Clone, Default)]
pub struct ValidRecipe {
    pub title: Option<String>,
    pub description: Option<String>,
    pub servings: Option<i16>,
    pub cooking_time: Option<i16>,
    pub ending_phrase: Option<String>,
    pub cuisine: Option<Option<String>>,
    pub video: Option<Option<DataUri>>,
    pub images: Option<Vec<ValidImage>>,
    pub tags: Option<Vec<String>>,
    pub selections: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<ValidIngredientLine>>,
    pub steps: Option<Vec<NewStep>>,
    pub equipment: Option<Vec<Uuid>>,
}

/// What validation needs to know from the database.
#[derive(Debug, Default)]
pub struct RecipeContext {
    pub mode: Mode,
    /// Every ingredient the payload refers to that exists.
    pub ingredients: HashMap<Uuid, Ingredient>,
    /// Ingredients already on the recipe (updates only).
    pub stored_ingredient_ids: Vec<Uuid>,
    /// Image paths already on the recipe (updates only).
    pub stored_images: Vec<String>,
}

impl RecipePayload {
    /// Ingredient ids the payload mentions, for loading the context.
    pub fn referenced_ingredients(&self) -> Vec<Uuid> {
        let lines = self.ingredients.iter().flatten().map(|line| line.ingredient);
        let in_steps = self
            .steps
            .iter()
            .flatten()
            .flat_map(|step| step.ingredients.iter().copied());

        let mut ids: Vec<Uuid> = lines.chain(in_steps).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn validate(self, ctx: &RecipeContext) -> Result<ValidRecipe, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let creating = ctx.mode == Mode::Create;
        let mut valid = ValidRecipe::default();

        match &self.title {
            Some(title) => check_title(&mut errors, "title", title),
            None if creating => errors.add("title", REQUIRED),
            None => {}
        }
        valid.title = self.title;

        if let Some(description) = &self.description {
            check_optional_min_len(&mut errors, "description", "description", description, MIN_DESCRIPTION_LENGTH);
        }
        valid.description = self.description;

        if let Some(phrase) = &self.ending_phrase {
            check_optional_min_len(&mut errors, "ending_phrase", "ending_phrase", phrase, MIN_PHRASE_LENGTH);
            if phrase.chars().any(char::is_numeric) {
                errors.add("ending_phrase", "ending_phrase must not contain digits.");
            }
        }
        valid.ending_phrase = self.ending_phrase;

        if let Some(servings) = self.servings {
            if (MIN_SERVINGS..=MAX_SERVINGS).contains(&servings) {
                valid.servings = i16::try_from(servings).ok();
            } else {
                errors.add(
                    "servings",
                    format!("Ensure this value is between {MIN_SERVINGS} and {MAX_SERVINGS}."),
                );
            }
        }

        match self.cooking_time {
            Some(time) => valid.cooking_time = time.validate(&mut errors),
            None if creating => errors.add("cooking_time", REQUIRED),
            None => {}
        }

        valid.cuisine = self.cuisine.map(|c| c.filter(|name| !name.is_empty()));

        valid.video = self.video.map(|video| {
            video.filter(|raw| !raw.is_empty()).and_then(|raw| match DataUri::parse(&raw) {
                Ok(upload) => Some(upload),
                Err(e) => {
                    errors.add("video", e.to_string());
                    None
                }
            })
        });

        match self.images {
            Some(images) => valid.images = validate_images(&mut errors, images, &ctx.stored_images),
            None if creating => errors.add("images", REQUIRED),
            None => {}
        }

        if let Some(tags) = self.tags {
            valid.tags = validate_tags(&mut errors, tags);
        }

        if let Some(mut selections) = self.selections {
            if ctx.mode == Mode::Update && !selections.is_empty() {
                errors.add("selections", "PATCH request must not contain selections.");
            }
            selections.sort_unstable();
            selections.dedup();
            valid.selections = Some(selections);
        }

        let sent_ingredient_ids: Option<Vec<Uuid>> = self
            .ingredients
            .as_ref()
            .map(|lines| lines.iter().map(|line| line.ingredient).collect());

        match self.ingredients {
            Some(lines) => valid.ingredients = validate_ingredients(&mut errors, lines, ctx),
            None if creating => errors.add("ingredients", REQUIRED),
            None => {}
        }

        match self.steps {
            Some(steps) => {
                let allowed = sent_ingredient_ids.unwrap_or_else(|| ctx.stored_ingredient_ids.clone());
                valid.steps = validate_steps(&mut errors, steps, &allowed, ctx);
            }
            None if creating => errors.add("steps", REQUIRED),
            None => {}
        }

        if let Some(mut equipment) = self.equipment {
            equipment.sort_unstable();
            equipment.dedup();
            valid.equipment = Some(equipment);
        }

        errors.into_result(valid)
    }
}

fn validate_images(
    errors: &mut ValidationErrors,
    images: Vec<ImagePayload>,
    stored: &[String],
) -> Option<Vec<ValidImage>> {
    if images.is_empty() {
        errors.add("images", "Nothing was passed in images.");
        return None;
    }
    if images.len() > MAX_IMAGES_AMOUNT {
        errors.add("images", format!("Too many images (max {MAX_IMAGES_AMOUNT})."));
        return None;
    }

    let covers = images.iter().filter(|image| image.is_cover).count();
    if covers != 1 {
        errors.add(
            "images",
            "Wrong number of covers. A recipe must have exactly one cover.",
        );
    }

    let mut valid = Vec::with_capacity(images.len());
    for (i, image) in images.into_iter().enumerate() {
        let source = if stored.contains(&image.image) {
            ImageSource::Existing(image.image)
        } else {
            match DataUri::parse_image(&image.image) {
                Ok(upload) => ImageSource::Upload(upload),
                Err(e) => {
                    errors.add(format!("images[{i}].image"), e.to_string());
                    continue;
                }
            }
        };

        valid.push(ValidImage {
            source,
            is_cover: image.is_cover,
        });
    }

    Some(valid)
}

fn validate_tags(errors: &mut ValidationErrors, tags: Vec<String>) -> Option<Vec<String>> {
    if tags.len() > MAX_TAGS_AMOUNT {
        errors.add("tags", format!("Too many tags (max {MAX_TAGS_AMOUNT})."));
        return None;
    }

    let mut names: Vec<String> = Vec::with_capacity(tags.len());
    for (i, tag) in tags.into_iter().enumerate() {
        let tag = tag.trim().to_string();
        if tag.is_empty() {
            errors.add(format!("tags[{i}]"), "This field may not be blank.");
        } else if char_len(&tag) > MAX_TAG_LENGTH {
            errors.add(
                format!("tags[{i}]"),
                format!("Ensure this field has no more than {MAX_TAG_LENGTH} characters."),
            );
        } else if !names.contains(&tag) {
            names.push(tag);
        }
    }

    Some(names)
}

fn validate_ingredients(
    errors: &mut ValidationErrors,
    lines: Vec<RecipeIngredientPayload>,
    ctx: &RecipeContext,
) -> Option<Vec<ValidIngredientLine>> {
    if lines.is_empty() {
        errors.add("ingredients", "Nothing was passed in ingredients.");
        return None;
    }

    let unique: HashSet<Uuid> = lines.iter().map(|line| line.ingredient).collect();
    if unique.len() != lines.len() {
        errors.add("ingredients", "ingredients must not repeat.");
    }

    let mut valid = Vec::with_capacity(lines.len());
    for (i, line) in lines.into_iter().enumerate() {
        let field = |name: &str| format!("ingredients[{i}].{name}");

        let Some(ingredient) = ctx.ingredients.get(&line.ingredient) else {
            errors.add(
                field("ingredient"),
                format!("Invalid pk \"{}\" - object does not exist.", line.ingredient),
            );
            continue;
        };

        let unit = match MeasurementUnit::from_str(&line.measurement_unit) {
            Ok(unit) => unit,
            Err(_) => {
                errors.add(
                    field("measurement_unit"),
                    format!("\"{}\" is not a valid choice.", line.measurement_unit),
                );
                continue;
            }
        };

        let raw_amount = line.amount.as_string();
        let amount = match parse_amount(&raw_amount) {
            Ok(amount) => amount,
            Err(e) => {
                errors.add(field("amount"), e.to_string());
                continue;
            }
        };

        if let Err(e) = check_amount(&ingredient.display_name(), ingredient.is_flavoring, unit, amount) {
            errors.add(field("amount"), e.to_string());
            continue;
        }

        let cup_grams = match line.cup_grams.as_ref().map(RawAmount::as_string) {
            Some(raw) => match parse_cup_grams(&raw) {
                Ok(grams) => Some(grams),
                Err(message) => {
                    errors.add(field("cup_grams"), message);
                    continue;
                }
            },
            None => None,
        };

        let Ok(amount) = BigDecimal::from_str(raw_amount.trim()) else {
            errors.add(field("amount"), "A valid number is required.");
            continue;
        };

        valid.push(ValidIngredientLine {
            ingredient_id: line.ingredient,
            amount,
            measurement_unit: unit,
            cup_grams,
        });
    }

    Some(valid)
}

fn validate_steps(
    errors: &mut ValidationErrors,
    steps: Vec<StepPayload>,
    allowed_ingredients: &[Uuid],
    ctx: &RecipeContext,
) -> Option<Vec<NewStep>> {
    if steps.is_empty() {
        errors.add("steps", "Nothing was passed in steps.");
        return None;
    }
    if steps.len() > MAX_STEPS_AMOUNT {
        errors.add("steps", format!("Too many steps (max {MAX_STEPS_AMOUNT})."));
        return None;
    }

    let mut subset = true;
    let mut valid = Vec::with_capacity(steps.len());

    for (i, step) in steps.into_iter().enumerate() {
        let field = |name: &str| format!("steps[{i}].{name}");

        if step.description.is_empty() {
            errors.add(field("description"), "description is a required field.");
        } else if char_len(&step.description) < MIN_DESCRIPTION_LENGTH {
            errors.add(field("description"), too_short("description", MIN_DESCRIPTION_LENGTH));
        }

        if !step.title.is_empty() {
            check_title(errors, &field("title"), &step.title);
        }
        check_optional_min_len(errors, &field("note"), "note", &step.note, MIN_NOTE_LENGTH);

        for id in &step.ingredients {
            if !ctx.ingredients.contains_key(id) && !ctx.stored_ingredient_ids.contains(id) {
                errors.add(
                    field("ingredients"),
                    format!("Invalid pk \"{id}\" - object does not exist."),
                );
            }
        }
        subset &= step.ingredients.iter().all(|id| allowed_ingredients.contains(id));

        let mut ingredient_ids = step.ingredients;
        ingredient_ids.sort_unstable();
        ingredient_ids.dedup();

        valid.push(NewStep {
            title: step.title,
            description: step.description,
            note: step.note,
            ingredient_ids,
        });
    }

    if !subset {
        errors.add(
            "steps",
            "ingredients in steps must be a subset of ingredients in recipe.",
        );
    }

    Some(valid)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub cover: Option<Option<String>>,
    pub category: Option<String>,
    pub recipes: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidSelection {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover: Option<Option<DataUri>>,
    pub category: Option<String>,
    pub recipes: Option<Vec<Uuid>>,
}

impl SelectionPayload {
    pub fn validate(self, mode: Mode) -> Result<ValidSelection, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        match &self.title {
            Some(title) if char_len(title.trim()) < MIN_TITLE_LENGTH => {
                errors.add("title", too_short("title", MIN_TITLE_LENGTH));
            }
            Some(title) if char_len(title) > MAX_TITLE_LENGTH => errors.add(
                "title",
                format!("Ensure this field has no more than {MAX_TITLE_LENGTH} characters."),
            ),
            Some(_) => {}
            None if mode == Mode::Create => errors.add("title", REQUIRED),
            None => {}
        }

        if let Some(description) = &self.description {
            check_optional_min_len(&mut errors, "description", "description", description, MIN_DESCRIPTION_LENGTH);
        }

        let cover = self.cover.map(|cover| {
            cover.filter(|raw| !raw.is_empty()).and_then(|raw| match DataUri::parse_image(&raw) {
                Ok(upload) => Some(upload),
                Err(e) => {
                    errors.add("cover", e.to_string());
                    None
                }
            })
        });

        let category = self.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        let recipes = self.recipes.map(|mut ids| {
            ids.sort_unstable();
            ids.dedup();
            ids
        });

        errors.into_result(ValidSelection {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description,
            cover,
            category,
            recipes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewPayload {
    #[serde(default)]
    pub comment: String,
}

impl ReviewPayload {
    pub fn validate(self) -> Result<String, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let comment = self.comment.trim().to_string();

        if comment.is_empty() {
            errors.add("comment", "This field may not be blank.");
        } else if char_len(&comment) < MIN_COMMENT_LENGTH {
            errors.add("comment", too_short("comment", MIN_COMMENT_LENGTH));
        }

        errors.into_result(comment)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    const PNG: &str = "data:image/png;base64,aGVsbG8=";

    fn ingredient(id: u128, name: &str, is_flavoring: bool) -> Ingredient {
        Ingredient {
            ingredient_id: Uuid::from_u128(id),
            name: name.to_string(),
            description: String::new(),
            species: String::new(),
            image: None,
            is_flavoring,
            one_piece_weight: None,
            created_at: Utc::now(),
        }
    }

    fn context() -> RecipeContext {
        let ingredients = [ingredient(1, "Flour", false), ingredient(2, "Salt", true)]
            .into_iter()
            .map(|i| (i.ingredient_id, i))
            .collect();

        RecipeContext {
            mode: Mode::Create,
            ingredients,
            ..RecipeContext::default()
        }
    }

    fn payload(value: serde_json::Value) -> RecipePayload {
        serde_json::from_value(value).unwrap()
    }

    fn valid_recipe_json() -> serde_json::Value {
        json!({
            "title": "Bread",
            "cooking_time": {"hours": 1, "minutes": 30},
            "images": [{"image": PNG, "is_cover": true}],
            "ingredients": [
                {"ingredient": Uuid::from_u128(1), "measurement_unit": "g", "amount": "500"},
                {"ingredient": Uuid::from_u128(2), "measurement_unit": "pinch", "amount": 2},
            ],
            "steps": [
                {"description": "Mix everything together", "ingredients": [Uuid::from_u128(1)]},
            ],
            "tags": ["baking", "baking", "bread"],
        })
    }

    #[test]
    fn test_accepts_a_complete_recipe() {
        let valid = payload(valid_recipe_json()).validate(&context()).unwrap();

        assert_eq!(valid.cooking_time, Some(90));
        assert_eq!(valid.tags, Some(vec!["baking".to_string(), "bread".to_string()]));
        assert_eq!(valid.ingredients.as_ref().map(Vec::len), Some(2));
        assert_eq!(valid.steps.as_ref().unwrap()[0].ingredient_ids, vec![Uuid::from_u128(1)]);
        assert!(matches!(
            valid.images.as_ref().unwrap()[0].source,
            ImageSource::Upload(_)
        ));
    }

    #[test]
    fn test_create_requires_core_fields() {
        let errors = payload(json!({})).validate(&context()).unwrap_err();

        for field in ["title", "cooking_time", "images", "ingredients", "steps"] {
            assert_eq!(errors.messages(field), [REQUIRED.to_string()], "{field}");
        }
    }

    #[test]
    fn test_update_ignores_missing_fields() {
        let ctx = RecipeContext {
            mode: Mode::Update,
            ..context()
        };
        let valid = payload(json!({"servings": 4})).validate(&ctx).unwrap();

        assert_eq!(valid.servings, Some(4));
        assert!(valid.title.is_none());
        assert!(valid.steps.is_none());
    }

    #[test]
    fn test_title_must_be_letters() {
        let mut value = valid_recipe_json();
        value["title"] = json!("B");
        let errors = payload(value.clone()).validate(&context()).unwrap_err();
        assert_eq!(errors.messages("title"), [too_short("title", 2)]);

        value["title"] = json!("Bread 2.0");
        let errors = payload(value).validate(&context()).unwrap_err();
        assert_eq!(errors.messages("title"), [only_letters("title")]);
    }

    #[test]
    fn test_cooking_time_bounds() {
        let mut value = valid_recipe_json();
        value["cooking_time"] = json!({"hours": 0, "minutes": 3});
        let errors = payload(value.clone()).validate(&context()).unwrap_err();
        assert_eq!(
            errors.messages("cooking_time"),
            ["cooking_time out of range. Must be between 5 min and 10 h.".to_string()]
        );

        value["cooking_time"] = json!({"hours": 10, "minutes": 1});
        let errors = payload(value.clone()).validate(&context()).unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["cooking_time"]);

        value["cooking_time"] = json!({"minutes": 75});
        let errors = payload(value).validate(&context()).unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["cooking_time.minutes"]);
    }

    #[test]
    fn test_exactly_one_cover() {
        let mut value = valid_recipe_json();
        value["images"] = json!([
            {"image": PNG, "is_cover": true},
            {"image": PNG, "is_cover": true},
        ]);
        let errors = payload(value.clone()).validate(&context()).unwrap_err();
        assert_eq!(
            errors.messages("images"),
            ["Wrong number of covers. A recipe must have exactly one cover.".to_string()]
        );

        value["images"] = json!([]);
        let errors = payload(value).validate(&context()).unwrap_err();
        assert_eq!(errors.messages("images"), ["Nothing was passed in images.".to_string()]);
    }

    #[test]
    fn test_stored_images_can_be_sent_back() {
        let ctx = RecipeContext {
            mode: Mode::Update,
            stored_images: vec!["recipes/images/a.png".to_string()],
            ..context()
        };
        let errors = payload(json!({
            "images": [
                {"image": "recipes/images/a.png", "is_cover": true},
                {"image": "not an upload"},
            ]
        }))
        .validate(&ctx)
        .unwrap_err();

        assert_eq!(errors.fields().collect::<Vec<_>>(), ["images[1].image"]);
    }

    #[test]
    fn test_ingredient_rules() {
        let mut value = valid_recipe_json();
        value["ingredients"] = json!([
            {"ingredient": Uuid::from_u128(1), "measurement_unit": "g", "amount": "1.25"},
            {"ingredient": Uuid::from_u128(1), "measurement_unit": "kg", "amount": "9"},
            {"ingredient": Uuid::from_u128(2), "measurement_unit": "g", "amount": "10"},
            {"ingredient": Uuid::from_u128(3), "measurement_unit": "g", "amount": "10"},
        ]);
        let errors = payload(value).validate(&context()).unwrap_err();

        assert_eq!(errors.messages("ingredients"), ["ingredients must not repeat.".to_string()]);
        assert_eq!(
            errors.messages("ingredients[0].amount"),
            ["Ensure that there are no more than 1 decimal places.".to_string()]
        );
        assert_eq!(
            errors.messages("ingredients[1].amount"),
            ["Amount of Flour must be between 0.1 kg and 5 kg.".to_string()]
        );
        assert!(errors.messages("ingredients[2].amount")[0].starts_with("Wrong measurement unit (gram)"));
        assert!(errors.messages("ingredients[3].ingredient")[0].contains("does not exist"));
    }

    #[test]
    fn test_cup_grams_fit_the_column() {
        assert_eq!(parse_cup_grams("240.50").unwrap(), BigDecimal::from_str("240.5").unwrap());
        assert_eq!(parse_cup_grams("99999.99").unwrap(), BigDecimal::from_str("99999.99").unwrap());
        assert_eq!(
            parse_cup_grams("1.234").unwrap_err(),
            "Ensure that there are no more than 2 decimal places."
        );
        assert_eq!(
            parse_cup_grams("100000").unwrap_err(),
            "Ensure that there are no more than 5 digits before the decimal point."
        );
        assert!(parse_cup_grams("0").is_err());

        let mut value = valid_recipe_json();
        value["ingredients"] = json!([
            {"ingredient": Uuid::from_u128(1), "measurement_unit": "cup", "amount": "1", "cup_grams": "123456789"},
        ]);
        let errors = payload(value).validate(&context()).unwrap_err();

        assert_eq!(
            errors.messages("ingredients[0].cup_grams"),
            ["Ensure that there are no more than 5 digits before the decimal point.".to_string()]
        );
    }

    #[test]
    fn test_step_ingredients_must_belong_to_recipe() {
        let mut value = valid_recipe_json();
        value["steps"] = json!([
            {"description": "Knead the dough well", "ingredients": [Uuid::from_u128(1)]},
            {"description": "Salt", "title": "Step 2", "note": "short"},
        ]);
        value["ingredients"] = json!([
            {"ingredient": Uuid::from_u128(2), "measurement_unit": "to_taste", "amount": "1"},
        ]);
        let errors = payload(value).validate(&context()).unwrap_err();

        assert_eq!(
            errors.messages("steps"),
            ["ingredients in steps must be a subset of ingredients in recipe.".to_string()]
        );
        assert_eq!(errors.messages("steps[1].description"), [too_short("description", 8)]);
        assert_eq!(errors.messages("steps[1].title"), [only_letters("title")]);
        assert_eq!(errors.messages("steps[1].note"), [too_short("note", 8)]);
    }

    #[test]
    fn test_update_checks_steps_against_stored_ingredients() {
        let ctx = RecipeContext {
            mode: Mode::Update,
            stored_ingredient_ids: vec![Uuid::from_u128(1)],
            ..context()
        };
        let ok = payload(json!({
            "steps": [{"description": "Sift the flour twice", "ingredients": [Uuid::from_u128(1)]}]
        }));
        assert!(ok.validate(&ctx).is_ok());

        let bad = payload(json!({
            "steps": [{"description": "Sprinkle with salt", "ingredients": [Uuid::from_u128(2)]}]
        }));
        assert_eq!(bad.validate(&ctx).unwrap_err().fields().collect::<Vec<_>>(), ["steps"]);
    }

    #[test]
    fn test_patch_rejects_selections() {
        let ctx = RecipeContext {
            mode: Mode::Update,
            ..context()
        };
        let errors = payload(json!({"selections": [Uuid::from_u128(9)]}))
            .validate(&ctx)
            .unwrap_err();

        assert_eq!(
            errors.messages("selections"),
            ["PATCH request must not contain selections.".to_string()]
        );
    }

    #[test]
    fn test_ending_phrase_and_tags() {
        let mut value = valid_recipe_json();
        value["ending_phrase"] = json!("Enjoy 2x");
        value["tags"] = json!((0..11).map(|i| format!("tag{i}")).collect::<Vec<_>>());
        let errors = payload(value).validate(&context()).unwrap_err();

        assert_eq!(
            errors.messages("ending_phrase"),
            ["ending_phrase must not contain digits.".to_string()]
        );
        assert_eq!(errors.messages("tags"), ["Too many tags (max 10).".to_string()]);
    }

    #[test]
    fn test_null_video_clears_it() {
        let ctx = RecipeContext {
            mode: Mode::Update,
            ..context()
        };
        let valid = payload(json!({"video": null})).validate(&ctx).unwrap();
        assert_eq!(valid.video, Some(None));

        let valid = payload(json!({})).validate(&ctx).unwrap();
        assert_eq!(valid.video, None);
    }

    #[test]
    fn test_selection_and_review_payloads() {
        let selection: SelectionPayload =
            serde_json::from_value(json!({"title": " ", "cover": "nope"})).unwrap();
        let errors = selection.validate(Mode::Create).unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["cover", "title"]);

        let review = ReviewPayload {
            comment: "  tasty  ".to_string(),
        };
        assert_eq!(
            review.validate().unwrap_err().messages("comment"),
            [too_short("comment", 8)]
        );

        let review = ReviewPayload {
            comment: "Really tasty, thanks!".to_string(),
        };
        assert_eq!(review.validate().unwrap(), "Really tasty, thanks!");
    }

    #[test]
    fn test_cooking_time_round_trips_minutes() {
        assert_eq!(CookingTime::from_minutes(135), CookingTime { hours: 2, minutes: 15 });
        assert_eq!(CookingTime::from_minutes(135).total_minutes(), 135);
    }
}
