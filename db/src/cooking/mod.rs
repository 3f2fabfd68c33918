pub mod cuisines;
pub mod equipment;
pub mod filters;
pub mod images;
pub mod ingredients;
pub mod measurement;
pub mod reactions;
pub mod recipe;
pub mod reviews;
pub mod selections;
pub mod steps;
pub mod tags;

pub use cuisines::Cuisine;
pub use equipment::{Equipment, NewEquipment, RecipeEquipment};
pub use filters::{FilterError, RecipeFilter};
pub use images::{NewRecipeImage, RecipeImage};
pub use ingredients::{Ingredient, NewIngredient, NewRecipeIngredient, RecipeIngredient};
pub use measurement::{Fraction, MeasurementError, MeasurementUnit};
pub use reactions::{RecipeReaction, SelectionReaction};
pub use recipe::{NewRecipe, Recipe, RecipeChanges, RecipeStats};
pub use reviews::RecipeReview;
pub use selections::{Category, NewSelection, Selection, SelectionChanges, SelectionStats};
pub use steps::{NewStep, RecipeStep, StepIngredient};
pub use tags::{RecipeTag, Tag};
