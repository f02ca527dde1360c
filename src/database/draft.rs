use std::collections::HashSet;

use serde::Deserialize;

use crate::{
    constants::{
        MAX_COOKING_TIME, MAX_INGREDIENT_AMOUNT, MAX_NAME_LENGTH, MIN_COOKING_TIME,
        MIN_INGREDIENT_AMOUNT,
    },
    error::{Error, FieldErrors},
    schema::Id,
    storage::ImagePayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Create,
    Update,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i64,
}

/// Recipe payload as submitted by a client. Every field is optional here so
/// that missing fields are reported alongside the other validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i64>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientLine {
    pub ingredient_id: Id,
    pub amount: i32,
}

/// A fully validated recipe with its child rows staged for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<ImagePayload>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientLine>,
}

impl RecipeDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_owned());
        self
    }

    pub fn image(mut self, data_url: &str) -> Self {
        self.image = Some(data_url.to_owned());
        self
    }

    pub fn cooking_time(mut self, minutes: i64) -> Self {
        self.cooking_time = Some(minutes);
        self
    }

    pub fn tag(mut self, id: Id) -> Self {
        self.tags.get_or_insert_with(Vec::new).push(id);
        self
    }

    pub fn ingredient(mut self, id: Id, amount: i64) -> Self {
        self.ingredients
            .get_or_insert_with(Vec::new)
            .push(IngredientAmount { id, amount });
        self
    }

    /// Checks every field and stages the child rows. Nothing is written
    /// anywhere; all violations are collected into one error.
    pub fn validate(self, mode: DraftMode) -> Result<ValidRecipe, Error> {
        let mut errors = FieldErrors::default();

        let name = required_text(&mut errors, "name", self.name, Some(MAX_NAME_LENGTH));
        let text = required_text(&mut errors, "text", self.text, None);
        let cooking_time = validate_cooking_time(&mut errors, self.cooking_time);
        let tags = validate_tags(&mut errors, self.tags);
        let ingredients = validate_ingredients(&mut errors, self.ingredients);

        let image = match (self.image.filter(|i| !i.trim().is_empty()), mode) {
            (Some(data), _) => match ImagePayload::from_data_url(&data) {
                Ok(image) => Some(image),
                Err(e) => {
                    errors.add("image", e);
                    None
                }
            },
            (None, DraftMode::Create) => {
                errors.add("image", "This field is required.");
                None
            }
            (None, DraftMode::Update) => None,
        };

        errors.into_result()?;

        Ok(ValidRecipe {
            name,
            text,
            cooking_time,
            image,
            tags,
            ingredients,
        })
    }
}

fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max_length: Option<usize>,
) -> String {
    let value = value.map(|v| v.trim().to_owned()).unwrap_or_default();

    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if let Some(max) = max_length {
        if value.chars().count() > max {
            errors.add(field, format!("Ensure this field has no more than {max} characters."));
        }
    }

    value
}

fn validate_cooking_time(errors: &mut FieldErrors, value: Option<i64>) -> i32 {
    match value {
        None => {
            errors.add("cooking_time", "This field is required.");
            0
        }
        Some(minutes) if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&minutes) => {
            errors.add(
                "cooking_time",
                format!("Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME} minutes."),
            );
            0
        }
        Some(minutes) => minutes as i32,
    }
}

fn validate_tags(errors: &mut FieldErrors, tags: Option<Vec<Id>>) -> Vec<Id> {
    let tags = tags.unwrap_or_default();

    if tags.is_empty() {
        errors.add("tags", "Select at least one tag.");
    }

    let mut seen = HashSet::new();
    for id in tags.iter() {
        if !seen.insert(*id) {
            errors.add("tags", format!("Tag {id} is listed more than once."));
        }
    }

    tags
}

fn validate_ingredients(
    errors: &mut FieldErrors,
    ingredients: Option<Vec<IngredientAmount>>,
) -> Vec<IngredientLine> {
    let ingredients = ingredients.unwrap_or_default();

    if ingredients.is_empty() {
        errors.add("ingredients", "Add at least one ingredient.");
    }

    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(ingredients.len());
    for line in ingredients {
        if !seen.insert(line.id) {
            errors.add(
                "ingredients",
                format!("Ingredient {} is listed more than once.", line.id),
            );
            continue;
        }
        if !(MIN_INGREDIENT_AMOUNT..=MAX_INGREDIENT_AMOUNT).contains(&line.amount) {
            errors.add(
                "ingredients",
                format!(
                    "Amount of ingredient {} must be between {MIN_INGREDIENT_AMOUNT} and {MAX_INGREDIENT_AMOUNT}.",
                    line.id
                ),
            );
            continue;
        }

        lines.push(IngredientLine {
            ingredient_id: line.id,
            amount: line.amount as i32,
        });
    }

    lines
}
