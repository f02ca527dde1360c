use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    authentication::permissions::ActionType,
    constants::MAX_NAME_LENGTH,
    error::{Error, FieldErrors, HtmlError, QueryError},
    jwt::SessionData,
    schema::{Id, Ingredient, NewIngredient},
};

impl NewIngredient {
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = FieldErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "This field is required.");
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.add("name", format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."));
        }

        errors.into_result()
    }
}

/// Escapes LIKE wildcards so the search term matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Ingredients ordered by name; `name` narrows to a case-insensitive
/// substring match.
pub async fn fetch_ingredients(
    name: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => sqlx::query_as(
            "SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name, measurement_unit, id",
        )
        .bind(like_pattern(name))
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?,
        None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name, measurement_unit, id")
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?,
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn create_ingredient(
    session: &SessionData,
    ingredient: &NewIngredient,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    ingredient.validate()?;

    let row: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(ingredient.name.trim())
    .bind(ingredient.measurement_unit)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn update_ingredient(
    session: &SessionData,
    id: Id,
    ingredient: &NewIngredient,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    ingredient.validate()?;

    let row: Option<Ingredient> = sqlx::query_as(
        "UPDATE ingredients SET name = $1, measurement_unit = $2 WHERE id = $3 RETURNING *",
    )
    .bind(ingredient.name.trim())
    .bind(ingredient.measurement_unit)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| HtmlError::NotFound.new("No ingredient exists with specified id"))
}

/// Ingredients referenced by a recipe can't be deleted.
pub async fn delete_ingredient(
    session: &SessionData,
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageCatalog)?;

    let result = sqlx::query("DELETE FROM ingredients WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| match QueryError::from(e) {
            e if e.kind() == HtmlError::Validation => {
                HtmlError::Validation.new("Ingredient is used by existing recipes")
            }
            e => e.into(),
        })?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No ingredient exists with specified id"));
    }

    Ok(())
}

/// Bulk inserts `ingredients` and returns the number of new rows.
pub async fn import_ingredients(
    ingredients: &[NewIngredient],
    pool: &Pool<Postgres>,
) -> Result<u64, Error> {
    let mut inserted = 0;

    for chunk in ingredients.chunks(65535 / 2) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(chunk.iter(), |mut b, ingredient| {
            b.push_bind(ingredient.name.trim())
                .push_bind(ingredient.measurement_unit);
        });

        let result = query_builder
            .build()
            .execute(pool)
            .await
            .map_err(QueryError::from)?;
        inserted += result.rows_affected();
    }

    log::info!("Imported {inserted} new ingredients");
    Ok(inserted)
}
