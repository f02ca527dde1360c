use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    constants::{MAX_COLOR_LENGTH, MAX_NAME_LENGTH},
    error::{Error, FieldErrors, HtmlError, QueryError},
    jwt::SessionData,
    schema::{Id, NewTag, Tag},
};

impl NewTag {
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = FieldErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "This field is required.");
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.add("name", format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."));
        }

        if self.slug.is_empty() || self.slug.len() > MAX_NAME_LENGTH {
            errors.add("slug", "Enter a valid slug.");
        } else if !self
            .slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            errors.add("slug", "Slug may contain only letters, numbers, underscores or hyphens.");
        }

        if !is_hex_color(&self.color) {
            errors.add("color", "Enter a color in #RRGGBB format.");
        }

        errors.into_result()
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == MAX_COLOR_LENGTH
        && color
            .strip_prefix('#')
            .map(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false)
}

/// Maps uniqueness violations of `tags` onto the offending field.
fn tag_conflict(e: QueryError) -> Error {
    match e.constraint() {
        Some("tags_name_key") => Error::field("name", "Tag with this name already exists."),
        Some("tags_slug_key") => Error::field("slug", "Tag with this slug already exists."),
        _ => e.into(),
    }
}

pub async fn create_tag(
    session: &SessionData,
    tag: &NewTag,
    pool: &Pool<Postgres>,
) -> Result<Tag, Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    tag.validate()?;

    let row: Tag = sqlx::query_as(
        "INSERT INTO tags (name, slug, color) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(tag.name.trim())
    .bind(&tag.slug)
    .bind(tag.color.to_uppercase())
    .fetch_one(pool)
    .await
    .map_err(|e| tag_conflict(QueryError::from(e)))?;

    log::info!("Created tag {} ({})", row.id, row.slug);
    Ok(row)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn find_tag(slug: &str, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name, id")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn update_tag(
    session: &SessionData,
    id: Id,
    tag: &NewTag,
    pool: &Pool<Postgres>,
) -> Result<Tag, Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    tag.validate()?;

    let row: Option<Tag> = sqlx::query_as(
        "UPDATE tags SET name = $1, slug = $2, color = $3 WHERE id = $4 RETURNING *",
    )
    .bind(tag.name.trim())
    .bind(&tag.slug)
    .bind(tag.color.to_uppercase())
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| tag_conflict(QueryError::from(e)))?;

    row.ok_or_else(|| HtmlError::NotFound.new("No tag exists with specified id"))
}

/// Tags still attached to a recipe can't be deleted.
pub async fn delete_tag(session: &SessionData, id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    session.authenticate(ActionType::ManageCatalog)?;

    let result = sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| match QueryError::from(e) {
            e if e.kind() == HtmlError::Validation => {
                HtmlError::Validation.new("Tag is used by existing recipes")
            }
            e => e.into(),
        })?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No tag exists with specified id"));
    }

    log::info!("Deleted tag {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, slug: &str, color: &str) -> NewTag {
        NewTag {
            name: name.to_owned(),
            slug: slug.to_owned(),
            color: color.to_owned(),
        }
    }

    #[test]
    fn valid_tag() {
        assert!(tag("Breakfast", "breakfast", "#E26C2D").validate().is_ok());
        assert!(tag("Late dinner", "late_dinner-2", "#49b64e").validate().is_ok());
    }

    #[test]
    fn bad_slug_and_color() {
        let err = tag("Lunch", "lunch time", "red").validate().unwrap_err();
        assert!(err.fields.contains("slug"));
        assert!(err.fields.contains("color"));
        assert!(!err.fields.contains("name"));
    }

    #[test]
    fn colors() {
        assert!(is_hex_color("#000000"));
        assert!(!is_hex_color("#00000"));
        assert!(!is_hex_color("0000000"));
        assert!(!is_hex_color("#GG0000"));
    }
}
