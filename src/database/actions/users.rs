use std::collections::HashMap;

use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionKeys},
    },
    constants::{MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH, MIN_USERNAME_LENGTH, RESERVED_USERNAMES},
    error::{Error, FieldErrors, HtmlError, QueryError},
    jwt::SessionData,
    pagination::{Page, PageRequest},
    schema::{Id, RecipeShort, Subscription, User, UserProfile},
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = FieldErrors::default();

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => errors.add("email", "Enter a valid email address."),
        }

        let username = self.username.trim();
        let length = username.chars().count();
        if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
            errors.add(
                "username",
                format!("Username must be {MIN_USERNAME_LENGTH} to {MAX_USERNAME_LENGTH} characters long."),
            );
        }
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
        {
            errors.add("username", "Username may contain only letters, digits and @/./+/-/_.");
        }
        if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
            errors.add("username", format!("Username {username} is reserved."));
        }

        validate_password(&mut errors, "password", &self.password);

        errors.into_result()
    }
}

fn validate_password(errors: &mut FieldErrors, field: &str, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            field,
            format!("Password must contain at least {MIN_PASSWORD_LENGTH} characters."),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "Password can't be entirely numeric.");
    }
}

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Creates a user; the password is stored as an argon2 hash.
pub async fn register_user(user: &NewUser, pool: &Pool<Postgres>) -> Result<UserProfile, Error> {
    user.validate()?;

    let password = hash_password(&user.password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        HtmlError::InternalServerError.default()
    })?;

    let row: Option<(Id,)> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING id
    ",
    )
    .bind(user.email.trim())
    .bind(user.username.trim())
    .bind(user.first_name.trim())
    .bind(user.last_name.trim())
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    match row {
        Some((id,)) => {
            log::info!("Registered user {id} ({})", user.username.trim());
            get_profile(None, id, pool).await
        }
        None => Err(Error::field(
            "username",
            "A user with that username or email already exists.",
        )),
    }
}

pub async fn login_user(
    email: &str,
    password: &str,
    keys: &SessionKeys,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let user = get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| Error::field("non_field_errors", "Invalid credentials"))?;

    let authenticated = verify_password(password, &user.password).map_err(|e| {
        log::error!("Stored password of user {} is unreadable: {e}", user.id);
        HtmlError::InternalServerError.default()
    })?;
    if !authenticated {
        return Err(Error::field("non_field_errors", "Invalid credentials"));
    }

    generate_jwt_session(&user, keys)
}

pub async fn set_password(
    session: &SessionData,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user_by_id(pool, session.user_id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("User doesn't exist"))?;

    let matches = verify_password(current_password, &user.password)
        .map_err(|_| HtmlError::InternalServerError.default())?;
    if !matches {
        return Err(Error::field("current_password", "Wrong password."));
    }

    let mut errors = FieldErrors::default();
    validate_password(&mut errors, "new_password", new_password);
    errors.into_result()?;

    let password = hash_password(new_password).map_err(|_| HtmlError::InternalServerError.default())?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(session.user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

/// Profile of `user_id` as seen by `viewer`.
pub async fn get_profile(
    viewer: Option<&SessionData>,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, Error> {
    let profiles = list_profiles(viewer, &[user_id], pool).await?;

    profiles
        .into_iter()
        .next()
        .ok_or_else(|| HtmlError::NotFound.new("No user exists with specified id"))
}

pub async fn list_profiles(
    viewer: Option<&SessionData>,
    user_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<UserProfile>, Error> {
    let rows: Vec<UserProfile> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            EXISTS (
                SELECT 1 FROM follows f WHERE f.user_id = $2 AND f.author_id = u.id
            ) AS is_subscribed
        FROM users u
        WHERE u.id = ANY($1)
    ",
    )
    .bind(user_ids)
    .bind(viewer.map(|s| s.user_id))
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Authors `session` follows, each with up to `recipes_limit` recent recipes.
pub async fn fetch_subscriptions(
    session: &SessionData,
    request: PageRequest,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Page<Subscription>, Error> {
    let rows: Vec<(Id, i64)> = sqlx::query_as(
        "
        SELECT f.author_id, COUNT(*) OVER()
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    if rows.is_empty() {
        return Ok(Page::no_rows());
    }

    let total_count = rows.first().map(|r| r.1).unwrap_or(0);
    let author_ids: Vec<Id> = rows.iter().map(|r| r.0).collect();
    let mut subscriptions = build_subscriptions(Some(session), &author_ids, recipes_limit, pool).await?;

    let ordered = author_ids
        .iter()
        .filter_map(|id| subscriptions.remove(id))
        .collect();

    Ok(Page::from_rows(ordered, total_count, request))
}

pub async fn get_subscription(
    session: &SessionData,
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, Error> {
    build_subscriptions(Some(session), &[author_id], recipes_limit, pool)
        .await?
        .remove(&author_id)
        .ok_or_else(|| HtmlError::NotFound.new("No user exists with specified id"))
}

async fn build_subscriptions(
    viewer: Option<&SessionData>,
    author_ids: &[Id],
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Subscription>, Error> {
    let profiles = list_profiles(viewer, author_ids, pool).await?;

    let recipes: Vec<(Id, i64, i32, String, String, i32)> = sqlx::query_as(
        "
        SELECT r.author_id, COUNT(*) OVER (PARTITION BY r.author_id),
            r.id, r.name, r.image, r.cooking_time
        FROM recipes r
        WHERE r.author_id = ANY($1)
        ORDER BY r.created_at DESC, r.id DESC
    ",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut subscriptions: HashMap<Id, Subscription> = profiles
        .into_iter()
        .map(|author| {
            (
                author.id,
                Subscription {
                    author,
                    recipes: vec![],
                    recipes_count: 0,
                },
            )
        })
        .collect();

    let limit = recipes_limit.map(|l| l.max(0) as usize);
    for (author_id, count, id, name, image, cooking_time) in recipes {
        if let Some(subscription) = subscriptions.get_mut(&author_id) {
            subscription.recipes_count = count;
            if limit.map_or(true, |l| subscription.recipes.len() < l) {
                subscription.recipes.push(RecipeShort {
                    id,
                    name,
                    image,
                    cooking_time,
                });
            }
        }
    }

    Ok(subscriptions)
}
