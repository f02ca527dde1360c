use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError, QueryError},
    jwt::SessionData,
    schema::Id,
};

/// Presence of a (subject, object) pair in a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Absent,
    Present,
}

impl Presence {
    /// Presence before an `INSERT .. ON CONFLICT DO NOTHING` that touched
    /// `rows_affected` rows.
    pub fn before_insert(rows_affected: u64) -> Self {
        if rows_affected == 0 {
            Presence::Present
        } else {
            Presence::Absent
        }
    }

    /// Presence before a `DELETE` that touched `rows_affected` rows.
    pub fn before_delete(rows_affected: u64) -> Self {
        if rows_affected == 0 {
            Presence::Absent
        } else {
            Presence::Present
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Add,
    Remove,
}

impl Toggle {
    /// Resolves the toggle against the presence observed when it was applied.
    /// Adding a present pair and removing an absent one are both rejected.
    pub fn apply<R: Relation>(self, observed: Presence) -> Result<Presence, Error> {
        match (self, observed) {
            (Toggle::Add, Presence::Absent) => Ok(Presence::Present),
            (Toggle::Remove, Presence::Present) => Ok(Presence::Absent),
            (Toggle::Add, Presence::Present) => Err(HtmlError::Conflict.new(R::ALREADY_PRESENT)),
            (Toggle::Remove, Presence::Absent) => Err(HtmlError::Conflict.new(R::ALREADY_ABSENT)),
        }
    }
}

/// A unique (subject, object) relation owned by the subject.
pub trait Relation {
    const TABLE: &'static str;
    const SUBJECT: &'static str;
    const OBJECT: &'static str;
    /// Table the object id points into.
    const OBJECT_TABLE: &'static str;

    const ALREADY_PRESENT: &'static str;
    const ALREADY_ABSENT: &'static str;
    const OBJECT_MISSING: &'static str;

    /// Checked before the object lookup and before any state is read.
    fn check(_subject: Id, _object: Id) -> Result<(), Error> {
        Ok(())
    }
}

pub struct Favorite;

impl Relation for Favorite {
    const TABLE: &'static str = "favorites";
    const SUBJECT: &'static str = "user_id";
    const OBJECT: &'static str = "recipe_id";
    const OBJECT_TABLE: &'static str = "recipes";

    const ALREADY_PRESENT: &'static str = "Recipe is already in favorites";
    const ALREADY_ABSENT: &'static str = "Recipe is not in favorites";
    const OBJECT_MISSING: &'static str = "No recipe exists with specified id";
}

pub struct ShoppingCart;

impl Relation for ShoppingCart {
    const TABLE: &'static str = "shopping_carts";
    const SUBJECT: &'static str = "user_id";
    const OBJECT: &'static str = "recipe_id";
    const OBJECT_TABLE: &'static str = "recipes";

    const ALREADY_PRESENT: &'static str = "Recipe is already in the shopping cart";
    const ALREADY_ABSENT: &'static str = "Recipe is not in the shopping cart";
    const OBJECT_MISSING: &'static str = "No recipe exists with specified id";
}

pub struct Follow;

impl Relation for Follow {
    const TABLE: &'static str = "follows";
    const SUBJECT: &'static str = "user_id";
    const OBJECT: &'static str = "author_id";
    const OBJECT_TABLE: &'static str = "users";

    const ALREADY_PRESENT: &'static str = "You are already subscribed to this author";
    const ALREADY_ABSENT: &'static str = "You are not subscribed to this author";
    const OBJECT_MISSING: &'static str = "No user exists with specified id";

    fn check(subject: Id, object: Id) -> Result<(), Error> {
        if subject == object {
            return Err(Error::field("author", "You can't subscribe to yourself"));
        }
        Ok(())
    }
}

/// A session whose user row is gone fails the subject foreign key.
fn subject_missing<R: Relation>(e: sqlx::Error) -> Error {
    let e = QueryError::from(e);
    if e.constraint() == Some(format!("{}_{}_fkey", R::TABLE, R::SUBJECT).as_str()) {
        return HtmlError::InvalidSession.new("Invalid session; User no longer exists");
    }
    e.into()
}

async fn authorize<R: Relation>(
    session: Option<SessionData>,
    object: Id,
    pool: &Pool<Postgres>,
) -> Result<SessionData, Error> {
    let session = SessionData::require(session)?;
    session.authenticate(ActionType::ManageOwnRelations)?;
    R::check(session.user_id, object)?;

    let subject: Option<(Id,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(session.user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    if subject.is_none() {
        return Err(HtmlError::InvalidSession.new("Invalid session; User no longer exists"));
    }

    let exists: Option<(Id,)> =
        sqlx::query_as(&format!("SELECT id FROM {} WHERE id = $1", R::OBJECT_TABLE))
            .bind(object)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    if exists.is_none() {
        return Err(HtmlError::NotFound.new(R::OBJECT_MISSING));
    }

    Ok(session)
}

/// Adds `object` to the caller's relation. The insert and the presence check
/// are one statement, so concurrent adds of one pair cannot both succeed.
pub async fn add_relation<R: Relation>(
    session: Option<SessionData>,
    object: Id,
    pool: &Pool<Postgres>,
) -> Result<SessionData, Error> {
    let session = authorize::<R>(session, object, pool).await?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} ({}, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        R::TABLE,
        R::SUBJECT,
        R::OBJECT
    ))
    .bind(session.user_id)
    .bind(object)
    .execute(pool)
    .await
    .map_err(subject_missing::<R>)?;

    Toggle::Add.apply::<R>(Presence::before_insert(result.rows_affected()))?;
    log::trace!("> {} +({}, {object})", R::TABLE, session.user_id);

    Ok(session)
}

pub async fn remove_relation<R: Relation>(
    session: Option<SessionData>,
    object: Id,
    pool: &Pool<Postgres>,
) -> Result<SessionData, Error> {
    let session = authorize::<R>(session, object, pool).await?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = $1 AND {} = $2",
        R::TABLE,
        R::SUBJECT,
        R::OBJECT
    ))
    .bind(session.user_id)
    .bind(object)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    Toggle::Remove.apply::<R>(Presence::before_delete(result.rows_affected()))?;
    log::trace!("> {} -({}, {object})", R::TABLE, session.user_id);

    Ok(session)
}

pub async fn has_relation<R: Relation>(
    subject: Id,
    object: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: Option<(Id,)> = sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE {} = $1 AND {} = $2",
        R::OBJECT,
        R::TABLE,
        R::SUBJECT,
        R::OBJECT
    ))
    .bind(subject)
    .bind(object)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.is_some())
}

/// Objects among `objects` that `subject` is related to.
pub async fn filter_related<R: Relation>(
    subject: Id,
    objects: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<Id>, Error> {
    if objects.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE {} = $1 AND {} = ANY($2)",
        R::OBJECT,
        R::TABLE,
        R::SUBJECT,
        R::OBJECT
    ))
    .bind(subject)
    .bind(objects)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}
