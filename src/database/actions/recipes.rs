use std::collections::{HashMap, HashSet};

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::permissions::ActionType,
    draft::{DraftMode, RecipeDraft, ValidRecipe},
    error::{Error, FieldErrors, HtmlError, QueryError},
    form::QueryParams,
    jwt::SessionData,
    pagination::{Page, PageRequest},
    schema::{Id, Recipe, RecipeDetail, RecipeIngredient, RecipeRow, RecipeShort, RecipeTag, Tag},
    storage::FsBlobStore,
};

use super::{
    relations::{filter_related, Favorite, ShoppingCart},
    users::list_profiles,
};

/// Read filters of the recipe list. Every list is any-of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Vec<String>,
    pub authors: Vec<Id>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_query(query: &QueryParams) -> Result<Self, Error> {
        Ok(Self {
            tags: query.get_all("tags").into_iter().map(str::to_owned).collect(),
            authors: query.get_numbers("author")?,
            is_favorited: query.get_flag("is_favorited"),
            is_in_shopping_cart: query.get_flag("is_in_shopping_cart"),
        })
    }
}

/// Newest recipes first. Set filters only apply to signed in viewers.
pub async fn fetch_recipes(
    viewer: Option<&SessionData>,
    filter: &RecipeFilter,
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<Page<RecipeDetail>, Error> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (
                    SELECT 1 FROM recipe_tags rt
                    INNER JOIN tags t ON t.id = rt.tag_id
                    WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if !filter.authors.is_empty() {
        query_builder
            .push(" AND r.author_id = ANY(")
            .push_bind(filter.authors.clone())
            .push(")");
    }
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer.user_id)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(viewer.user_id)
                .push(")");
        }
    }

    query_builder
        .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
        .push_bind(request.limit)
        .push(" OFFSET ")
        .push_bind(request.offset());

    let rows: Vec<RecipeRow> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    if rows.is_empty() {
        return Ok(Page::no_rows());
    }

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let recipes: Vec<Recipe> = rows.into_iter().map(Recipe::from).collect();
    let details = hydrate_recipes(viewer, recipes, pool).await?;

    Ok(Page::from_rows(details, total_count, request))
}

/// Attaches tags, ingredient lines, authors and the viewer's flags.
async fn hydrate_recipes(
    viewer: Option<&SessionData>,
    recipes: Vec<Recipe>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, Error> {
    let ids: Vec<Id> = recipes.iter().map(|r| r.id).collect();

    let tag_rows: Vec<RecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.slug, t.color
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name, t.id
    ",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let ingredient_rows: Vec<RecipeIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.position
    ",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    tag_rows.into_iter().for_each(|row| {
        tags.entry(row.recipe_id).or_default().push(row.into());
    });

    let mut ingredients: HashMap<Id, Vec<RecipeIngredient>> = HashMap::new();
    ingredient_rows.into_iter().for_each(|row| {
        ingredients.entry(row.recipe_id).or_default().push(row);
    });

    let author_ids: Vec<Id> = recipes
        .iter()
        .map(|r| r.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let authors: HashMap<Id, _> = list_profiles(viewer, &author_ids, pool)
        .await?
        .into_iter()
        .map(|author| (author.id, author))
        .collect();

    let (favorited, in_cart): (HashSet<Id>, HashSet<Id>) = match viewer {
        Some(viewer) => (
            filter_related::<Favorite>(viewer.user_id, &ids, pool)
                .await?
                .into_iter()
                .collect(),
            filter_related::<ShoppingCart>(viewer.user_id, &ids, pool)
                .await?
                .into_iter()
                .collect(),
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    recipes
        .into_iter()
        .map(|recipe| -> Result<RecipeDetail, Error> {
            let author = authors.get(&recipe.author_id).cloned().ok_or_else(|| {
                log::error!("Author {} of recipe {} is missing", recipe.author_id, recipe.id);
                HtmlError::InternalServerError.default()
            })?;

            Ok(RecipeDetail {
                id: recipe.id,
                tags: tags.remove(&recipe.id).unwrap_or_default(),
                author,
                ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
                is_favorited: favorited.contains(&recipe.id),
                is_in_shopping_cart: in_cart.contains(&recipe.id),
                name: recipe.name,
                image: recipe.image,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            })
        })
        .collect()
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_recipe_detail(
    viewer: Option<&SessionData>,
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))?;

    hydrate_recipes(viewer, vec![recipe], pool)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))
}

pub async fn get_recipe_short(id: Id, pool: &Pool<Postgres>) -> Result<RecipeShort, Error> {
    let row: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    row.ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))
}

/// The recipe, if `session` may change it: its author, or anyone allowed to
/// manage every recipe.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = get_recipe(id, pool).await?;

    match recipe {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(_) if recipe.author_id == session.user_id => Ok(recipe),
            Err(e) => Err(e),
        },
        None => Err(HtmlError::NotFound.new("No recipe exists with specified id")),
    }
}

/// Ids of `requested` that are not in `found`, in request order.
fn missing_ids(requested: &[Id], found: &[Id]) -> Vec<Id> {
    let found: HashSet<&Id> = found.iter().collect();
    requested
        .iter()
        .filter(|id| !found.contains(id))
        .copied()
        .collect()
}

async fn check_references(
    tr: &mut Transaction<'_, Postgres>,
    recipe: &ValidRecipe,
) -> Result<(), Error> {
    let mut errors = FieldErrors::default();

    let tags: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(&recipe.tags[..])
        .fetch_all(&mut **tr)
        .await
        .map_err(QueryError::from)?;
    let tags: Vec<Id> = tags.into_iter().map(|t| t.0).collect();
    for id in missing_ids(&recipe.tags, &tags) {
        errors.add("tags", format!("Tag {id} doesn't exist."));
    }

    let requested: Vec<Id> = recipe.ingredients.iter().map(|l| l.ingredient_id).collect();
    let ingredients: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(&requested[..])
        .fetch_all(&mut **tr)
        .await
        .map_err(QueryError::from)?;
    let ingredients: Vec<Id> = ingredients.into_iter().map(|i| i.0).collect();
    for id in missing_ids(&requested, &ingredients) {
        errors.add("ingredients", format!("Ingredient {id} doesn't exist."));
    }

    errors.into_result()
}

fn recipe_conflict(e: QueryError) -> Error {
    match e.constraint() {
        Some("recipes_author_name_key") => {
            Error::field("name", "You already have a recipe with this name.")
        }
        _ => e.into(),
    }
}

/// Attaches the tag set and ingredient lines of `recipe` to `recipe_id`.
async fn insert_children(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    recipe: &ValidRecipe,
) -> Result<(), Error> {
    sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, UNNEST($2::int4[])")
        .bind(recipe_id)
        .bind(&recipe.tags[..])
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount, position) ",
    );

    query_builder.push_values(
        recipe.ingredients.iter().enumerate(),
        |mut b, (position, line)| {
            b.push_bind(recipe_id)
                .push_bind(line.ingredient_id)
                .push_bind(line.amount)
                .push_bind(position as i32);
        },
    );

    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe(
    author_id: Id,
    recipe: &ValidRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Id, Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    check_references(&mut tr, recipe).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(image)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| recipe_conflict(QueryError::from(e)))?;

    insert_children(&mut tr, id.0, recipe).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    Ok(id.0)
}

/// Validates `draft`, stores its image and writes the recipe with its tags
/// and ingredient lines in one transaction. Nothing is kept on failure.
pub async fn create_recipe(
    session: &SessionData,
    draft: RecipeDraft,
    blobs: &FsBlobStore,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    let recipe = draft.validate(DraftMode::Create)?;

    let image = recipe
        .image
        .as_ref()
        .ok_or_else(|| Error::field("image", "This field is required."))?;
    let url = blobs.store(image).await?;

    let id = match insert_recipe(session.user_id, &recipe, &url, pool).await {
        Ok(id) => id,
        Err(e) => {
            blobs.remove(&url).await;
            return Err(e);
        }
    };

    log::info!("User {} created recipe {id}", session.user_id);
    get_recipe_detail(Some(session), id, pool).await
}

async fn replace_recipe(
    id: Id,
    recipe: &ValidRecipe,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    check_references(&mut tr, recipe).await?;

    sqlx::query(
        "
        UPDATE recipes
        SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
        WHERE id = $5
    ",
    )
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(image)
    .bind(id)
    .execute(&mut *tr)
    .await
    .map_err(|e| recipe_conflict(QueryError::from(e)))?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    insert_children(&mut tr, id, recipe).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    Ok(())
}

/// Replaces every field of the recipe, its tag set and its ingredient lines.
/// The stored image is kept unless a new one is supplied.
pub async fn update_recipe(
    session: &SessionData,
    id: Id,
    draft: RecipeDraft,
    blobs: &FsBlobStore,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, Error> {
    let current = get_recipe_mut(id, session, pool).await?;
    let recipe = draft.validate(DraftMode::Update)?;

    let url = match recipe.image.as_ref() {
        Some(image) => Some(blobs.store(image).await?),
        None => None,
    };

    if let Err(e) = replace_recipe(id, &recipe, url.as_deref(), pool).await {
        if let Some(url) = url {
            blobs.remove(&url).await;
        }
        return Err(e);
    }

    if url.is_some() {
        blobs.remove(&current.image).await;
    }

    log::info!("User {} updated recipe {id}", session.user_id);
    get_recipe_detail(Some(session), id, pool).await
}

/// Deletes the recipe; its ingredient lines, tags and relation rows cascade.
pub async fn delete_recipe(
    session: &SessionData,
    id: Id,
    blobs: &FsBlobStore,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let recipe = get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    blobs.remove(&recipe.image).await;
    log::info!("User {} deleted recipe {id}", session.user_id);
    Ok(())
}
