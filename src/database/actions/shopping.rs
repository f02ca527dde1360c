use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    jwt::SessionData,
    schema::Id,
    shopping_list::{CartLine, CartRecipe, ShoppingList},
};

use super::users::get_user_by_id;

/// Every recipe in the user's cart with its ingredient lines. Recipes without
/// lines are still listed.
pub async fn list_cart_recipes(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<CartRecipe>, Error> {
    let recipe_ids: Vec<(Id,)> =
        sqlx::query_as("SELECT recipe_id FROM shopping_carts WHERE user_id = $1 ORDER BY recipe_id")
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let lines: Vec<CartLine> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.name, i.measurement_unit, ri.amount
        FROM shopping_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut hashmap: HashMap<Id, Vec<CartLine>> = HashMap::new();
    lines.into_iter().for_each(|line| {
        hashmap.entry(line.recipe_id).or_default().push(line);
    });

    Ok(recipe_ids
        .into_iter()
        .map(|(recipe_id,)| CartRecipe {
            recipe_id,
            lines: hashmap.remove(&recipe_id).unwrap_or_default(),
        })
        .collect())
}

/// Consolidated shopping list of the caller's cart.
pub async fn download_shopping_list(
    session: Option<SessionData>,
    pool: &Pool<Postgres>,
) -> Result<ShoppingList, Error> {
    let session = SessionData::require(session)?;
    let cart = list_cart_recipes(session.user_id, pool).await?;

    let owner = get_user_by_id(pool, session.user_id)
        .await?
        .map(|user| match user.first_name.trim() {
            "" => user.username,
            first_name => first_name.to_owned(),
        })
        .unwrap_or(session.username);

    let list = ShoppingList::new(&owner, &cart, Utc::now())?;
    log::trace!(
        "> shopping list of user {}: {} recipes, {} items",
        session.user_id,
        cart.len(),
        list.items.len()
    );
    Ok(list)
}
