use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::{
    http::StatusCode,
    reject::Rejection,
    reply::{self, Reply, Response},
};

use crate::{
    actions::{
        ingredients, recipes,
        recipes::RecipeFilter,
        relations::{add_relation, remove_relation, Favorite, Follow, Relation, ShoppingCart},
        shopping::download_shopping_list,
        tags,
        users::{self, NewUser},
    },
    constants::{RECIPE_COUNT_PER_PAGE, SUBSCRIPTION_COUNT_PER_PAGE},
    draft::RecipeDraft,
    error::HtmlError,
    form::QueryParams,
    jwt::SessionData,
    pagination::PageRequest,
    schema::{Id, NewIngredient, NewTag},
    shopping_list::shopping_list_filename,
};

use super::AppState;

fn json<T: Serialize>(value: &T) -> Response {
    reply::json(value).into_response()
}

fn created<T: Serialize>(value: &T) -> Response {
    reply::with_status(reply::json(value), StatusCode::CREATED).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    auth_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

pub async fn register(user: NewUser, state: Arc<AppState>) -> Result<Response, Rejection> {
    let profile = users::register_user(&user, &state.pool).await?;
    Ok(created(&profile))
}

pub async fn login(login: LoginRequest, state: Arc<AppState>) -> Result<Response, Rejection> {
    let auth_token =
        users::login_user(&login.email, &login.password, &state.keys, &state.pool).await?;
    Ok(json(&LoginResponse { auth_token }))
}

pub async fn me(session: Option<SessionData>, state: Arc<AppState>) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let profile = users::get_profile(Some(&session), session.user_id, &state.pool).await?;
    Ok(json(&profile))
}

pub async fn set_password(
    change: PasswordChange,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    users::set_password(
        &session,
        &change.current_password,
        &change.new_password,
        &state.pool,
    )
    .await?;
    Ok(no_content())
}

pub async fn user_profile(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let profile = users::get_profile(session.as_ref(), id, &state.pool).await?;
    Ok(json(&profile))
}

pub async fn subscriptions(
    query: String,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let query = QueryParams::parse(&query)?;
    let request = PageRequest::from_query(&query, SUBSCRIPTION_COUNT_PER_PAGE)?;
    let recipes_limit = query.get_number("recipes_limit")?;

    let page = users::fetch_subscriptions(&session, request, recipes_limit, &state.pool).await?;
    Ok(json(&page))
}

pub async fn subscribe(
    author_id: Id,
    query: String,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let query = QueryParams::parse(&query)?;
    let recipes_limit = query.get_number("recipes_limit")?;

    let session = add_relation::<Follow>(Some(session), author_id, &state.pool).await?;
    let subscription =
        users::get_subscription(&session, author_id, recipes_limit, &state.pool).await?;
    Ok(created(&subscription))
}

pub async fn unsubscribe(
    author_id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    remove_relation::<Follow>(session, author_id, &state.pool).await?;
    Ok(no_content())
}

pub async fn list_tags(state: Arc<AppState>) -> Result<Response, Rejection> {
    let list = tags::list_tags(&state.pool).await?;
    Ok(json(&list))
}

pub async fn get_tag(id: Id, state: Arc<AppState>) -> Result<Response, Rejection> {
    let tag = tags::get_tag(id, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No tag exists with specified id"))?;
    Ok(json(&tag))
}

pub async fn create_tag(
    tag: NewTag,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let tag = tags::create_tag(&session, &tag, &state.pool).await?;
    Ok(created(&tag))
}

pub async fn update_tag(
    id: Id,
    tag: NewTag,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let tag = tags::update_tag(&session, id, &tag, &state.pool).await?;
    Ok(json(&tag))
}

pub async fn delete_tag(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    tags::delete_tag(&session, id, &state.pool).await?;
    Ok(no_content())
}

pub async fn list_ingredients(query: String, state: Arc<AppState>) -> Result<Response, Rejection> {
    let query = QueryParams::parse(&query)?;
    let list = ingredients::fetch_ingredients(query.get_str("name"), &state.pool).await?;
    Ok(json(&list))
}

pub async fn get_ingredient(id: Id, state: Arc<AppState>) -> Result<Response, Rejection> {
    let ingredient = ingredients::get_ingredient(id, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No ingredient exists with specified id"))?;
    Ok(json(&ingredient))
}

pub async fn create_ingredient(
    ingredient: NewIngredient,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let ingredient = ingredients::create_ingredient(&session, &ingredient, &state.pool).await?;
    Ok(created(&ingredient))
}

pub async fn update_ingredient(
    id: Id,
    ingredient: NewIngredient,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let ingredient = ingredients::update_ingredient(&session, id, &ingredient, &state.pool).await?;
    Ok(json(&ingredient))
}

pub async fn delete_ingredient(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    ingredients::delete_ingredient(&session, id, &state.pool).await?;
    Ok(no_content())
}

pub async fn list_recipes(
    query: String,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let query = QueryParams::parse(&query)?;
    let request = PageRequest::from_query(&query, RECIPE_COUNT_PER_PAGE)?;
    let filter = RecipeFilter::from_query(&query)?;

    let page = recipes::fetch_recipes(session.as_ref(), &filter, request, &state.pool).await?;
    Ok(json(&page))
}

pub async fn get_recipe(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let recipe = recipes::get_recipe_detail(session.as_ref(), id, &state.pool).await?;
    Ok(json(&recipe))
}

pub async fn create_recipe(
    draft: RecipeDraft,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let recipe = recipes::create_recipe(&session, draft, &state.blobs, &state.pool).await?;
    Ok(created(&recipe))
}

pub async fn update_recipe(
    id: Id,
    draft: RecipeDraft,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    let recipe = recipes::update_recipe(&session, id, draft, &state.blobs, &state.pool).await?;
    Ok(json(&recipe))
}

pub async fn delete_recipe(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let session = SessionData::require(session)?;
    recipes::delete_recipe(&session, id, &state.blobs, &state.pool).await?;
    Ok(no_content())
}

async fn add_recipe_relation<R: Relation>(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    add_relation::<R>(session, id, &state.pool).await?;
    let recipe = recipes::get_recipe_short(id, &state.pool).await?;
    Ok(created(&recipe))
}

async fn remove_recipe_relation<R: Relation>(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    remove_relation::<R>(session, id, &state.pool).await?;
    Ok(no_content())
}

pub async fn add_favorite(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    add_recipe_relation::<Favorite>(id, session, state).await
}

pub async fn remove_favorite(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    remove_recipe_relation::<Favorite>(id, session, state).await
}

pub async fn add_to_cart(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    add_recipe_relation::<ShoppingCart>(id, session, state).await
}

pub async fn remove_from_cart(
    id: Id,
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    remove_recipe_relation::<ShoppingCart>(id, session, state).await
}

pub async fn download_shopping_cart(
    session: Option<SessionData>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let username = session.as_ref().map(|s| s.username.clone()).unwrap_or_default();
    let list = download_shopping_list(session, &state.pool).await?;

    let reply = reply::with_header(list.render(), "Content-Type", "text/plain; charset=utf-8");
    let reply = reply::with_header(
        reply,
        "Content-Disposition",
        format!("attachment; filename={}", shopping_list_filename(&username)),
    );
    Ok(reply.into_response())
}
