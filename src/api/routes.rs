use std::{convert::Infallible, sync::Arc};

use serde::de::DeserializeOwned;
use warp::{filters::BoxedFilter, reply::Response, Filter, Reply};

use crate::{constants::MAX_BODY_SIZE, jwt::SessionData, middleware::with_possible_session, schema::Id};

use super::{handlers, rejection::handle_rejection, AppState};

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn with_session(
    state: &AppState,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    with_possible_session(state.keys.clone())
}

/// The raw query string; empty when the request has none.
fn with_query() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
}

fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

fn user_routes(state: &Arc<AppState>) -> BoxedFilter<(Response,)> {
    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::register);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::login);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::set_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_query())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::subscriptions);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(with_query())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::unsubscribe);

    let profile = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::user_profile);

    register
        .or(login)
        .unify()
        .or(me)
        .unify()
        .or(set_password)
        .unify()
        .or(subscriptions)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .or(profile)
        .unify()
        .boxed()
}

fn tag_routes(state: &Arc<AppState>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_tags);

    let create = warp::path!("tags")
        .and(warp::post())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::create_tag);

    let get = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_tag);

    let update = warp::path!("tags" / Id)
        .and(warp::put().or(warp::patch()).unify())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::update_tag);

    let delete = warp::path!("tags" / Id)
        .and(warp::delete())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_tag);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .boxed()
}

fn ingredient_routes(state: &Arc<AppState>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("ingredients")
        .and(warp::get())
        .and(with_query())
        .and(with_state(state.clone()))
        .and_then(handlers::list_ingredients);

    let create = warp::path!("ingredients")
        .and(warp::post())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::create_ingredient);

    let get = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_ingredient);

    let update = warp::path!("ingredients" / Id)
        .and(warp::put().or(warp::patch()).unify())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::update_ingredient);

    let delete = warp::path!("ingredients" / Id)
        .and(warp::delete())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_ingredient);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .boxed()
}

fn recipe_routes(state: &Arc<AppState>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_query())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::create_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::download_shopping_cart);

    let get = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::get_recipe);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(json_body())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_recipe);

    let favorite = warp::path!("recipes" / Id / "favorite")
        .and(warp::post())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::add_favorite);

    let unfavorite = warp::path!("recipes" / Id / "favorite")
        .and(warp::delete())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::remove_favorite);

    let add_to_cart = warp::path!("recipes" / Id / "shopping_cart")
        .and(warp::post())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::add_to_cart);

    let remove_from_cart = warp::path!("recipes" / Id / "shopping_cart")
        .and(warp::delete())
        .and(with_session(state))
        .and(with_state(state.clone()))
        .and_then(handlers::remove_from_cart);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(favorite)
        .unify()
        .or(unfavorite)
        .unify()
        .or(add_to_cart)
        .unify()
        .or(remove_from_cart)
        .unify()
        .boxed()
}

/// Every route of the service, with rejections turned into JSON errors.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = warp::path("api").and(
        user_routes(&state)
            .or(tag_routes(&state))
            .unify()
            .or(ingredient_routes(&state))
            .unify()
            .or(recipe_routes(&state))
            .unify(),
    );

    let media = warp::path("media").and(warp::fs::dir(state.blobs.root().to_path_buf()));

    api.or(media.map(|file: warp::fs::File| file.into_response()))
        .unify()
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use warp::http::StatusCode;

    use super::*;
    use crate::{
        jwt::{generate_jwt_session, SessionKeys},
        schema::{User, UserRole},
        storage::FsBlobStore,
    };

    fn state() -> Arc<AppState> {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let keys = SessionKeys::new("test-secret", Duration::hours(1)).unwrap();
        AppState::new(pool, keys, FsBlobStore::new(std::env::temp_dir(), "/media/"))
    }

    fn token(state: &AppState) -> String {
        let user = User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook7"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            role: UserRole::User,
        };
        generate_jwt_session(&user, &state.keys).unwrap()
    }

    fn body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn toggles_require_a_session() {
        let routes = routes(state());

        for (method, path) in [
            ("POST", "/api/recipes/1/favorite/"),
            ("DELETE", "/api/recipes/1/shopping_cart/"),
            ("POST", "/api/users/2/subscribe/"),
        ] {
            let response = warp::test::request()
                .method(method)
                .path(path)
                .reply(&routes)
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {path}");
        }
    }

    #[tokio::test]
    async fn subscribe_checks_the_session_before_the_query() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/users/2/subscribe/?recipes_limit=abc")
            .reply(&routes(state()))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn download_requires_a_session() {
        let response = warp::test::request()
            .path("/api/recipes/download_shopping_cart/")
            .reply(&routes(state()))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let state = state();
        let token = token(&state);
        let response = warp::test::request()
            .method("POST")
            .path("/api/users/7/subscribe/")
            .header("authorization", format!("Token {token}"))
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(response.body())["errors"]["author"].is_array());
    }

    #[tokio::test]
    async fn invalid_recipe_reports_every_field() {
        let state = state();
        let token = token(&state);
        let response = warp::test::request()
            .method("POST")
            .path("/api/recipes/")
            .header("authorization", format!("Bearer {token}"))
            .json(&serde_json::json!({ "tags": [1, 1], "cooking_time": 0 }))
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let errors = &body(response.body())["errors"];
        for field in ["name", "text", "image", "cooking_time", "tags", "ingredients"] {
            assert!(errors[field].is_array(), "{field}");
        }
    }

    #[tokio::test]
    async fn catalog_writes_need_admin() {
        let state = state();
        let token = token(&state);
        let response = warp::test::request()
            .method("POST")
            .path("/api/tags/")
            .header("cookie", format!("session={token}"))
            .json(&serde_json::json!({ "name": "Lunch", "slug": "lunch", "color": "#FFAA00" }))
            .reply(&routes(state))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/token/login/")
            .header("content-type", "application/json")
            .body("{\"email\":")
            .reply(&routes(state()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = warp::test::request()
            .path("/api/nothing/here/")
            .reply(&routes(state()))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body(response.body())["detail"].is_string());
    }
}
