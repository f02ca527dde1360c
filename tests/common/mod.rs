#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use sqlx::PgPool;

use foodgram_sdk::{
    actions::{ingredients::create_ingredient, tags::create_tag, users::{register_user, NewUser}},
    draft::RecipeDraft,
    jwt::SessionData,
    schema::{Id, MeasurementUnit, NewIngredient, NewTag, UserRole},
    storage::FsBlobStore,
};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub fn png() -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(PNG))
}

pub fn admin() -> SessionData {
    SessionData {
        user_id: 0,
        username: String::from("admin"),
        role: UserRole::Admin,
        is_admin: true,
    }
}

pub async fn user(pool: &PgPool, username: &str) -> SessionData {
    let profile = register_user(
        &NewUser {
            email: format!("{username}@example.com"),
            username: username.to_owned(),
            first_name: String::new(),
            last_name: String::new(),
            password: String::from("correct-horse"),
        },
        pool,
    )
    .await
    .unwrap();

    SessionData {
        user_id: profile.id,
        username: profile.username,
        role: UserRole::User,
        is_admin: false,
    }
}

pub async fn tag(pool: &PgPool, slug: &str) -> Id {
    let tag = NewTag {
        name: slug.to_uppercase(),
        slug: slug.to_owned(),
        color: String::from("#AA3300"),
    };
    create_tag(&admin(), &tag, pool).await.unwrap().id
}

pub async fn ingredient(pool: &PgPool, name: &str, measurement_unit: MeasurementUnit) -> Id {
    let ingredient = NewIngredient {
        name: name.to_owned(),
        measurement_unit,
    };
    create_ingredient(&admin(), &ingredient, pool).await.unwrap().id
}

pub fn draft(name: &str, tags: &[Id], ingredients: &[(Id, i64)]) -> RecipeDraft {
    let mut draft = RecipeDraft::new()
        .name(name)
        .text("Mix everything.")
        .image(&png())
        .cooking_time(15);
    for id in tags {
        draft = draft.tag(*id);
    }
    for (id, amount) in ingredients {
        draft = draft.ingredient(*id, *amount);
    }
    draft
}

pub fn blobs(dir: &tempfile::TempDir) -> FsBlobStore {
    FsBlobStore::new(dir.path(), "/media/")
}

pub fn stored_files(dir: &tempfile::TempDir) -> usize {
    std::fs::read_dir(dir.path().join("recipes"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}
