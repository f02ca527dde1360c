mod common;

use std::collections::HashSet;

use sqlx::PgPool;

use foodgram_sdk::{
    actions::{
        recipes::{create_recipe, get_recipe_detail},
        relations::{add_relation, has_relation, remove_relation, Favorite, Follow, ShoppingCart},
        shopping::download_shopping_list,
        users::{fetch_subscriptions, get_profile},
    },
    error::HtmlError,
    pagination::PageRequest,
    schema::MeasurementUnit,
};

use common::*;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn favorite_round_trip_and_conflicts(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let cook = user(&pool, "cook_fav").await;
    let t = tag(&pool, "snack").await;
    let x = ingredient(&pool, "nuts", MeasurementUnit::G).await;
    let recipe = create_recipe(&cook, draft("Nuts", &[t], &[(x, 50)]), &blobs(&dir), &pool)
        .await
        .unwrap();

    add_relation::<Favorite>(Some(cook.clone()), recipe.id, &pool)
        .await
        .unwrap();
    assert!(has_relation::<Favorite>(cook.user_id, recipe.id, &pool).await.unwrap());
    assert!(!has_relation::<ShoppingCart>(cook.user_id, recipe.id, &pool).await.unwrap());

    let err = add_relation::<Favorite>(Some(cook.clone()), recipe.id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::Conflict);

    let detail = get_recipe_detail(Some(&cook), recipe.id, &pool).await.unwrap();
    assert!(detail.is_favorited);
    assert!(!detail.is_in_shopping_cart);

    remove_relation::<Favorite>(Some(cook.clone()), recipe.id, &pool)
        .await
        .unwrap();
    let err = remove_relation::<Favorite>(Some(cook.clone()), recipe.id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::Conflict);
    assert!(!has_relation::<Favorite>(cook.user_id, recipe.id, &pool).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_adds_succeed_once(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let cook = user(&pool, "cook_race").await;
    let t = tag(&pool, "race").await;
    let x = ingredient(&pool, "rice", MeasurementUnit::G).await;
    let recipe = create_recipe(&cook, draft("Rice", &[t], &[(x, 100)]), &blobs(&dir), &pool)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        add_relation::<ShoppingCart>(Some(cook.clone()), recipe.id, &pool),
        add_relation::<ShoppingCart>(Some(cook.clone()), recipe.id, &pool),
    );

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    let err = first.err().or(second.err()).unwrap();
    assert_eq!(err.kind, HtmlError::Conflict);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn anonymous_and_missing_objects(pool: PgPool) {
    let cook = user(&pool, "cook_anon").await;

    let err = add_relation::<Favorite>(None, 1, &pool).await.unwrap_err();
    assert_eq!(err.kind, HtmlError::Unauthorized);

    let err = add_relation::<Favorite>(Some(cook.clone()), 4242, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::NotFound);

    let err = add_relation::<Follow>(Some(cook.clone()), cook.user_id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::Validation);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn follows_show_up_in_subscriptions(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let blobs = blobs(&dir);
    let reader = user(&pool, "reader").await;
    let author = user(&pool, "author").await;
    let t = tag(&pool, "daily").await;
    let x = ingredient(&pool, "tea", MeasurementUnit::G).await;
    for name in ["Tea", "Iced tea", "Chai"] {
        create_recipe(&author, draft(name, &[t], &[(x, 5)]), &blobs, &pool)
            .await
            .unwrap();
    }

    add_relation::<Follow>(Some(reader.clone()), author.user_id, &pool)
        .await
        .unwrap();

    let profile = get_profile(Some(&reader), author.user_id, &pool).await.unwrap();
    assert!(profile.is_subscribed);

    let page = fetch_subscriptions(&reader, PageRequest::new(1, 6), Some(2), &pool)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].author.id, author.user_id);
    assert_eq!(page.results[0].recipes.len(), 2);
    assert_eq!(page.results[0].recipes_count, 3);
    assert_eq!(page.results[0].recipes[0].name, "Chai");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn shopping_list_merges_cart(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let blobs = blobs(&dir);
    let cook = user(&pool, "cook_cart").await;
    let t = tag(&pool, "bake").await;
    let flour = ingredient(&pool, "flour", MeasurementUnit::G).await;
    let egg = ingredient(&pool, "egg", MeasurementUnit::Piece).await;

    let err = download_shopping_list(Some(cook.clone()), &pool).await.unwrap_err();
    assert_eq!(err.kind, HtmlError::EmptyAggregation);

    let r1 = create_recipe(&cook, draft("Bread", &[t], &[(flour, 200)]), &blobs, &pool)
        .await
        .unwrap();
    let r2 = create_recipe(&cook, draft("Cake", &[t], &[(flour, 100), (egg, 2)]), &blobs, &pool)
        .await
        .unwrap();
    for id in [r1.id, r2.id] {
        add_relation::<ShoppingCart>(Some(cook.clone()), id, &pool)
            .await
            .unwrap();
    }

    let list = download_shopping_list(Some(cook.clone()), &pool).await.unwrap();
    let items: HashSet<(&str, MeasurementUnit, i64)> = list
        .items
        .iter()
        .map(|i| (i.name.as_str(), i.measurement_unit, i.total))
        .collect();
    assert_eq!(
        items,
        HashSet::from([("egg", MeasurementUnit::Piece, 2), ("flour", MeasurementUnit::G, 300)])
    );
    assert!(list.render().contains("flour: 300 g"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_catalog_ingredients_merge_by_name_and_unit(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let blobs = blobs(&dir);
    let cook = user(&pool, "cook_dupes").await;
    let t = tag(&pool, "dupes").await;
    let first = ingredient(&pool, "sugar", MeasurementUnit::G).await;
    let second = ingredient(&pool, "sugar", MeasurementUnit::G).await;
    let kilos = ingredient(&pool, "sugar", MeasurementUnit::Kg).await;
    assert_ne!(first, second);

    let r1 = create_recipe(&cook, draft("Jam", &[t], &[(first, 300), (kilos, 1)]), &blobs, &pool)
        .await
        .unwrap();
    let r2 = create_recipe(&cook, draft("Syrup", &[t], &[(second, 200)]), &blobs, &pool)
        .await
        .unwrap();
    for id in [r1.id, r2.id] {
        add_relation::<ShoppingCart>(Some(cook.clone()), id, &pool)
            .await
            .unwrap();
    }

    let list = download_shopping_list(Some(cook.clone()), &pool).await.unwrap();
    let totals: Vec<(MeasurementUnit, i64)> = list
        .items
        .iter()
        .map(|i| (i.measurement_unit, i.total))
        .collect();
    assert_eq!(list.items.len(), 2);
    assert!(totals.contains(&(MeasurementUnit::G, 500)));
    assert!(totals.contains(&(MeasurementUnit::Kg, 1)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleted_subject_is_an_invalid_session(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let cook = user(&pool, "cook_owner").await;
    let ghost = user(&pool, "cook_ghost").await;
    let t = tag(&pool, "ghost").await;
    let x = ingredient(&pool, "mint", MeasurementUnit::G).await;
    let recipe = create_recipe(&cook, draft("Mint tea", &[t], &[(x, 5)]), &blobs(&dir), &pool)
        .await
        .unwrap();

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(ghost.user_id)
        .execute(&pool)
        .await
        .unwrap();

    let err = add_relation::<Favorite>(Some(ghost.clone()), recipe.id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::InvalidSession);
    assert!(!err.info.contains("foreign key"));

    let err = remove_relation::<ShoppingCart>(Some(ghost.clone()), recipe.id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::InvalidSession);

    let err = add_relation::<Follow>(Some(ghost), cook.user_id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind, HtmlError::InvalidSession);
}
