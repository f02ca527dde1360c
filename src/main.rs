use std::{env, error::Error, process};

use chrono::Duration;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use foodgram_sdk::{
    actions::ingredients::import_ingredients,
    api::{self, AppState},
    config::Config,
    import::parse_ingredients,
    jwt::SessionKeys,
    storage::FsBlobStore,
};

const USAGE: &str = "Usage: foodgram [serve | load-ingredients <file.csv>]";

async fn connect(config: &Config) -> Result<Pool<Postgres>, Box<dyn Error>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

async fn serve(config: Config) -> Result<(), Box<dyn Error>> {
    let pool = connect(&config).await?;
    let keys = SessionKeys::new(&config.jwt_secret, Duration::hours(config.session_hours))?;
    let blobs = FsBlobStore::new(config.media_root.clone(), &config.media_url);
    tokio::fs::create_dir_all(blobs.root()).await?;

    let state = AppState::new(pool, keys, blobs);

    log::info!("Listening on {}", config.address);
    warp::serve(api::routes(state)).run(config.address).await;
    Ok(())
}

async fn load_ingredients(config: Config, path: &str) -> Result<(), Box<dyn Error>> {
    let data = tokio::fs::read_to_string(path).await?;
    let ingredients = parse_ingredients(&data)?;
    log::info!("Read {} ingredients from {path}", ingredients.len());

    let pool = connect(&config).await?;
    import_ingredients(&ingredients, &pool).await?;
    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let args: Vec<String> = env::args().skip(1).collect();

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["serve"] => serve(config).await,
        ["load-ingredients", path] => load_ingredients(config, path).await,
        _ => Err(USAGE.into()),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{e}");
        process::exit(1);
    }
}
