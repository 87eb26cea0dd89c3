//! docstore walkthrough.
//!
//! Creates a `Movies` collection in memory, loads a JSON array of movies into
//! it, then runs the usual put / get / update / query / scan sequence and
//! prints what comes back.
//!
//! # Usage
//!
//! ```text
//! docstore-cli [path/to/moviedata.json]
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DOCSTORE_PAGE_SIZE` | `100` | Items per page for queries and scans |
//! | `DOCSTORE_REQUEST_TIMEOUT_MS` | `30000` | Per-call timeout, `0` disables |
//! | `DOCSTORE_WARN_UNUSED_PLACEHOLDERS` | `true` | Warn on unused map entries |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::path::PathBuf;

use anyhow::{Context, Result};
use docstore_core::prelude::*;
use docstore_model::{
    AttributeValue, CollectionDefinition, Item, ReturnValue, ScalarAttributeType,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const COLLECTION: &str = "Movies";

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

fn data_path() -> PathBuf {
    std::env::args_os().nth(1).map_or_else(
        || PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/moviedata.json"),
        PathBuf::from,
    )
}

fn print_item(label: &str, item: &Item) {
    println!("{label}:\n{}", item.to_json_pretty());
}

async fn create_movies(client: &DocumentClient) -> Result<Table> {
    let table = client
        .create_collection(
            CollectionDefinition::new(COLLECTION)
                .partition_key("year", ScalarAttributeType::N)
                .sort_key("title", ScalarAttributeType::S)
                .throughput(10, 10),
        )
        .await
        .context("failed to create the Movies collection")?;
    let description = client.describe_collection(COLLECTION).await?;
    info!(
        collection = %description.name,
        status = ?description.status,
        "collection ready"
    );
    Ok(table)
}

async fn load_movies(table: &Table) -> Result<usize> {
    let path = data_path();
    let mut source = JsonArraySource::from_path(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let loaded = bulk_load(table, &mut source)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    println!("Loaded {loaded} movies from {}", path.display());
    Ok(loaded)
}

fn new_movie_key() -> Key {
    Key::new()
        .with("year", 2015_i64)
        .with("title", "The Big New Movie")
}

async fn put_and_get(table: &Table) -> Result<()> {
    let info: std::collections::HashMap<String, AttributeValue> = [
        (
            "plot".to_owned(),
            AttributeValue::from("Nothing happens at all."),
        ),
        ("rating".to_owned(), AttributeValue::from(0_i64)),
    ]
    .into_iter()
    .collect();
    let movie = Item::new()
        .with("year", 2015_i64)
        .with("title", "The Big New Movie")
        .with("info", info);
    table
        .put_item(PutSpec::new(movie))
        .await
        .context("put of the new movie failed")?;
    println!("PutItem succeeded");

    let found = table
        .get_item(GetSpec::new(new_movie_key()))
        .await
        .context("get of the new movie failed")?;
    match found {
        Some(item) => print_item("GetItem succeeded", &item),
        None => println!("GetItem found nothing"),
    }
    Ok(())
}

async fn update_movie(table: &Table) -> Result<()> {
    let actors = AttributeValue::from(vec![
        AttributeValue::from("Larry"),
        AttributeValue::from("Moe"),
        AttributeValue::from("Curly"),
    ]);
    let updated = table
        .update_item(
            UpdateSpec::new(
                new_movie_key(),
                "set info.rating = :r, info.plot = :p, info.actors = :a",
            )
            .value(":r", 5.5_f64)
            .value(":p", "Everything happens all at once.")
            .value(":a", actors)
            .return_values(ReturnValue::UpdatedNew),
        )
        .await
        .context("update of the new movie failed")?;
    if let Some(item) = updated {
        print_item("UpdateItem succeeded", &item);
    }
    Ok(())
}

async fn movies_of_1985(table: &Table) -> Result<()> {
    println!("Movies from 1985");
    let mut movies = table
        .query(
            QuerySpec::new("#yr = :yyyy")
                .name("#yr", "year")
                .value(":yyyy", 1985_i64),
        )
        .await?;
    while let Some(item) = movies.next().await {
        let item = item?;
        println!("{} {}", item.get_int("year")?, item.get_string("title")?);
    }
    Ok(())
}

async fn movies_of_1992_a_to_l(table: &Table) -> Result<()> {
    println!("Movies from 1992 - titles A-L, with genres and lead actor");
    let mut movies = table
        .query(
            QuerySpec::new("#yr = :yyyy and title between :letter1 and :letter2")
                .projection("#yr, title, info.genres, info.actors[0]")
                .name("#yr", "year")
                .value(":yyyy", 1992_i64)
                .value(":letter1", "A")
                .value(":letter2", "L"),
        )
        .await?;
    while let Some(item) = movies.next().await {
        print_item("", &item?);
    }
    Ok(())
}

async fn movies_of_the_fifties(table: &Table) -> Result<()> {
    println!("Movies from 1950 to 1959");
    let mut movies = table
        .scan(
            ScanSpec::new()
                .filter("#yr between :start_yr and :end_yr")
                .projection("#yr, title, info.rating")
                .name("#yr", "year")
                .value(":start_yr", 1950_i64)
                .value(":end_yr", 1959_i64),
        )
        .await?;
    while let Some(item) = movies.next().await {
        let item = item?;
        println!("{} {}", item.get_int("year")?, item.get_string("title")?);
    }
    info!(
        pages = movies.pages_fetched(),
        scanned = movies.scanned_count(),
        "scan finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = DocStoreConfig::from_env();
    init_tracing(&config.log_level)?;

    info!(
        page_size = config.page_size,
        request_timeout_ms = config.request_timeout_ms,
        "starting docstore walkthrough"
    );

    let client = DocumentClient::in_memory(config);
    let table = create_movies(&client).await?;
    load_movies(&table).await?;
    put_and_get(&table).await?;
    update_movie(&table).await?;
    movies_of_1985(&table).await?;
    movies_of_1992_a_to_l(&table).await?;
    movies_of_the_fifties(&table).await?;

    Ok(())
}
