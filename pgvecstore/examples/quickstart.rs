//! Quick start example for pgvecstore.
//!
//! Needs a PostgreSQL database with pgvector available:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/vectors cargo run --example quickstart
//! ```

use pgvecstore::prelude::*;
use rand::Rng;
use sqlx::postgres::PgPoolOptions;

const DIMENSION: u32 = 8;

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/vectors".to_string());
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    let store = VectorStore::new(pool, StoreConfig::default())?;

    store
        .create_index(CreateIndexParams::new("quickstart", DIMENSION).with_full_text("english"))
        .await?;

    let documents = [
        ("rust-intro", "Introduction to Rust programming", "rust"),
        ("rust-patterns", "Advanced Rust patterns and idioms", "rust"),
        ("py-data", "Python for data science", "python"),
        ("ml-basics", "Machine learning fundamentals", "ml"),
        ("rust-systems", "Systems programming with Rust", "rust"),
    ];

    let mut rng = rand::thread_rng();
    let vectors: Vec<Vector> = documents
        .iter()
        .map(|_| {
            (0..DIMENSION)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect::<Vec<f32>>()
                .into()
        })
        .collect();
    let query = vectors[0].clone();

    println!("Inserting {} documents...", documents.len());
    store
        .upsert(
            "quickstart",
            UpsertParams::new(vectors)
                .with_ids(documents.iter().map(|(id, _, _)| *id).collect())
                .with_metadata(
                    documents
                        .iter()
                        .map(|(_, title, topic)| {
                            Payload::new().with_field("title", *title).with_field("topic", *topic)
                        })
                        .collect(),
                )
                .with_documents(documents.iter().map(|(_, title, _)| *title).collect()),
        )
        .await?;

    let described = store.describe_index("quickstart").await?;
    println!("Index holds {} vectors\n", described.count);

    println!("Vector search:");
    let hits = store
        .query("quickstart", QueryParams::new(query.clone()).with_top_k(3))
        .await?;
    print_hits(&hits);

    println!("Vector search, topic = rust:");
    let hits = store
        .query(
            "quickstart",
            QueryParams::new(query.clone())
                .with_top_k(3)
                .with_filter(Filter::field("topic").eq("rust")),
        )
        .await?;
    print_hits(&hits);

    println!("Text search for 'rust programming':");
    let hits = store
        .query("quickstart", QueryParams::text("rust programming").with_top_k(3))
        .await?;
    print_hits(&hits);

    println!("Hybrid search:");
    let hits = store
        .query(
            "quickstart",
            QueryParams::hybrid(query, "systems", HybridConfig::default()).with_top_k(3),
        )
        .await?;
    print_hits(&hits);

    store.delete_index("quickstart").await?;
    store.disconnect().await;
    Ok(())
}

fn print_hits(hits: &[QueryResult]) {
    for (rank, hit) in hits.iter().enumerate() {
        let title = hit.metadata.get_str("title").unwrap_or("Unknown");
        println!("  {}. [{}] {} (score: {:.4})", rank + 1, hit.id, title, hit.score);
    }
    println!();
}
