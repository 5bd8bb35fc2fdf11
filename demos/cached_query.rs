//! Cached SQLite queries
//!
//! Seeds a throwaway database, then fetches users through a pipeline: the
//! first call opens a connection, the second is served from the cache, and a
//! query against a missing table exhausts its retries.
//!
//! Run with: cargo run --example cached_query --features sqlite

use std::time::Instant;

use querywell::sqlite::{execute, query_args, transactional, SqliteConnector};
use querywell::{Args, PipelineConfig, QueryPipeline, Value};
use rusqlite::Connection;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("users.db");
    seed(&path)?;

    let config = PipelineConfig {
        location: path.to_string_lossy().into_owned(),
        retries: 3,
        delay_ms: 200,
        jitter: None,
    };
    let fetch_users = QueryPipeline::from_config(&config, SqliteConnector, query_args)?;

    let adults = Args::query("SELECT name, email FROM users WHERE age >= ?").arg(18);

    tracing::info!("first call");
    let users = fetch_users.call(&adults)?;
    for row in &users {
        println!("  {}", join(row));
    }

    tracing::info!("second call");
    let again = fetch_users.call(&adults)?;
    assert_eq!(users, again);

    let stats = fetch_users.stats();
    println!(
        "cache: {} hit(s), {} miss(es), hit rate {:.0}%",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );

    tracing::info!("query against a missing table");
    let started = Instant::now();
    match fetch_users.call(&Args::query("SELECT * FROM orders")) {
        Ok(rows) => println!("unexpected rows: {:?}", rows),
        Err(e) => println!(
            "failed after {} attempt(s) in {:?}: {}",
            e.attempts(),
            started.elapsed(),
            e
        ),
    }

    Ok(())
}

fn seed(path: &std::path::Path) -> Result<(), rusqlite::Error> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT, age INTEGER)",
    )?;
    transactional(&mut conn, |tx| {
        for (name, email, age) in [
            ("alice", "alice@example.com", 31),
            ("bob", "bob@example.com", 17),
            ("carol", "carol@example.com", 45),
        ] {
            execute(
                tx,
                "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
                &[Value::from(name), Value::from(email), Value::from(age)],
            )?;
        }
        Ok::<_, rusqlite::Error>(())
    })
}

fn join(row: &[Value]) -> String {
    row.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}
