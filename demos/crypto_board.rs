//! A small crypto dashboard wired through the global store.
//!
//! Run it twice: the second run picks up the comment persisted by the first.
//!
//! ```sh
//! cargo run --example crypto_board
//! ```

use std::time::Duration;

use cupboard::{global, BackendKind, Config, Declaration, ListOptions, Value};

async fn fetch_quotes() -> Value {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Value::object([
        ("btc", Value::from(64012.5)),
        ("eth", Value::from(3120.25)),
    ])
}

#[tokio::main]
async fn main() -> cupboard::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let path = std::env::temp_dir().join("cupboard-demo").join("board.json");
    let store = global::configure(Config {
        backend: BackendKind::Text,
        namespace: Some("/crypto-board".into()),
        text_path: Some(path.clone()),
        ..Config::default()
    })?;

    let crypto = store.group("crypto")?;
    crypto.create("data", Declaration::async_producer(fetch_quotes))?;
    crypto.create("comment", Declaration::value("").persist(true))?;
    store.create("ui_theme", Declaration::value("dark").persist(true))?;

    let quotes = crypto.read("data", || println!("quotes updated"))?;
    let comment = crypto.read("comment", || println!("comment updated"))?;

    println!("quotes ready: {}", quotes.is_ready());
    let (previous, set_comment, _) = comment.parts();
    println!("previous comment: {previous:?}");

    let latest = global::store().get("crypto_data")?.await;
    println!("quotes: {latest:?}");

    let btc = latest.get("btc").and_then(Value::as_f64).unwrap_or_default();
    set_comment.set(format!("btc at {btc:.2}"));
    println!("comment: {:?}", comment.value());

    println!("entries in crypto: {:?}", crypto.list(ListOptions::default())?);
    println!("persisted: {:?}", store.list_persisted_keys().await?);
    println!("table file: {}", path.display());

    store.settle().await;
    Ok(())
}
