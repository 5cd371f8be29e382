use news_relay::db;
use news_relay::ingest::merge_candidates;
use news_relay::model::{entry_id, Candidate, ChannelKind};
use news_relay::selector::Selector;
use sqlx::sqlite::SqlitePoolOptions;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn candidate(url: &str, title: &str) -> Candidate {
    Candidate {
        url: url.into(),
        title: title.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn duplicates_within_a_batch_collapse_to_one_row() {
    let pool = setup_pool().await;
    let batch = vec![
        candidate("https://a.example/1", "first"),
        candidate("  https://a.example/1 ", "first again"),
        candidate("", "no link"),
        candidate("https://a.example/2", "second"),
    ];

    let stats = merge_candidates(&pool, &batch).await.unwrap();
    assert_eq!(stats.seen, 3);
    assert_eq!(stats.inserted, 2);
    assert_eq!(db::count_entries(&pool).await.unwrap(), 2);

    let stored = db::fetch_entry(&pool, &entry_id("https://a.example/1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "first");
    assert_eq!(stored.url, "https://a.example/1");
}

#[tokio::test]
async fn merging_never_resets_delivery_flags() {
    let pool = setup_pool().await;
    let batch = vec![candidate("https://a.example/1", "first")];
    merge_candidates(&pool, &batch).await.unwrap();

    let id = entry_id("https://a.example/1");
    db::mark_delivered(&pool, &id, ChannelKind::Vk).await.unwrap();

    let stats = merge_candidates(&pool, &batch).await.unwrap();
    assert_eq!(stats.inserted, 0);

    let stored = db::fetch_entry(&pool, &id).await.unwrap().unwrap();
    assert!(!stored.posted_tg);
    assert!(stored.posted_vk);

    let pending = Selector::new(10).pending(&pool).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending_channels(), vec![ChannelKind::Telegram]);
}

#[tokio::test]
async fn selector_window_bounds_the_scan() {
    let pool = setup_pool().await;
    let batch: Vec<Candidate> = (0..6)
        .map(|n| candidate(&format!("https://a.example/{}", n), "t"))
        .collect();
    merge_candidates(&pool, &batch).await.unwrap();

    let selector = Selector::new(4);
    let first = selector.pending(&pool).await.unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(first[0].url, "https://a.example/5");
    assert_eq!(selector.pending(&pool).await.unwrap(), first);
}
