use super::model::{NewEntry, PendingEntry, StoredEntry};
use crate::model::ChannelKind;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. Leaves in-memory URLs
/// untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert a first sighting. An existing row with the same id is left
/// untouched; returns whether a new row was created.
#[instrument(skip_all, fields(id = entry.id))]
pub async fn upsert_if_absent(pool: &Pool, entry: &NewEntry<'_>) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO entries (id, url, title, published) VALUES (?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
    )
    .bind(entry.id)
    .bind(entry.url)
    .bind(entry.title)
    .bind(entry.published)
    .execute(pool)
    .await
    .context("failed to insert entry")?;
    Ok(res.rows_affected() == 1)
}

/// Entries still owed to at least one channel, newest insertion first.
#[instrument(skip_all)]
pub async fn select_pending(pool: &Pool, limit: i64) -> Result<Vec<PendingEntry>> {
    let rows = sqlx::query(
        "SELECT id, url, title, posted_tg, posted_vk FROM entries \
         WHERE posted_tg = 0 OR posted_vk = 0 \
         ORDER BY rowid DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let entries = rows
        .into_iter()
        .map(|row| PendingEntry {
            id: row.get("id"),
            url: row.get("url"),
            title: row.get("title"),
            posted_tg: row.get("posted_tg"),
            posted_vk: row.get("posted_vk"),
        })
        .collect();
    Ok(entries)
}

/// Set one channel's flag. Unknown ids are a no-op; returns whether a row
/// changed.
#[instrument(skip_all, fields(id = %id, channel = %channel))]
pub async fn mark_delivered(pool: &Pool, id: &str, channel: ChannelKind) -> Result<bool> {
    let sql = format!(
        "UPDATE entries SET {} = 1 WHERE id = ?",
        channel.flag_column()
    );
    let res = sqlx::query(&sql)
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to record {} delivery", channel))?;
    Ok(res.rows_affected() == 1)
}

pub async fn fetch_entry(pool: &Pool, id: &str) -> Result<Option<StoredEntry>> {
    let row = sqlx::query(
        "SELECT id, url, title, published, posted_tg, posted_vk FROM entries WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(stored_from_row))
}

pub async fn count_entries(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_pending(pool: &Pool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE posted_tg = 0 OR posted_vk = 0")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

fn stored_from_row(row: SqliteRow) -> StoredEntry {
    StoredEntry {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        published: row.get("published"),
        posted_tg: row.get("posted_tg"),
        posted_vk: row.get("posted_vk"),
    }
}
