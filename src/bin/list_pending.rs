use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use news_relay::config;
use news_relay::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print stored entries that still owe delivery to a channel"
)]
struct Args {
    /// Path to YAML config file (reads only `app.data_dir`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of pending entries to print
    #[arg(long, default_value_t = 20)]
    limit: i64,
}

fn flag(done: bool) -> &'static str {
    if done {
        "yes"
    } else {
        "no"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/news.db", cfg.app.resolved_data_dir()));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let total = db::count_entries(&pool).await?;
    let pending = db::count_pending(&pool).await?;
    println!("entries: {} total, {} pending", total, pending);

    for entry in db::select_pending(&pool, args.limit).await? {
        println!(
            "[tg:{} vk:{}] {}\n    {}",
            flag(entry.posted_tg),
            flag(entry.posted_vk),
            entry.title,
            entry.url
        );
    }
    Ok(())
}
