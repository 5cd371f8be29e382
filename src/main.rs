use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use news_relay::channels::{Channel, TelegramChannel, VkChannel};
use news_relay::config;
use news_relay::db;
use news_relay::feeds::HttpFeeds;
use news_relay::pipeline::{Coordinator, RunSettings};
use news_relay::preview::{self, HttpPreview, NoPreview, PreviewSource};
use news_relay::rewrite::OpenRouterClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch news feeds once and publish fresh digests to Telegram and VK"
)]
struct Args {
    /// Path to YAML config file (defaults to ./config.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;
    cfg.ensure_dirs()?;

    let data_dir = cfg.app.resolved_data_dir();
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/news.db", data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let timeout = Duration::from_secs(cfg.app.request_timeout_secs);
    let http = reqwest::Client::builder()
        .user_agent(concat!("news-relay/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;

    let feeds = HttpFeeds::from_config(http.clone(), &cfg);
    let rewriter = OpenRouterClient::from_config(http.clone(), &cfg.rewrite)?;
    if !rewriter.has_credential() {
        warn!("OPENROUTER_API_KEY is not set; entries will be merged but not published");
    }

    let preview: Box<dyn PreviewSource> = match preview::ensure_ffmpeg_available().await {
        Ok(()) => Box::new(HttpPreview::new(
            http.clone(),
            &data_dir,
            cfg.preview.max_width,
        )),
        Err(err) => {
            warn!(?err, "posting without preview images");
            Box::new(NoPreview)
        }
    };

    let telegram = TelegramChannel::from_config(&cfg.telegram, timeout)?;
    let vk = VkChannel::from_config(http.clone(), &cfg.vk)?;
    info!(
        telegram = telegram.is_configured(),
        vk = vk.is_configured(),
        database_url = %database_url,
        "starting run"
    );

    let coordinator = Coordinator::new(
        &pool,
        RunSettings::from_config(&cfg),
        &feeds,
        &rewriter,
        preview.as_ref(),
        vec![&telegram as &dyn Channel, &vk],
    );
    let report = coordinator.run_once().await?;
    info!(?report, "finished");
    Ok(())
}
