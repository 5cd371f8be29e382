//! Best-effort preview images: find the page's Open Graph image, download it
//! and re-encode it as a width-capped JPEG with `ffmpeg`.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const BROWSER_UA: &str = "Mozilla/5.0";

static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static OG_IMAGE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:property|name)\s*=\s*["']og:image["']"#).unwrap());
static CONTENT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Page URL → encoded preview. Never fails: every problem means "no image".
#[async_trait]
pub trait PreviewSource: Send + Sync {
    async fn fetch(&self, page_url: &str) -> Option<Vec<u8>>;
}

/// Preview source that never finds an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreview;

#[async_trait]
impl PreviewSource for NoPreview {
    async fn fetch(&self, _page_url: &str) -> Option<Vec<u8>> {
        None
    }
}

pub struct HttpPreview {
    http: Client,
    work_dir: PathBuf,
    max_width: u32,
}

impl HttpPreview {
    /// Scratch files live under `{data_dir}/media/previews/`.
    pub fn new(http: Client, data_dir: &str, max_width: u32) -> Self {
        Self {
            http,
            work_dir: Path::new(data_dir).join("media").join("previews"),
            max_width,
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let res = self
            .http
            .get(url)
            .header("User-Agent", BROWSER_UA)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;
        if !res.status().is_success() {
            return Err(anyhow!("{} returned {}", url, res.status()));
        }
        Ok(res.bytes().await?.to_vec())
    }

    async fn try_fetch(&self, page_url: &str) -> Result<Option<Vec<u8>>> {
        let page = self.get_bytes(page_url).await?;
        let html = String::from_utf8_lossy(&page);
        let Some(image_url) = extract_og_image(&html) else {
            debug!(%page_url, "no og:image");
            return Ok(None);
        };
        let original = self.get_bytes(&image_url).await?;
        let resized = resize_jpeg(&original, &self.work_dir, self.max_width).await?;
        Ok(Some(resized))
    }
}

#[async_trait]
impl PreviewSource for HttpPreview {
    #[instrument(skip_all, fields(page_url = %page_url))]
    async fn fetch(&self, page_url: &str) -> Option<Vec<u8>> {
        match self.try_fetch(page_url).await {
            Ok(image) => image,
            Err(err) => {
                warn!(?err, "preview image unavailable");
                None
            }
        }
    }
}

/// Find the `og:image` URL in a page, accepting either `property` or `name`
/// and either attribute order. Protocol-relative URLs become `https:`.
pub fn extract_og_image(html: &str) -> Option<String> {
    META_TAG
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| OG_IMAGE_KEY.is_match(tag))
        .find_map(|tag| {
            let caps = CONTENT_ATTR.captures(tag)?;
            let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
            if raw.is_empty() {
                return None;
            }
            let url = raw.replace("&amp;", "&");
            Some(match url.strip_prefix("//") {
                Some(rest) => format!("https://{}", rest),
                None => url,
            })
        })
}

/// Ensure the `ffmpeg` binary is available on PATH.
pub async fn ensure_ffmpeg_available() -> Result<()> {
    let status = Command::new("ffmpeg")
        .arg("-version")
        .kill_on_drop(true)
        .status()
        .await;
    match status {
        Ok(s) if s.success() => Ok(()),
        Ok(s) => Err(anyhow!("ffmpeg not available (exit status {})", s)),
        Err(e) => Err(anyhow!("ffmpeg not available: {}", e)),
    }
}

/// Re-encode an image as JPEG no wider than `max_width`, keeping the aspect
/// ratio and never upscaling.
pub async fn resize_jpeg(original: &[u8], work_dir: &Path, max_width: u32) -> Result<Vec<u8>> {
    tokio::fs::create_dir_all(work_dir)
        .await
        .with_context(|| format!("failed to create preview dir: {}", work_dir.display()))?;

    let stem = uuid::Uuid::new_v4().to_string();
    let src_path = work_dir.join(format!("{}.src", stem));
    let out_path = work_dir.join(format!("{}.jpg", stem));
    tokio::fs::write(&src_path, original)
        .await
        .with_context(|| format!("failed to write {}", src_path.display()))?;

    let result = run_ffmpeg(&src_path, &out_path, max_width).await;
    let bytes = match result {
        Ok(()) => tokio::fs::read(&out_path)
            .await
            .with_context(|| format!("failed to read {}", out_path.display())),
        Err(err) => Err(err),
    };

    let _ = tokio::fs::remove_file(&src_path).await;
    let _ = tokio::fs::remove_file(&out_path).await;
    bytes
}

async fn run_ffmpeg(src: &Path, out: &Path, max_width: u32) -> Result<()> {
    // Width capped at max_width, height follows (rounded to even), Lanczos
    // scaling, q:v 3 is roughly JPEG quality 85.
    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(src.as_os_str())
        .arg("-frames:v")
        .arg("1")
        .arg("-vf")
        .arg(scale_filter(max_width))
        .arg("-q:v")
        .arg("3")
        .arg(out.as_os_str())
        .kill_on_drop(true)
        .status()
        .await
        .context("failed to spawn ffmpeg")?;

    if !status.success() {
        return Err(anyhow!("ffmpeg exited with status {}", status));
    }
    Ok(())
}

fn scale_filter(max_width: u32) -> String {
    format!("scale=min({}\\,iw):-2:flags=lanczos", max_width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_property_og_image() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta property="og:title" content="Title">
            <meta property="og:image" content="https://cdn.example/a.jpg?w=1&amp;h=2" />
        </head></html>"#;
        assert_eq!(
            extract_og_image(html).as_deref(),
            Some("https://cdn.example/a.jpg?w=1&h=2")
        );
    }

    #[test]
    fn finds_name_og_image_with_reversed_attributes() {
        let html = r#"<META content='//cdn.example/b.png' name='og:image'>"#;
        assert_eq!(
            extract_og_image(html).as_deref(),
            Some("https://cdn.example/b.png")
        );
    }

    #[test]
    fn ignores_similar_keys_and_empty_content() {
        let html = r#"
            <meta property="og:image:width" content="1200">
            <meta property="og:image" content="  ">
            <meta name="twitter:image" content="https://cdn.example/t.jpg">"#;
        assert_eq!(extract_og_image(html), None);
    }

    #[test]
    fn scale_filter_caps_width() {
        assert_eq!(scale_filter(1280), "scale=min(1280\\,iw):-2:flags=lanczos");
    }

    #[tokio::test]
    async fn no_preview_is_always_absent() {
        assert!(NoPreview.fetch("https://x/a").await.is_none());
    }

    #[tokio::test]
    async fn resize_rejects_non_images() {
        if ensure_ffmpeg_available().await.is_err() {
            return;
        }
        let td = tempfile::tempdir().unwrap();
        let res = resize_jpeg(b"definitely not an image", td.path(), 1280).await;
        assert!(res.is_err());
        // scratch files are cleaned up either way
        let leftovers = std::fs::read_dir(td.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
