use tracing::debug;

use crate::model::Content;
use crate::preview::PreviewSource;
use crate::rewrite::{RewriteError, Rewriter};

/// Build publishable content for one entry. A rewrite failure aborts the
/// entry; a missing image never does.
pub async fn transform(
    rewriter: &dyn Rewriter,
    preview: &dyn PreviewSource,
    title: &str,
    summary: &str,
    url: &str,
) -> Result<Content, RewriteError> {
    let text = rewriter.rewrite(title, summary, url).await?;
    let image = preview.fetch(url).await;
    debug!(%url, with_image = image.is_some(), "content ready");
    Ok(Content { text, image })
}
