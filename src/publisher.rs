use tracing::{info, warn};

use crate::channels::{Channel, PublishError};
use crate::model::{ChannelKind, Content};

/// Result of delivering one piece of content to one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered { with_image: bool },
    /// No credentials configured; nothing was attempted.
    Skipped,
    Failed,
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered { .. })
    }
}

/// The configured channel set, in posting order.
pub struct Publisher<'a> {
    channels: Vec<&'a dyn Channel>,
}

impl<'a> Publisher<'a> {
    pub fn new(channels: Vec<&'a dyn Channel>) -> Self {
        Self { channels }
    }

    /// Channels among `pending` that have credentials and can be attempted.
    /// Empty means nothing can be delivered for the entry this run.
    pub fn targets(&self, pending: &[ChannelKind]) -> Vec<&'a dyn Channel> {
        self.channels
            .iter()
            .copied()
            .filter(|c| pending.contains(&c.kind()) && c.is_configured())
            .collect()
    }
}

/// Image delivery first when there is an image, then a single text-only
/// attempt on the same channel if that failed.
pub async fn deliver(channel: &dyn Channel, content: &Content) -> ChannelOutcome {
    let kind = channel.kind();
    if let Some(image) = content.image.as_deref() {
        match channel.send(&content.text, Some(image)).await {
            Ok(()) => return ChannelOutcome::Delivered { with_image: true },
            Err(PublishError::CredentialsMissing) => {
                info!(channel = %kind, "credentials are missing; skipping channel");
                return ChannelOutcome::Skipped;
            }
            Err(err) => {
                warn!(channel = %kind, %err, "image post failed; retrying as text");
            }
        }
    }
    match channel.send(&content.text, None).await {
        Ok(()) => ChannelOutcome::Delivered { with_image: false },
        Err(PublishError::CredentialsMissing) => {
            info!(channel = %kind, "credentials are missing; skipping channel");
            ChannelOutcome::Skipped
        }
        Err(err) => {
            warn!(channel = %kind, %err, "text post failed");
            ChannelOutcome::Failed
        }
    }
}
