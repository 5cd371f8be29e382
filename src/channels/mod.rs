//! Posting sinks. Each channel owns its credentials and wire protocol and
//! reports either success, "not configured", or a failed attempt.
use async_trait::async_trait;
use thiserror::Error;

use crate::model::ChannelKind;

pub mod telegram;
pub mod vk;

pub use telegram::TelegramChannel;
pub use vk::VkChannel;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Channel has no credentials; skipped until they are supplied.
    #[error("credentials are missing")]
    CredentialsMissing,
    /// The attempt was made and failed; retried on a later run.
    #[error("delivery failed: {0:#}")]
    Delivery(#[from] anyhow::Error),
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Whether credentials are present. Unconfigured channels are not attempted.
    fn is_configured(&self) -> bool;

    /// Post `text`, attaching `image` (JPEG bytes) when given.
    async fn send(&self, text: &str, image: Option<&[u8]>) -> Result<(), PublishError>;
}
