use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use teloxide::payloads::SendPhotoSetters;
use teloxide::prelude::*;
use teloxide::types::{InputFile, Recipient};
use tracing::{info, instrument};

use super::{Channel, PublishError};
use crate::config::{self, Telegram};
use crate::model::ChannelKind;

/// Telegram's limit for photo captions, in characters.
const CAPTION_LIMIT: usize = 1024;

/// Posts to a Telegram channel through the Bot API.
pub struct TelegramChannel {
    target: Option<(Bot, Recipient)>,
}

impl TelegramChannel {
    /// Build from config; without both token and chat id the channel is
    /// present but unconfigured.
    pub fn from_config(cfg: &Telegram, timeout: Duration) -> Result<Self> {
        let (Some(token), Some(chat_id)) = (
            config::credential(&cfg.bot_token),
            config::credential(&cfg.chat_id),
        ) else {
            return Ok(Self { target: None });
        };
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .context("failed to build telegram http client")?;
        let bot = Bot::with_client(token, client);
        Ok(Self {
            target: Some((bot, parse_recipient(chat_id))),
        })
    }
}

/// Numeric ids (`-100…`) address chats directly, anything else is treated as
/// a public channel username.
pub fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if chat_id.starts_with('@') => Recipient::ChannelUsername(chat_id.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{}", chat_id)),
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    #[instrument(skip_all, fields(with_image = image.is_some()))]
    async fn send(&self, text: &str, image: Option<&[u8]>) -> Result<(), PublishError> {
        let Some((bot, chat)) = &self.target else {
            return Err(PublishError::CredentialsMissing);
        };
        match image {
            Some(bytes) => {
                if text.chars().count() > CAPTION_LIMIT {
                    return Err(anyhow!("caption longer than {} characters", CAPTION_LIMIT).into());
                }
                let photo = InputFile::memory(bytes.to_vec()).file_name("image.jpg");
                bot.send_photo(chat.clone(), photo)
                    .caption(text)
                    .await
                    .context("sendPhoto failed")?;
            }
            None => {
                bot.send_message(chat.clone(), text)
                    .await
                    .context("sendMessage failed")?;
            }
        }
        info!("telegram post sent");
        Ok(())
    }
}
