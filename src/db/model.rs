//! Row and view models returned by the entry repository.
//!
//! Keep these structs focused on the data returned by queries. Selection and
//! publication policy lives in higher layers.

use crate::model::ChannelKind;

/// Values needed to insert a first sighting of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry<'a> {
    pub id: &'a str,
    pub url: &'a str,
    pub title: &'a str,
    pub published: &'a str,
}

/// Full stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: String,
    pub url: String,
    pub title: String,
    pub published: String,
    pub posted_tg: bool,
    pub posted_vk: bool,
}

/// Slice of an entry that still owes delivery to at least one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: String,
    pub url: String,
    pub title: String,
    pub posted_tg: bool,
    pub posted_vk: bool,
}

impl StoredEntry {
    pub fn is_delivered(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Telegram => self.posted_tg,
            ChannelKind::Vk => self.posted_vk,
        }
    }
}

impl PendingEntry {
    /// Channels that have not confirmed delivery yet, in fixed order.
    pub fn pending_channels(&self) -> Vec<ChannelKind> {
        ChannelKind::ALL
            .into_iter()
            .filter(|c| match c {
                ChannelKind::Telegram => !self.posted_tg,
                ChannelKind::Vk => !self.posted_vk,
            })
            .collect()
    }
}
