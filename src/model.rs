use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Downstream posting destinations. Each has its own delivery flag column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Telegram,
    Vk,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Telegram, ChannelKind::Vk];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Vk => "vk",
        }
    }

    /// Column in `entries` holding this channel's delivery flag.
    pub fn flag_column(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "posted_tg",
            ChannelKind::Vk => "posted_vk",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly fetched feed item, alive for one run only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published: String,
}

/// Text and optional JPEG preview ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub text: String,
    pub image: Option<Vec<u8>>,
}

/// Stable entry identity: lowercase hex SHA-256 of the source URL.
pub fn entry_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_is_deterministic() {
        assert_eq!(entry_id("https://x/a"), entry_id("https://x/a"));
        assert_eq!(entry_id("https://x/a").len(), 64);
    }

    #[test]
    fn entry_id_differs_per_url() {
        assert_ne!(entry_id("https://x/a"), entry_id("https://x/b"));
        assert_ne!(entry_id("https://x/a"), entry_id("https://x/a/"));
    }

    #[test]
    fn entry_id_matches_known_digest() {
        assert_eq!(
            entry_id(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn channel_columns() {
        assert_eq!(ChannelKind::Telegram.flag_column(), "posted_tg");
        assert_eq!(ChannelKind::Vk.flag_column(), "posted_vk");
        assert_eq!(ChannelKind::Vk.to_string(), "vk");
    }
}
