//! Notes as served by the platform's note detail endpoint
//!
//! A detail response carries one `note_card` under `data.items[0]`. [`Note`] pulls out
//! what an export needs: text, author, counters, tags, media URLs. Image URLs are
//! rewritten through the platform's image service ([`formatted_image_url`]) so the
//! uploaded copies are clean, watermark-free files.

use crate::error::{Error, Result};
use crate::platform::envelope_data;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

const IMAGE_FORMAT: &str = "png";

/// One note, flattened from its `note_card`
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    /// Title, or a placeholder for untitled notes
    pub title: String,
    /// Body text
    pub description: String,
    /// Author nickname
    pub author: String,
    /// Author profile page
    pub author_url: Option<String>,
    /// Link the note was fetched from
    pub link: String,
    /// Platform tags
    pub tags: Vec<String>,
    /// Like count
    pub liked_count: u64,
    /// Bookmark count
    pub collected_count: u64,
    /// First image, used as the page cover
    pub cover_url: Option<String>,
    /// Raw image URLs, in display order
    pub image_urls: Vec<String>,
    /// First h264 stream of a video note
    pub video_url: Option<String>,
    /// Publication time
    pub published_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Parse a full note detail response
    pub fn from_detail_response(response: &Value, link: impl Into<String>) -> Result<Self> {
        let card = envelope_data(response)?
            .and_then(|data| data.pointer("/items/0/note_card"))
            .ok_or_else(|| Error::malformed("note detail response has no note_card"))?;
        Self::from_note_card(card, link)
    }

    /// Parse one `note_card` object
    pub fn from_note_card(card: &Value, link: impl Into<String>) -> Result<Self> {
        if !card.is_object() {
            return Err(Error::malformed("note_card is not an object"));
        }

        let text = |pointer: &str| card.pointer(pointer).and_then(Value::as_str);

        let image_urls: Vec<String> = card
            .get("image_list")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|image| image.get("url_default").and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let tags = card
            .get("tag_list")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let video_url = (text("/type") == Some("video"))
            .then(|| text("/video/media/stream/h264/0/master_url"))
            .flatten()
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let author_url = text("/user/user_id")
            .filter(|id| !id.is_empty())
            .map(|id| user_profile_url(id, text("/user/xsec_token").unwrap_or_default()));

        let published_at = card
            .get("time")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(Self {
            title: text("/title")
                .filter(|t| !t.is_empty())
                .unwrap_or("Untitled note")
                .to_string(),
            description: text("/desc").unwrap_or_default().to_string(),
            author: text("/user/nickname").unwrap_or("Unknown author").to_string(),
            author_url,
            link: link.into(),
            tags,
            liked_count: card.pointer("/interact_info/liked_count").map_or(0, parse_count),
            collected_count: card
                .pointer("/interact_info/collected_count")
                .map_or(0, parse_count),
            cover_url: image_urls.first().cloned(),
            image_urls,
            video_url,
            published_at,
        })
    }

    /// Clean image URLs to import, in display order
    ///
    /// Images whose URL carries no storage token are skipped.
    pub fn image_sources(&self) -> Vec<String> {
        self.image_urls
            .iter()
            .filter_map(|url| extract_image_token(url))
            .map(|token| formatted_image_url(&token, IMAGE_FORMAT))
            .collect()
    }
}

/// Parse a display counter such as `123`, `"456"` or `"1.2万"` (ten-thousands)
///
/// Unparsable values count as zero.
pub fn parse_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0).round() as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_suffix('万') {
                Some(tens_of_thousands) => tens_of_thousands
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .map(|n| (n * 10_000.0).round()),
                None => s.parse::<f64>().ok(),
            };
            parsed.map_or(0, |n| n.max(0.0) as u64)
        }
        _ => 0,
    }
}

/// Profile page of a platform user
pub fn user_profile_url(user_id: &str, xsec_token: &str) -> String {
    let base = format!("https://www.xiaohongshu.com/user/profile/{user_id}");
    if xsec_token.is_empty() {
        base
    } else {
        format!("{base}?xsec_token={}", urlencoding::encode(xsec_token))
    }
}

/// Storage token of a platform image URL
///
/// Image URLs look like `http://host/a/b/notes_pre_post/123!style`; the token is the
/// path after the host and two more segments, without the `!style` suffix. Returns `None` for
/// URLs too short to carry one.
pub fn extract_image_token(url: &str) -> Option<String> {
    let token = url.split('/').skip(5).collect::<Vec<_>>().join("/");
    let token = token.split('!').next().unwrap_or_default();
    (!token.is_empty()).then(|| token.to_string())
}

/// Clean image URL on the platform's image service, re-encoded as `format`
pub fn formatted_image_url(token: &str, format: &str) -> String {
    format!("https://ci.xiaohongshu.com/{token}?imageView2/format/{format}")
}
