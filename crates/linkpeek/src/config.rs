//! Resolver configuration.
//!
//! Every constant of the pipeline lives here. Durations are written as
//! milliseconds in serialized form (`timeout_ms`, `settle_delay_ms`, ...).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decode::TextDecoding;

/// Crawler user agent; Open Graph-aware servers return pre-rendered tags for it.
pub const DEFAULT_USER_AGENT: &str = "Facebot";

/// Fetch timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between load completion and capture, for late layout and paint.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Overall bound on one fallback render.
pub const DEFAULT_RENDER_DEADLINE: Duration = Duration::from_secs(30);

/// Whether a cached response may answer a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Use the cached body if there is one, otherwise go to the network.
    #[default]
    ReturnCacheElseLoad,
    /// Always go to the network (the result is still cached).
    ReloadIgnoringCache,
}

/// Size of the off-screen rendering surface, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 390,
            height: 390,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    pub user_agent: String,
    pub cache_policy: CachePolicy,
    /// Number of response bodies the transport cache keeps; 0 disables it.
    pub cache_capacity: usize,
    pub decoding: TextDecoding,
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    /// `None` lets a page that never finishes loading stall its render forever.
    #[serde(rename = "render_deadline_ms", with = "opt_millis")]
    pub render_deadline: Option<Duration>,
    pub viewport: Viewport,
    /// Longest edge of display thumbnails, in pixels.
    pub thumbnail_size: u32,
    /// Also run the fallback render when extraction succeeded but found no image.
    pub render_on_missing_image: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_policy: CachePolicy::default(),
            cache_capacity: 256,
            decoding: TextDecoding::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            render_deadline: Some(DEFAULT_RENDER_DEADLINE),
            viewport: Viewport::default(),
            thumbnail_size: 140,
            render_on_missing_image: false,
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
