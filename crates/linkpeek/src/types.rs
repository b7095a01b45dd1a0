//! Core data types for link preview resolution.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Preview metadata recovered from a page's Open Graph tags.
///
/// Immutable once built; lives only as long as the resolution that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<Url>,
}

impl LinkMetadata {
    /// True when none of the three fields were found.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image.is_none()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// A PNG bitmap captured from a fully loaded off-screen render.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSnapshot {
    pub source_url: Url,
    pub width: u32,
    pub height: u32,
    #[serde(with = "png_base64")]
    pub png: Vec<u8>,
}

impl fmt::Debug for RenderedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedSnapshot")
            .field("source_url", &self.source_url.as_str())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// What a single resolution request produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Open Graph extraction succeeded (image may still be absent).
    Metadata(LinkMetadata),
    /// Only the fallback render produced something.
    Snapshot(RenderedSnapshot),
    /// Extraction succeeded without an image and the fallback render filled it in.
    /// Only produced when `render_on_missing_image` is enabled.
    MetadataWithSnapshot {
        metadata: LinkMetadata,
        snapshot: RenderedSnapshot,
    },
    /// Neither path produced anything.
    Nothing,
}

impl Resolution {
    pub fn metadata(&self) -> Option<&LinkMetadata> {
        match self {
            Resolution::Metadata(m) | Resolution::MetadataWithSnapshot { metadata: m, .. } => {
                Some(m)
            }
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&RenderedSnapshot> {
        match self {
            Resolution::Snapshot(s) | Resolution::MetadataWithSnapshot { snapshot: s, .. } => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Resolution::Nothing)
    }
}

/// Coarse failure category, carried on a [`Completion`] so callers can see
/// why the fallback ran without changing the success shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Parse,
    ImageUrlInvalid,
    MissingImage,
    RenderLoad,
    RenderTimeout,
    Capture,
    Renderer,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Parse => "parse",
            FailureKind::ImageUrlInvalid => "image_url_invalid",
            FailureKind::MissingImage => "missing_image",
            FailureKind::RenderLoad => "render_load",
            FailureKind::RenderTimeout => "render_timeout",
            FailureKind::Capture => "capture",
            FailureKind::Renderer => "renderer",
        };
        f.write_str(s)
    }
}

/// The one value delivered per resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub request_id: Uuid,
    pub url: Url,
    pub resolution: Resolution,
    /// Why the fallback render path was taken, if it was.
    pub fallback_cause: Option<FailureKind>,
    /// Why the fallback render produced nothing, if it failed.
    pub render_failure: Option<FailureKind>,
    pub elapsed_ms: u64,
}

/// What the presentation layer hands over: the shared link (if any) and
/// whether metadata should be attempted at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub link: Option<Url>,
    pub metadata_enabled: bool,
}

impl PreviewRequest {
    pub fn new(link: Option<Url>, metadata_enabled: bool) -> Self {
        Self {
            link,
            metadata_enabled,
        }
    }

    /// The URL to resolve, or `None` when there is no link or metadata is off.
    pub fn target(&self) -> Option<&Url> {
        if !self.metadata_enabled {
            return None;
        }
        self.link.as_ref()
    }
}

/// Errors raised inside the pipeline. All of them are recovered into
/// absence before a [`Completion`] is delivered.
#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Payload is not decodable HTML")]
    Parse,

    #[error("Image URL is not absolute: {0}")]
    ImageUrlInvalid(String),

    #[error("Page failed to load: {0}")]
    RenderLoad(String),

    #[error("Render did not finish within {0:?}")]
    RenderTimeout(Duration),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Renderer unavailable: {0}")]
    Renderer(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PreviewError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PreviewError::Fetch(_) => FailureKind::Fetch,
            PreviewError::Parse => FailureKind::Parse,
            PreviewError::ImageUrlInvalid(_) => FailureKind::ImageUrlInvalid,
            PreviewError::RenderLoad(_) => FailureKind::RenderLoad,
            PreviewError::RenderTimeout(_) => FailureKind::RenderTimeout,
            PreviewError::Capture(_) | PreviewError::Image(_) => FailureKind::Capture,
            PreviewError::Renderer(_) => FailureKind::Renderer,
        }
    }
}

/// Convenience result type.
pub type PreviewResult<T> = Result<T, PreviewError>;

mod png_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
